//! qcal Command-Line Interface
//!
//! Runs calibration nodes against the machine state and inspects stored runs.
//!
//! ```text
//! qcal state init                     # write an example two-qubit state
//! qcal ramsey --qubits qD1,qD2        # Ramsey with virtual Z on the simulator
//! qcal node list                      # stored runs
//! qcal node show 3                    # one run in detail
//! ```

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{node, ramsey, state, version};

/// qcal - qubit calibration nodes
#[derive(Parser)]
#[command(name = "qcal")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Locations of the machine state and the node store.
#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    /// Machine state file [default: ~/.qcal/state.json]
    #[arg(long, env = "QCAL_STATE_PATH", global = true)]
    pub state: Option<PathBuf>,

    /// Node store root [default: ~/.qcal/data]
    #[arg(long, env = "QCAL_STORAGE_ROOT", global = true)]
    pub storage: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ramsey with virtual Z rotations: qubit frequency offset and T2*
    Ramsey(ramsey::RamseyArgs),

    /// Inspect stored node runs
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },

    /// Manage the machine state
    State {
        #[command(subcommand)]
        action: StateAction,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum NodeAction {
    /// List stored runs
    List,

    /// Show one stored run
    Show {
        /// Node id
        id: u64,
    },
}

#[derive(Subcommand)]
enum StateAction {
    /// Write the example two-qubit state
    Init {
        /// Overwrite an existing state file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the qubits of the state
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();

    let store = cli.store;
    let result = match cli.command {
        Commands::Ramsey(args) => ramsey::execute(&store, args).await,

        Commands::Node { action } => match action {
            NodeAction::List => node::execute_list(&store).await,
            NodeAction::Show { id } => node::execute_show(&store, id).await,
        },

        Commands::State { action } => match action {
            StateAction::Init { force } => state::execute_init(&store, force).await,
            StateAction::Show => state::execute_show(&store).await,
        },

        Commands::Version => {
            version::execute();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
