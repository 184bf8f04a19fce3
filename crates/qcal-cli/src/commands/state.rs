//! State command implementation.

use anyhow::{Context, Result};
use console::style;

use qcal_state::Machine;

use super::common::{load_machine, print_done, state_path};
use crate::StoreArgs;

/// Execute `qcal state init`.
pub async fn execute_init(store_args: &StoreArgs, force: bool) -> Result<()> {
    let path = state_path(store_args)?;
    if path.exists() && !force {
        anyhow::bail!(
            "State file {} already exists (use --force to overwrite)",
            path.display()
        );
    }
    Machine::example()
        .save(&path)
        .await
        .with_context(|| format!("Failed to write state: {}", path.display()))?;
    print_done(format!("Wrote example state to {}", path.display()));
    Ok(())
}

/// Execute `qcal state show`.
pub async fn execute_show(store_args: &StoreArgs) -> Result<()> {
    let (machine, path) = load_machine(store_args).await?;
    println!("{} {}", style("State").cyan().bold(), style(path.display()).dim());
    println!(
        "  Active qubits: {}",
        style(machine.active_qubit_names.join(", ")).green()
    );
    for (name, qubit) in &machine.qubits {
        let t2 = qubit
            .t2ramsey
            .map_or_else(|| "-".to_string(), |t| format!("{:.2} us", t * 1e6));
        println!(
            "  {}: IF {:.4} MHz, T2* {}, grid ({}, {})",
            style(name).cyan(),
            qubit.xy.intermediate_frequency / 1e6,
            t2,
            qubit.grid_location.col,
            qubit.grid_location.row
        );
    }
    Ok(())
}
