//! Version command implementation.

use console::style;

/// Execute the version command.
pub fn execute() {
    let version = env!("CARGO_PKG_VERSION");

    println!(
        "{} {} - qubit calibration nodes",
        style("qcal").cyan().bold(),
        style(format!("v{version}")).yellow()
    );
    println!();
    println!("Components:");
    println!("  qcal-pulse        Pulse program representation");
    println!("  qcal-hal          Control hardware abstraction");
    println!("  qcal-fit          Decaying-oscillation fits");
    println!("  qcal-state        Machine state and node store");
    println!("  qcal-experiments  Calibration nodes");
    println!("  qcal-adapter-sim  Simulated transmon backend");
    println!();
    println!("License:    {}", style("Apache-2.0").dim());
}
