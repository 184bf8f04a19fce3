//! Node command implementation.

use anyhow::{Context, Result};
use console::style;

use qcal_state::Outcome;

use super::common::node_store;
use crate::StoreArgs;

/// Execute `qcal node list`.
pub async fn execute_list(store_args: &StoreArgs) -> Result<()> {
    let store = node_store(store_args)?;
    let nodes = store.list().await?;

    if nodes.is_empty() {
        println!("No nodes in {}", store.root().display());
        return Ok(());
    }

    println!(
        "{:>5}  {:<20}  {:<19}  {}",
        style("ID").bold(),
        style("NAME").bold(),
        style("CREATED (UTC)").bold(),
        style("OUTCOMES").bold()
    );
    for node in nodes {
        println!(
            "{:>5}  {:<20}  {:<19}  {}/{}",
            node.id,
            node.name,
            node.created_at.format("%Y-%m-%d %H:%M:%S"),
            node.successes(),
            node.outcomes.len()
        );
    }
    Ok(())
}

/// Execute `qcal node show`.
pub async fn execute_show(store_args: &StoreArgs, id: u64) -> Result<()> {
    let store = node_store(store_args)?;
    let (node, folder) = store
        .load(id)
        .await
        .with_context(|| format!("Failed to load node #{id}"))?;

    println!(
        "{} #{} {}",
        style("Node").cyan().bold(),
        node.id,
        style(&node.name).green()
    );
    println!(
        "  Created:  {}",
        node.created_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S %:z")
    );
    println!("  Folder:   {}", style(folder.display()).dim());

    if let Some(params) = node.parameters.as_object() {
        println!("\n  Parameters:");
        for (key, value) in params {
            println!("    {key}: {value}");
        }
    }

    if let Some(fits) = node.results.get("fit_results").and_then(|v| v.as_object()) {
        println!("\n  Fit results:");
        for (qubit, fit) in fits {
            let status = fit.get("status").and_then(|s| s.as_str()).unwrap_or("unknown");
            let freq = fit.get("freq_offset").and_then(|v| v.as_f64());
            let decay = fit.get("decay").and_then(|v| v.as_f64());
            match (freq, decay) {
                (Some(freq), Some(decay)) => println!(
                    "    {}: {:.3} MHz, T2* {:.2} us ({status})",
                    style(qubit).cyan(),
                    freq / 1e6,
                    decay * 1e6
                ),
                _ => println!("    {}: {status}", style(qubit).cyan()),
            }
        }
    }

    if !node.outcomes.is_empty() {
        println!("\n  Outcomes:");
        for (qubit, outcome) in &node.outcomes {
            let outcome = match outcome {
                Outcome::Successful => style(outcome.to_string()).green(),
                Outcome::Failed => style(outcome.to_string()).red(),
            };
            println!("    {}: {}", style(qubit).cyan(), outcome);
        }
    }

    if !node.artifacts.is_empty() {
        println!("\n  Artifacts:");
        for (key, file) in &node.artifacts {
            println!("    {key}: {file}");
        }
    }
    Ok(())
}
