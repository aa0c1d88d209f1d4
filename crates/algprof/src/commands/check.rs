use super::load_task;
use crate::error::Result;
use algprof_trace::ExecUnit;
use algprof_trace::config::TaskConfig;
use comfy_table::Table;
use std::path::Path;

/// Build the listing of tracked algorithms for a task description
pub fn algorithm_table(config: &TaskConfig) -> Result<Table> {
    // Fails on duplicate or empty names, same as the service would
    config.algorithm_names()?;

    let mut table = Table::new();
    table.set_header(vec!["#", "IDENTIFIER", "NAME", "COST"]);
    for (i, entry) in config.algorithms.iter().enumerate() {
        let cost = entry
            .properties
            .get("cost")
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        table.add_row(vec![
            (i + 1).to_string(),
            entry.identifier.clone(),
            entry.name().to_string(),
            cost.to_string(),
        ]);
    }
    Ok(table)
}

pub fn run(path: &Path) -> Result<()> {
    let task = load_task(path, None)?;
    let config = TaskConfig::from_json(task.json())?;

    if config.algorithms.is_empty() {
        println!("Task {} has no algorithms; only events will be timed", task.obj_name());
        return Ok(());
    }

    println!("# {}", path.display());
    println!(
        "# Task: {} | Algorithms: {} | Services: {}",
        task.obj_name(),
        config.algorithms.len(),
        config.services.len()
    );
    println!();
    println!("{}", algorithm_table(&config)?);

    Ok(())
}
