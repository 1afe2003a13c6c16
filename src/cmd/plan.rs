//! Plan command - show the clear order without touching any data.

use super::open_database;
use anyhow::Result;
use db_cleaner::{CleanConfig, Cleaner, ClearPlan};
use std::path::PathBuf;

pub fn run(db: PathBuf, config: CleanConfig, json: bool) -> Result<()> {
    let mut conn = open_database(&db)?;
    let plan = Cleaner::new(config).plan(&mut conn)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print_plan(&plan);
    }
    Ok(())
}

pub(super) fn print_plan(plan: &ClearPlan) {
    if plan.is_empty() {
        println!("No tables to clear.");
        return;
    }

    println!(
        "Clear order ({} tables, {} batches):",
        plan.table_count(),
        plan.batches.len()
    );
    for (i, batch) in plan.batches.iter().enumerate() {
        println!("  Batch {}:", i + 1);
        for unit in &batch.units {
            let names: Vec<String> = unit.tables.iter().map(|t| t.to_string()).collect();
            if unit.cyclic {
                println!("    - {} (cycle)", names.join(", "));
            } else {
                println!("    - {}", names.join(", "));
            }
        }
    }
}
