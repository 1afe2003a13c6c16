//! Clean command - empty every in-scope table of a DuckDB database.

use super::open_database;
use super::plan::print_plan;
use anyhow::Result;
use db_cleaner::{CleanConfig, CleanReport, Cleaner};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;

/// JSON output for the clean command
#[derive(Serialize)]
struct CleanJsonOutput<'a> {
    database: String,
    #[serde(flatten)]
    report: &'a CleanReport,
}

pub fn run(db: PathBuf, config: CleanConfig, dry_run: bool, progress: bool, json: bool) -> Result<()> {
    let mut conn = open_database(&db)?;
    let cleaner = Cleaner::new(config);

    if dry_run {
        let plan = cleaner.plan(&mut conn)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        } else {
            eprintln!("Dry run: nothing will be cleared.");
            print_plan(&plan);
        }
        return Ok(());
    }

    let report = if progress && !json {
        let total = cleaner.plan(&mut conn)?.table_count();
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} tables {msg}",
            )?
            .progress_chars("█▓▒░  "),
        );

        let bar = pb.clone();
        let cleaner = cleaner.on_progress(move |table| {
            bar.set_message(table.to_string());
            bar.inc(1);
        });
        let report = cleaner.clean(&mut conn)?;
        pb.finish_with_message("done");
        report
    } else {
        cleaner.clean(&mut conn)?
    };

    if json {
        let output = CleanJsonOutput {
            database: db.display().to_string(),
            report: &report,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("\n✓ Clean completed successfully!");
        println!("\nStatistics:");
        println!("  Strategy: {}", report.strategy);
        println!("  Tables cleared: {}", report.tables_cleared.len());
        println!("  Rows removed: {}", report.rows_deleted);
        println!("  Batches: {}", report.batches);
        println!("  Elapsed: {:.3}s", report.duration.as_secs_f64());
    }
    Ok(())
}
