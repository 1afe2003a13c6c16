mod clean;
mod plan;

use anyhow::Context;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use db_cleaner::{CleanConfig, DuckDbConnection, Strategy};
use std::io;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "db-cleaner")]
#[command(author = "Helge Sverre <helge.sverre@gmail.com>")]
#[command(version)]
#[command(about = "Empty every table of a database in foreign-key safe order", long_about = None)]
pub struct Cli {
    /// Verbose output (debug logging; RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Table selection shared by `clean` and `plan`
#[derive(Args, Debug, Clone, Default)]
pub struct ScopeArgs {
    /// Only clear these tables (comma-separated, `schema.table` or `table`)
    #[arg(long, conflicts_with = "skip")]
    pub only: Option<String>,

    /// Never clear these tables (comma-separated)
    #[arg(long)]
    pub skip: Option<String>,

    /// Restrict to one schema/namespace
    #[arg(long)]
    pub schema: Option<String>,

    /// YAML configuration file; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Delete all rows from every table, keeping the schema
    Clean {
        /// DuckDB database file (`:memory:` for a throwaway database)
        db: PathBuf,

        /// Strategy: delete or truncate
        #[arg(short, long)]
        strategy: Option<String>,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Reset identity/auto-increment counters (truncate only)
        #[arg(long)]
        restart_identity: bool,

        /// Use cascading truncate (truncate only)
        #[arg(long)]
        cascade: bool,

        /// Abort once this much time has passed (e.g. 30s)
        #[arg(long)]
        timeout: Option<humantime_serde::re::humantime::Duration>,

        /// Show the plan without clearing anything
        #[arg(long)]
        dry_run: bool,

        /// Show progress while clearing
        #[arg(short, long)]
        progress: bool,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the order tables would be cleared in
    Plan {
        /// DuckDB database file
        db: PathBuf,

        /// Strategy: delete or truncate
        #[arg(short, long)]
        strategy: Option<String>,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Plan a cascading truncate
        #[arg(long)]
        cascade: bool,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Clean {
            db,
            strategy,
            scope,
            restart_identity,
            cascade,
            timeout,
            dry_run,
            progress,
            json,
        } => {
            let mut config = build_config(strategy, &scope)?;
            config.restart_identity |= restart_identity;
            config.cascade |= cascade;
            if let Some(timeout) = timeout {
                config.timeout = Some(timeout.into());
            }
            clean::run(db, config, dry_run, progress, json)
        }
        Commands::Plan {
            db,
            strategy,
            scope,
            cascade,
            json,
        } => {
            let mut config = build_config(strategy, &scope)?;
            config.cascade |= cascade;
            plan::run(db, config, json)
        }
        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "db-cleaner", &mut io::stdout());
            Ok(())
        }
    }
}

/// Config file values, overridden by command-line flags
fn build_config(strategy: Option<String>, scope: &ScopeArgs) -> anyhow::Result<CleanConfig> {
    let mut config = match &scope.config {
        Some(path) => CleanConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => CleanConfig::default(),
    };

    if let Some(strategy) = strategy {
        config.strategy = strategy
            .parse::<Strategy>()
            .map_err(anyhow::Error::msg)?;
    }
    if let Some(only) = &scope.only {
        config.only_tables = split_list(only);
        config.skip_tables.clear();
    }
    if let Some(skip) = &scope.skip {
        config.skip_tables = split_list(skip);
        config.only_tables.clear();
    }
    if let Some(schema) = &scope.schema {
        config.schema = Some(schema.clone());
    }
    Ok(config)
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn open_database(db: &Path) -> anyhow::Result<DuckDbConnection> {
    if db.as_os_str() != ":memory:" && !db.exists() {
        anyhow::bail!("database file does not exist: {}", db.display());
    }
    DuckDbConnection::open(db).with_context(|| format!("failed to open {}", db.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(" a, public.b ,,c"), vec!["a", "public.b", "c"]);
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cleaner.yaml");
        std::fs::write(&path, "strategy: truncate\nskip_tables: [a]\n").unwrap();

        let scope = ScopeArgs {
            only: Some("b,c".to_string()),
            config: Some(path),
            ..ScopeArgs::default()
        };
        let config = build_config(Some("delete".to_string()), &scope).unwrap();
        assert_eq!(config.strategy, Strategy::Delete);
        assert_eq!(config.only_tables, vec!["b", "c"]);
        assert!(config.skip_tables.is_empty());
    }

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }
}
