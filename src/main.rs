mod cmd;

use clap::Parser;
use cmd::Cli;
use db_cleaner::CleanError;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = cmd::run(cli) {
        match e.downcast_ref::<CleanError>() {
            Some(clean) => eprintln!("error ({} stage): {e:#}", clean.stage()),
            None => eprintln!("error: {e:#}"),
        }
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "db_cleaner=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
