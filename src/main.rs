use clap::Parser;
use std::process;
use tracing::error;
use tracing_subscriber::EnvFilter;
use wordvec_experiments::{run, Cli};

fn main() {

    // logs go to stderr, stdout is left to vocabularies, analogies and labels
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run::execute(&cli) {
        error!("{}", e);
        process::exit(e.exit_code());
    }
}
