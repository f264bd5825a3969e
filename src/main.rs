//! infraforge CLI: plan and apply infrastructure capabilities.

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "infraforge",
    version,
    about = "Plan, preview and apply infrastructure capabilities with terraform"
)]
struct Cli {
    #[command(subcommand)]
    command: infraforge::cli::Commands,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,infraforge=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = infraforge::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
