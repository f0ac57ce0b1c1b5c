//! strata - compose infrastructure stacks and synthesize deployable templates

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use strata_cli::cli::Cli;
use strata_cli::output::json;

/// Environment variable holding a `tracing` filter directive.
const LOG_ENV: &str = "STRATA_LOG";

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "strata_cli=debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let json_mode = cli.json;
    match cli.run().await {
        Ok(code) => code,
        Err(e) => {
            if json_mode {
                match json::format_error(&format!("{e:#}"), json::error_code(&e)) {
                    Ok(body) => println!("{body}"),
                    Err(_) => eprintln!("Error: {e:#}"),
                }
            } else {
                eprintln!("Error: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}
