//! `strata synth` — write templates and the manifest to the output directory.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::{config_service, synth_service};
use crate::output::{SilentReporter, TerminalReporter};

/// Arguments for the synth command.
#[derive(Args)]
pub struct SynthArgs {
    /// Stacks to synthesize (default: all)
    pub stacks: Vec<String>,

    /// Output directory (default: `output_dir` from the configuration)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the templates to stdout instead of a summary
    #[arg(long)]
    pub print: bool,
}

/// Run the synth command.
pub fn run(app: &AppContext, args: &SynthArgs) -> Result<ExitCode> {
    let config = config_service::load_config(&app.config_store)?;
    let output_dir = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.output_dir));

    let outcome = if args.print || app.is_json() {
        synth_service::synth(&config, &args.stacks, &output_dir, &app.fs, &app.fs, &SilentReporter)?
    } else {
        let reporter = TerminalReporter::new(&app.output);
        synth_service::synth(&config, &args.stacks, &output_dir, &app.fs, &app.fs, &reporter)?
    };
    app.renderer().render_synth(&outcome, args.print)?;
    Ok(ExitCode::SUCCESS)
}
