//! `strata deploy` — synthesize one stack and hand it to the provider.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use crate::app::AppContext;
use crate::application::services::deploy_service::{self, DeployRequest};
use crate::application::services::{config_service, synth_service};
use crate::output::{SilentReporter, SpinnerReporter};

/// Arguments for the deploy command.
#[derive(Args)]
pub struct DeployArgs {
    /// Stack to deploy
    pub stack: String,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Run the deploy command.
pub async fn run(app: &AppContext, args: &DeployArgs) -> Result<ExitCode> {
    let config = config_service::load_config(&app.config_store)?;
    let output_dir = PathBuf::from(&config.output_dir);

    let outcome = synth_service::synth(
        &config,
        std::slice::from_ref(&args.stack),
        &output_dir,
        &app.fs,
        &app.fs,
        &SilentReporter,
    )?;
    let stack = outcome
        .stacks
        .into_iter()
        .next()
        .context("synthesis produced no stack")?;

    let target = config.region.as_deref().unwrap_or("the default region");
    let prompt = format!(
        "Deploy {} ({} resources) to {target}?",
        stack.name, stack.manifest.resource_count
    );
    if !args.yes && !app.confirm(&prompt, true)? {
        app.output.info("Deploy cancelled");
        return Ok(ExitCode::SUCCESS);
    }

    let timeout = Duration::from_secs(config.deploy.timeout_secs);
    let request = DeployRequest {
        has_assets: stack.has_assets(),
        stack_name: stack.name.clone(),
        template_path: stack.template_path.clone(),
        asset_bucket: config.deploy.asset_bucket.clone(),
        region: config.region.clone(),
        timeout,
    };
    let runner = app.command_runner(timeout);
    let outputs = if app.is_json() {
        deploy_service::deploy(&runner, &SilentReporter, &request).await?
    } else {
        let reporter = SpinnerReporter::new(&app.output);
        match deploy_service::deploy(&runner, &reporter, &request).await {
            Ok(outputs) => outputs,
            Err(e) => {
                reporter.abandon(&format!("{} failed", stack.name));
                return Err(e);
            }
        }
    };
    app.renderer().render_deployed(&stack.name, &outputs)?;
    Ok(ExitCode::SUCCESS)
}
