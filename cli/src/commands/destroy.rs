//! `strata destroy` — delete a deployed stack.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::{config_service, deploy_service};
use crate::domain::App;
use crate::output::{SilentReporter, SpinnerReporter};

/// Arguments for the destroy command.
#[derive(Args)]
pub struct DestroyArgs {
    /// Stack to delete
    pub stack: String,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Run the destroy command.
pub async fn run(app: &AppContext, args: &DestroyArgs) -> Result<ExitCode> {
    let name = App::resolve(&args.stack)?;
    let config = config_service::load_config(&app.config_store)?;

    let prompt = format!("Delete {name} and every resource it owns? Retained resources stay behind.");
    if !args.yes && !app.confirm(&prompt, false)? {
        app.output.info("Destroy cancelled");
        return Ok(ExitCode::SUCCESS);
    }

    let timeout = Duration::from_secs(config.deploy.timeout_secs);
    let runner = app.command_runner(timeout);
    let region = config.region.as_deref();
    if app.is_json() {
        deploy_service::destroy(&runner, &SilentReporter, name, region, timeout).await?;
    } else {
        let reporter = SpinnerReporter::new(&app.output);
        if let Err(e) = deploy_service::destroy(&runner, &reporter, name, region, timeout).await {
            reporter.abandon(&format!("{name} could not be deleted"));
            return Err(e);
        }
    }
    app.renderer().render_destroyed(name)?;
    Ok(ExitCode::SUCCESS)
}
