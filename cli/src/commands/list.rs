//! `strata list` — show the stacks this tool can synthesize.

use std::process::ExitCode;

use anyhow::Result;

use crate::app::AppContext;
use crate::domain::App;

/// Run the list command.
pub fn run(app: &AppContext) -> Result<ExitCode> {
    let stacks = App::names()
        .iter()
        .map(|name| Ok((*name, App::description(name)?)))
        .collect::<Result<Vec<_>>>()?;
    app.renderer().render_stack_list(&stacks)?;
    Ok(ExitCode::SUCCESS)
}
