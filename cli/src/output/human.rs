//! Human-readable terminal renderer.

use std::path::Path;

use owo_colors::OwoColorize as _;

use crate::application::services::deploy_service::StackOutput;
use crate::application::services::synth_service::SynthOutcome;
use crate::domain::config::StrataConfig;
use crate::infra::config::CONFIG_ENV;
use crate::output::OutputContext;

/// Renders results as human-readable terminal output using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    /// Create a new `HumanRenderer` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    /// Render the CLI version information.
    pub fn render_version(&self, version: &str) {
        if self.ctx.quiet {
            return;
        }
        println!("strata {version}");
    }

    /// Render the list of stacks.
    pub fn render_stack_list(&self, stacks: &[(&str, &str)]) {
        if self.ctx.quiet {
            return;
        }
        println!();
        self.ctx.header("Stacks:");
        for (name, description) in stacks {
            println!("  {:<20} {description}", name.style(self.ctx.styles.stack));
        }
        println!();
        println!("  Synthesize: strata synth [STACK...]");
    }

    /// Render the result of a synthesis run. Per-stack lines have already
    /// been reported as progress.
    pub fn render_synth(&self, outcome: &SynthOutcome) {
        if self.ctx.quiet {
            return;
        }
        let assets: usize = outcome.stacks.iter().map(|s| s.manifest.assets.len()).sum();
        if assets > 0 {
            self.ctx.info(&format!("{assets} asset(s) staged"));
        }
        self.ctx.kv("Manifest:", &outcome.manifest_path.display().to_string());
    }

    /// Print each template as pretty JSON, for `synth --print`.
    pub fn render_templates(&self, outcome: &SynthOutcome) -> anyhow::Result<()> {
        for stack in &outcome.stacks {
            println!("{}", stack.template.to_json_pretty()?);
        }
        Ok(())
    }

    /// Render outputs of a deployed stack.
    pub fn render_deployed(&self, stack: &str, outputs: &[StackOutput]) {
        if self.ctx.quiet || outputs.is_empty() {
            return;
        }
        println!();
        self.ctx.header(&format!("{stack} outputs:"));
        for output in outputs {
            self.ctx.kv(&format!("{:<20}", output.key), &output.value);
        }
    }

    /// Render a destroyed stack.
    pub fn render_destroyed(&self, stack: &str) {
        self.ctx.info(&format!("{stack} no longer exists"));
    }

    /// Render the current configuration.
    pub fn render_config(&self, config: &StrataConfig, path: &Path) -> anyhow::Result<()> {
        println!();
        println!(
            "  {}",
            format!("Configuration ({})", path.display()).style(self.ctx.styles.header)
        );
        println!();
        for line in serde_yaml::to_string(config)?.lines() {
            println!("  {line}");
        }
        println!();
        println!("  {}", "Environment:".style(self.ctx.styles.bold));
        for var in [CONFIG_ENV, "STRATA_LOG", "NO_COLOR"] {
            println!(
                "    {:<18} {}",
                format!("{var}:"),
                std::env::var(var).unwrap_or_else(|_| "(not set)".to_string())
            );
        }
        println!();
        Ok(())
    }
}
