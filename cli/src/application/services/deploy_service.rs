//! Application service — deploy and destroy use-cases.
//!
//! Both drive the AWS CLI through the `CommandRunner` port. Provider
//! failures are surfaced with the CLI's own stderr.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::application::ports::{CommandRunner, ProgressReporter};

/// Program invoked for every provider call.
pub const AWS_CLI: &str = "aws";

/// Capabilities acknowledged on deploy; every shipped stack creates roles.
pub const CAPABILITIES: [&str; 2] = ["CAPABILITY_IAM", "CAPABILITY_NAMED_IAM"];

/// Inputs for one stack deployment.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub stack_name: String,
    pub template_path: PathBuf,
    /// Set when the template references local assets; they are uploaded here
    /// by `aws cloudformation package` first.
    pub asset_bucket: Option<String>,
    pub has_assets: bool,
    pub region: Option<String>,
    pub timeout: Duration,
}

/// A deployed stack output as reported by `describe-stacks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackOutput {
    #[serde(rename = "OutputKey")]
    pub key: String,
    #[serde(rename = "OutputValue")]
    pub value: String,
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Path of the packaged template written next to `template`.
#[must_use]
pub fn packaged_template_path(template: &Path) -> PathBuf {
    let stem = template
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_suffix(".template.json"))
        .unwrap_or("stack");
    template.with_file_name(format!("{stem}.packaged.json"))
}

fn with_region(mut args: Vec<String>, region: Option<&str>) -> Vec<String> {
    if let Some(region) = region {
        args.push("--region".to_string());
        args.push(region.to_string());
    }
    args
}

/// Arguments for `aws cloudformation package`.
#[must_use]
pub fn package_args(template: &Path, bucket: &str, packaged: &Path, region: Option<&str>) -> Vec<String> {
    with_region(
        vec![
            "cloudformation".to_string(),
            "package".to_string(),
            "--template-file".to_string(),
            template.display().to_string(),
            "--s3-bucket".to_string(),
            bucket.to_string(),
            "--output-template-file".to_string(),
            packaged.display().to_string(),
        ],
        region,
    )
}

/// Arguments for `aws cloudformation deploy`.
#[must_use]
pub fn deploy_args(template: &Path, stack_name: &str, region: Option<&str>) -> Vec<String> {
    let mut args = vec![
        "cloudformation".to_string(),
        "deploy".to_string(),
        "--template-file".to_string(),
        template.display().to_string(),
        "--stack-name".to_string(),
        stack_name.to_string(),
        "--no-fail-on-empty-changeset".to_string(),
        "--capabilities".to_string(),
    ];
    args.extend(CAPABILITIES.iter().map(ToString::to_string));
    with_region(args, region)
}

/// Arguments for `aws cloudformation delete-stack`.
#[must_use]
pub fn delete_args(stack_name: &str, region: Option<&str>) -> Vec<String> {
    with_region(
        vec![
            "cloudformation".to_string(),
            "delete-stack".to_string(),
            "--stack-name".to_string(),
            stack_name.to_string(),
        ],
        region,
    )
}

/// Arguments for `aws cloudformation wait stack-delete-complete`.
#[must_use]
pub fn wait_delete_args(stack_name: &str, region: Option<&str>) -> Vec<String> {
    with_region(
        vec![
            "cloudformation".to_string(),
            "wait".to_string(),
            "stack-delete-complete".to_string(),
            "--stack-name".to_string(),
            stack_name.to_string(),
        ],
        region,
    )
}

/// Arguments for reading a stack's outputs as JSON.
#[must_use]
pub fn describe_outputs_args(stack_name: &str, region: Option<&str>) -> Vec<String> {
    with_region(
        vec![
            "cloudformation".to_string(),
            "describe-stacks".to_string(),
            "--stack-name".to_string(),
            stack_name.to_string(),
            "--query".to_string(),
            "Stacks[0].Outputs".to_string(),
            "--output".to_string(),
            "json".to_string(),
        ],
        region,
    )
}

async fn run_aws(
    runner: &impl CommandRunner,
    args: &[String],
    timeout: Duration,
) -> Result<Output> {
    let argv: Vec<&str> = args.iter().map(String::as_str).collect();
    debug!(program = AWS_CLI, args = ?argv, "running");
    let output = runner.run_with_timeout(AWS_CLI, &argv, timeout).await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!(
            "{AWS_CLI} {} failed: {}",
            argv.iter().take(2).copied().collect::<Vec<_>>().join(" "),
            stderr.trim()
        );
    }
    Ok(output)
}

/// Parse `describe-stacks` output; a stack without outputs prints `null`.
///
/// # Errors
///
/// Returns an error if the output is not the expected JSON shape.
pub fn parse_outputs(stdout: &[u8]) -> Result<Vec<StackOutput>> {
    let text = String::from_utf8_lossy(stdout);
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }
    serde_json::from_str(trimmed).context("cannot parse stack outputs")
}

/// Package (when needed) and deploy one synthesized stack, then read back
/// its outputs.
///
/// # Errors
///
/// Returns an error if the stack has assets but no asset bucket is
/// configured, or if any AWS CLI call fails.
pub async fn deploy(
    runner: &impl CommandRunner,
    reporter: &impl ProgressReporter,
    request: &DeployRequest,
) -> Result<Vec<StackOutput>> {
    let region = request.region.as_deref();
    let mut template = request.template_path.clone();

    if request.has_assets {
        let bucket = request.asset_bucket.as_deref().with_context(|| {
            format!(
                "{} has file assets; set deploy.asset_bucket first (strata config set deploy.asset_bucket <bucket>)",
                request.stack_name
            )
        })?;
        let packaged = packaged_template_path(&template);
        reporter.step(&format!("Uploading assets to s3://{bucket}..."));
        run_aws(runner, &package_args(&template, bucket, &packaged, region), request.timeout).await?;
        info!(stack = %request.stack_name, packaged = %packaged.display(), "assets packaged");
        template = packaged;
    }

    reporter.step(&format!("Deploying {}...", request.stack_name));
    run_aws(runner, &deploy_args(&template, &request.stack_name, region), request.timeout).await?;
    info!(stack = %request.stack_name, "stack deployed");

    let output = run_aws(
        runner,
        &describe_outputs_args(&request.stack_name, region),
        request.timeout,
    )
    .await?;
    let outputs = parse_outputs(&output.stdout)?;
    reporter.success(&format!("{} deployed", request.stack_name));
    Ok(outputs)
}

/// Delete a stack and wait until the deletion completes.
///
/// # Errors
///
/// Returns an error if either AWS CLI call fails.
pub async fn destroy(
    runner: &impl CommandRunner,
    reporter: &impl ProgressReporter,
    stack_name: &str,
    region: Option<&str>,
    timeout: Duration,
) -> Result<()> {
    reporter.step(&format!("Deleting {stack_name}..."));
    run_aws(runner, &delete_args(stack_name, region), timeout).await?;
    run_aws(runner, &wait_delete_args(stack_name, region), timeout).await?;
    info!(stack = %stack_name, "stack deleted");
    reporter.success(&format!("{stack_name} deleted"));
    Ok(())
}
