//! Unit tests for the deploy and destroy services.

#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use strata_cli::application::services::deploy_service::{
    self, AWS_CLI, DeployRequest, StackOutput,
};

use crate::mocks::{RecordingReporter, RecordingRunner, err_output, ok_output};

fn request(has_assets: bool, bucket: Option<&str>) -> DeployRequest {
    DeployRequest {
        stack_name: "ServerlessStack".to_string(),
        template_path: PathBuf::from("strata.out/ServerlessStack.template.json"),
        asset_bucket: bucket.map(ToString::to_string),
        has_assets,
        region: Some("ap-northeast-1".to_string()),
        timeout: Duration::from_secs(42),
    }
}

const OUTPUTS: &[u8] = br#"[
  {"OutputKey": "QueueUrl", "OutputValue": "https://sqs/queue", "Description": "Queue"}
]"#;

#[tokio::test]
async fn test_deploy_with_assets_packages_first() {
    let runner = RecordingRunner::with_responses(vec![ok_output(b""), ok_output(b""), ok_output(OUTPUTS)]);
    let reporter = RecordingReporter::default();

    let outputs = deploy_service::deploy(&runner, &reporter, &request(true, Some("assets-bucket")))
        .await
        .unwrap();

    assert_eq!(runner.subcommands(), vec!["package", "deploy", "describe-stacks"]);
    let calls = runner.calls.borrow();
    assert!(calls.iter().all(|(program, _, timeout)| program == AWS_CLI
        && *timeout == Duration::from_secs(42)));

    let package = &calls[0].1;
    assert!(package.windows(2).any(|w| w == ["--s3-bucket", "assets-bucket"]));
    let deploy = &calls[1].1;
    assert!(deploy.windows(2).any(|w| w
        == ["--template-file", "strata.out/ServerlessStack.packaged.json"]));
    assert!(deploy.windows(2).any(|w| w == ["--region", "ap-northeast-1"]));
    assert!(deploy.contains(&"CAPABILITY_NAMED_IAM".to_string()));

    assert_eq!(
        outputs,
        vec![StackOutput {
            key: "QueueUrl".to_string(),
            value: "https://sqs/queue".to_string(),
            description: Some("Queue".to_string()),
        }]
    );
    assert!(reporter.events.borrow().last().unwrap().starts_with("success:"));
}

#[tokio::test]
async fn test_deploy_without_assets_skips_package() {
    let runner = RecordingRunner::default();
    let outputs = deploy_service::deploy(&runner, &RecordingReporter::default(), &request(false, None))
        .await
        .unwrap();
    assert_eq!(runner.subcommands(), vec!["deploy", "describe-stacks"]);
    assert!(outputs.is_empty());
}

#[tokio::test]
async fn test_deploy_with_assets_requires_bucket() {
    let runner = RecordingRunner::default();
    let err = deploy_service::deploy(&runner, &RecordingReporter::default(), &request(true, None))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("deploy.asset_bucket"), "got: {err}");
    assert!(runner.calls.borrow().is_empty());
}

#[tokio::test]
async fn test_provider_failure_surfaces_stderr() {
    let runner = RecordingRunner::with_responses(vec![err_output(
        b"An error occurred (ValidationError): Template format error\n",
    )]);
    let err = deploy_service::deploy(&runner, &RecordingReporter::default(), &request(false, None))
        .await
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("cloudformation deploy failed"), "got: {msg}");
    assert!(msg.contains("Template format error"), "got: {msg}");
    assert_eq!(runner.calls.borrow().len(), 1);
}

#[tokio::test]
async fn test_destroy_deletes_then_waits() {
    let runner = RecordingRunner::default();
    let reporter = RecordingReporter::default();
    deploy_service::destroy(&runner, &reporter, "WafStack", None, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(runner.subcommands(), vec!["delete-stack", "wait"]);
    let calls = runner.calls.borrow();
    assert_eq!(calls[1].1[2], "stack-delete-complete");
    assert!(!calls[0].1.contains(&"--region".to_string()));
}

#[tokio::test]
async fn test_destroy_stops_when_delete_fails() {
    let runner = RecordingRunner::with_responses(vec![err_output(b"Access denied")]);
    let err = deploy_service::destroy(
        &runner,
        &RecordingReporter::default(),
        "WafStack",
        None,
        Duration::from_secs(5),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("Access denied"));
    assert_eq!(runner.calls.borrow().len(), 1);
}

#[test]
fn test_parse_outputs_accepts_null() {
    assert!(deploy_service::parse_outputs(b"null\n").unwrap().is_empty());
    assert!(deploy_service::parse_outputs(b"").unwrap().is_empty());
    assert!(deploy_service::parse_outputs(b"{not json").is_err());
}

#[test]
fn test_packaged_template_path() {
    assert_eq!(
        deploy_service::packaged_template_path(Path::new("out/WafStack.template.json")),
        Path::new("out/WafStack.packaged.json")
    );
}
