//! Object store and the event pipeline hanging off it:
//! bucket → function (on object creation) → queue.
//!
//! Delivery is at-least-once and unordered; the function body handles
//! duplicates.

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use strata_common::{AssetEntry, DeletionPolicy, Expr};

use crate::domain::error::StorageError;
use crate::domain::iam::{self, PolicyDocument, PolicyStatement, RoleProps, ServicePrincipal};
use crate::domain::stack::{ResourceHandle, ResourceProps, Stack};

/// Event that triggers the function.
pub const OBJECT_CREATED: &str = "s3:ObjectCreated:*";

/// Environment variable carrying the queue URL into the function.
pub const QUEUE_URL_VARIABLE: &str = "SQS_QUEUE_URL";

// ── Bucket ───────────────────────────────────────────────────────────────────

/// What happens to the bucket when the stack is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Removal {
    #[default]
    Retain,
    Destroy,
}

impl Removal {
    fn policy(self) -> DeletionPolicy {
        match self {
            Self::Retain => DeletionPolicy::Retain,
            Self::Destroy => DeletionPolicy::Delete,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BucketProps {
    /// Generated by the provider when absent.
    pub bucket_name: Option<String>,
    pub removal: Removal,
}

/// Check a bucket name against the provider's naming rules.
///
/// # Errors
///
/// Returns the first rule the name breaks.
pub fn validate_bucket_name(name: &str) -> Result<()> {
    let fail = |reason| -> Result<()> {
        Err(StorageError::InvalidBucketName {
            name: name.to_string(),
            reason,
        }
        .into())
    };
    if !(3..=63).contains(&name.len()) {
        return fail("must be 3-63 characters long");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return fail("only lowercase letters, digits, '-' and '.' are allowed");
    }
    let alnum = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !alnum(name.chars().next()) || !alnum(name.chars().last()) {
        return fail("must start and end with a letter or digit");
    }
    if name.contains("..") {
        return fail("must not contain two adjacent periods");
    }
    if name.parse::<Ipv4Addr>().is_ok() {
        return fail("must not be formatted as an IP address");
    }
    Ok(())
}

impl BucketProps {
    /// # Errors
    ///
    /// Returns an error if the name breaks the naming rules.
    pub fn validate(&self) -> Result<()> {
        self.bucket_name
            .as_deref()
            .map_or(Ok(()), validate_bucket_name)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct FilterRule {
    name: &'static str,
    value: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct KeyFilter {
    #[serde(rename = "S3Key")]
    s3_key: RulesWrapper,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct RulesWrapper {
    rules: Vec<FilterRule>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct LambdaConfiguration {
    event: &'static str,
    function: Expr,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<KeyFilter>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct NotificationConfiguration {
    lambda_configurations: Vec<LambdaConfiguration>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct BucketResource {
    #[serde(skip_serializing_if = "Option::is_none")]
    bucket_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification_configuration: Option<NotificationConfiguration>,
}

impl ResourceProps for BucketResource {
    const TYPE: &'static str = "AWS::S3::Bucket";
}

/// Declare a plain bucket under `path`.
///
/// # Errors
///
/// Returns an error if the name is invalid or the logical id collides.
pub fn build_bucket(stack: &mut Stack, path: &[&str], props: &BucketProps) -> Result<ResourceHandle> {
    props.validate()?;
    let bucket = stack.add(
        path,
        &BucketResource {
            bucket_name: props.bucket_name.clone(),
            notification_configuration: None,
        },
    )?;
    stack.set_removal_policy(&bucket, props.removal.policy())?;
    Ok(bucket)
}

/// Bucket ARN and the ARN covering every object in it.
#[must_use]
pub fn bucket_arns(bucket: &ResourceHandle) -> [Expr; 2] {
    [
        bucket.attr("Arn"),
        Expr::join("", vec![bucket.attr("Arn"), Expr::str("/*")]),
    ]
}

// ── Queue ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct QueueProps {
    pub queue_name: Option<String>,
    pub visibility_timeout: Option<Duration>,
}

impl QueueProps {
    /// # Errors
    ///
    /// Returns an error if the name is not 1-80 characters of `[A-Za-z0-9_-]`
    /// (plus an optional `.fifo` suffix).
    pub fn validate(&self) -> Result<()> {
        let Some(name) = &self.queue_name else {
            return Ok(());
        };
        let base = name.strip_suffix(".fifo").unwrap_or(name);
        let valid = !base.is_empty()
            && name.len() <= 80
            && base
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StorageError::InvalidQueueName(name.clone()).into());
        }
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct QueueResource {
    #[serde(skip_serializing_if = "Option::is_none")]
    queue_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    visibility_timeout: Option<u64>,
}

impl ResourceProps for QueueResource {
    const TYPE: &'static str = "AWS::SQS::Queue";
}

// ── Function ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Runtime {
    Nodejs12x,
    Nodejs18x,
    Nodejs20x,
    Python312,
    ProvidedAl2023,
}

impl Runtime {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nodejs12x => "nodejs12.x",
            Self::Nodejs18x => "nodejs18.x",
            Self::Nodejs20x => "nodejs20.x",
            Self::Python312 => "python3.12",
            Self::ProvidedAl2023 => "provided.al2023",
        }
    }
}

impl FromStr for Runtime {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        [
            Self::Nodejs12x,
            Self::Nodejs18x,
            Self::Nodejs20x,
            Self::Python312,
            Self::ProvidedAl2023,
        ]
        .into_iter()
        .find(|r| r.as_str() == s)
        .ok_or_else(|| StorageError::UnknownRuntime(s.to_string()).into())
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionCode {
    /// Local directory uploaded by the deploy step. `hash` identifies its
    /// contents so unchanged code is not redeployed.
    Asset { path: String, hash: String },
    Inline(String),
}

/// Directory, relative to the synthesis output, that an asset with content
/// hash `hash` is staged into. Templates point function code at it.
#[must_use]
pub fn staged_asset_dir(hash: &str) -> String {
    format!("asset.{hash}")
}

#[derive(Debug, Clone)]
pub struct FunctionProps {
    pub runtime: Runtime,
    pub handler: String,
    pub code: FunctionCode,
    pub environment: BTreeMap<String, Expr>,
    /// MB
    pub memory_size: u32,
    pub timeout: Duration,
}

impl FunctionProps {
    #[must_use]
    pub fn new(runtime: Runtime, handler: &str, code: FunctionCode) -> Self {
        Self {
            runtime,
            handler: handler.to_string(),
            code,
            environment: BTreeMap::new(),
            memory_size: 128,
            timeout: Duration::from_secs(3),
        }
    }

    /// # Errors
    ///
    /// Returns an error on an empty handler, or memory or timeout outside
    /// the provider's limits.
    pub fn validate(&self) -> Result<()> {
        if self.handler.trim().is_empty() {
            return Err(StorageError::EmptyHandler.into());
        }
        if !(128..=10_240).contains(&self.memory_size) {
            return Err(StorageError::InvalidMemorySize(self.memory_size).into());
        }
        if !(1..=900).contains(&self.timeout.as_secs()) {
            return Err(StorageError::InvalidTimeout(self.timeout.as_secs()).into());
        }
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Environment {
    variables: BTreeMap<String, Expr>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct FunctionResource {
    /// A local path for packaged assets, `{"ZipFile": ...}` for inline code.
    code: Value,
    handler: String,
    role: Expr,
    runtime: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    environment: Option<Environment>,
    memory_size: u32,
    timeout: u64,
}

impl ResourceProps for FunctionResource {
    const TYPE: &'static str = "AWS::Lambda::Function";
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PermissionResource {
    action: &'static str,
    function_name: Expr,
    principal: &'static str,
    source_account: Expr,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_arn: Option<Expr>,
}

impl ResourceProps for PermissionResource {
    const TYPE: &'static str = "AWS::Lambda::Permission";
}

// ── Pipeline ─────────────────────────────────────────────────────────────────

/// Optional key filter on the creation event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationFilter {
    pub prefix: Option<String>,
    pub suffix: Option<String>,
}

impl NotificationFilter {
    fn to_resource(&self) -> Option<KeyFilter> {
        let mut rules = Vec::new();
        if let Some(prefix) = &self.prefix {
            rules.push(FilterRule {
                name: "prefix",
                value: prefix.clone(),
            });
        }
        if let Some(suffix) = &self.suffix {
            rules.push(FilterRule {
                name: "suffix",
                value: suffix.clone(),
            });
        }
        (!rules.is_empty()).then_some(KeyFilter {
            s3_key: RulesWrapper { rules },
        })
    }
}

#[derive(Debug, Clone)]
pub struct EventPipelineProps {
    pub bucket: BucketProps,
    pub queue: QueueProps,
    pub function: FunctionProps,
    pub filter: NotificationFilter,
}

#[derive(Debug, Clone)]
pub struct EventPipeline {
    pub bucket: ResourceHandle,
    pub queue: ResourceHandle,
    pub role: ResourceHandle,
    pub function: ResourceHandle,
    pub permission: ResourceHandle,
}

impl EventPipeline {
    /// Declare bucket, queue, function and the wiring between them under
    /// construct id `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if any props are invalid or a logical id collides.
    pub fn build(stack: &mut Stack, id: &str, props: &EventPipelineProps) -> Result<Self> {
        props.bucket.validate()?;
        props.queue.validate()?;
        props.function.validate()?;

        let queue = stack.add(
            &[id, "Queue"],
            &QueueResource {
                queue_name: props.queue.queue_name.clone(),
                visibility_timeout: props.queue.visibility_timeout.map(|d| d.as_secs()),
            },
        )?;
        stack.set_removal_policy(&queue, DeletionPolicy::Delete)?;

        let role = iam::build_role(
            stack,
            &[id, "FunctionRole"],
            &RoleProps::new(ServicePrincipal::Lambda)
                .with_managed_policy("service-role/AWSLambdaBasicExecutionRole")
                .with_inline_policy(
                    "custom-lambda-role",
                    PolicyDocument::new(vec![PolicyStatement::allow(
                        "SendToQueue",
                        &["sqs:SendMessage"],
                        vec![queue.attr("Arn")],
                    )]),
                ),
        )?;

        let mut variables = props.function.environment.clone();
        variables.insert(QUEUE_URL_VARIABLE.to_string(), queue.reference());
        let code = match &props.function.code {
            FunctionCode::Asset { hash, .. } => Value::String(staged_asset_dir(hash)),
            FunctionCode::Inline(source) => serde_json::json!({ "ZipFile": source }),
        };
        let function = stack.add(
            &[id, "Function"],
            &FunctionResource {
                code,
                handler: props.function.handler.clone(),
                role: role.attr("Arn"),
                runtime: props.function.runtime.as_str(),
                environment: Some(Environment { variables }),
                memory_size: props.function.memory_size,
                timeout: props.function.timeout.as_secs(),
            },
        )?;
        stack.add_dependency(&function, &role)?;
        if let FunctionCode::Asset { path, hash } = &props.function.code {
            stack.add_metadata(&function, "aws:asset:path", Value::String(staged_asset_dir(hash)))?;
            stack.add_asset(AssetEntry {
                logical_id: function.logical_id().to_string(),
                path: path.clone(),
                hash: hash.clone(),
            });
        }

        // The bucket notification depends on the permission, so the
        // permission may only name the bucket by a literal ARN.
        let source_arn = props
            .bucket
            .bucket_name
            .as_ref()
            .map(|name| Expr::sub(format!("arn:${{AWS::Partition}}:s3:::{name}")));
        let permission = stack.add(
            &[id, "InvokePermission"],
            &PermissionResource {
                action: "lambda:InvokeFunction",
                function_name: function.attr("Arn"),
                principal: "s3.amazonaws.com",
                source_account: Expr::reference(strata_common::pseudo::ACCOUNT_ID),
                source_arn,
            },
        )?;

        let bucket = stack.add(
            &[id, "Bucket"],
            &BucketResource {
                bucket_name: props.bucket.bucket_name.clone(),
                notification_configuration: Some(NotificationConfiguration {
                    lambda_configurations: vec![LambdaConfiguration {
                        event: OBJECT_CREATED,
                        function: function.attr("Arn"),
                        filter: props.filter.to_resource(),
                    }],
                }),
            },
        )?;
        stack.set_removal_policy(&bucket, props.bucket.removal.policy())?;
        stack.add_dependency(&bucket, &permission)?;

        Ok(Self {
            bucket,
            queue,
            role,
            function,
            permission,
        })
    }
}
