//! Domain types and validators for strata configuration.
//!
//! Pure functions only — no I/O, no async, no filesystem access.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use anyhow::Result;
use ipnetwork::Ipv4Network;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::compute::validate_capacity;
use crate::domain::data::{MAX_INSTANCES, SecretReference};
use crate::domain::edge::{DefaultAction, Scope};
use crate::domain::error::ConfigError;
use crate::domain::network::{MAX_AZS, MAX_SUBNET_MASK, MIN_SUBNET_MASK};
use crate::domain::storage::{QueueProps, validate_bucket_name};

static REGION_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Safety: this is a compile-time constant pattern — cannot fail.
    #[allow(clippy::expect_used)]
    Regex::new(r"^[a-z]{2}(-[a-z]+)+-\d+$").expect("valid regex")
});

// ── Constants ────────────────────────────────────────────────────────────────

pub const VALID_CONFIG_KEYS: &[&str] = &[
    "region",
    "output_dir",
    "basic_server.cidr",
    "basic_server.max_azs",
    "basic_server.secret_arn",
    "basic_server.min_capacity",
    "basic_server.max_capacity",
    "basic_server.cpu_target_percent",
    "basic_server.cooldown_minutes",
    "basic_server.bastion",
    "basic_server.nat_gateways",
    "serverless.bucket_name",
    "serverless.queue_name",
    "serverless.code_path",
    "waf.scope",
    "waf.default_action",
    "waf.association_arn",
    "deploy.asset_bucket",
];

/// Value that clears an optional setting.
pub const UNSET: &str = "none";

/// X-Ray daemon package installed by the default bootstrap.
pub const XRAY_DAEMON_RPM: &str = "https://s3.dualstack.ap-northeast-1.amazonaws.com/aws-xray-assets.ap-northeast-1/xray-daemon/aws-xray-daemon-3.x.rpm";

/// Longest accepted scaling cooldown (one day).
pub const MAX_COOLDOWN_MINUTES: u64 = 24 * 60;

// ── Config schema ────────────────────────────────────────────────────────────

/// Top-level configuration stored in `strata.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StrataConfig {
    /// Region passed to the AWS CLI; its own default applies when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Directory receiving synthesized templates.
    pub output_dir: String,
    pub basic_server: BasicServerConfig,
    pub serverless: ServerlessConfig,
    pub waf: WafConfig,
    pub deploy: DeployConfig,
}

impl Default for StrataConfig {
    fn default() -> Self {
        Self {
            region: None,
            output_dir: "strata.out".to_string(),
            basic_server: BasicServerConfig::default(),
            serverless: ServerlessConfig::default(),
            waf: WafConfig::default(),
            deploy: DeployConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BasicServerConfig {
    pub cidr: String,
    pub max_azs: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nat_gateways: Option<u8>,
    /// Secret holding `username` and `password` for the database.
    pub secret_arn: String,
    pub instance_type: String,
    pub min_capacity: u32,
    pub max_capacity: u32,
    pub cpu_target_percent: u8,
    pub cooldown_minutes: u64,
    pub bastion: bool,
    /// Commands run in order at instance boot.
    pub bootstrap: Vec<String>,
    pub db_instance_type: String,
    pub db_instances: u8,
    pub db_parameters: BTreeMap<String, String>,
}

impl Default for BasicServerConfig {
    fn default() -> Self {
        Self {
            cidr: "10.0.0.0/16".to_string(),
            max_azs: 2,
            nat_gateways: None,
            secret_arn: "arn:aws:secretsmanager:ap-northeast-1:123456:secret:sample".to_string(),
            instance_type: "t2.micro".to_string(),
            min_capacity: 2,
            max_capacity: 6,
            cpu_target_percent: 95,
            cooldown_minutes: 10,
            bastion: false,
            bootstrap: vec![
                "sudo yum install -y httpd".to_string(),
                "sudo service httpd start".to_string(),
                format!("curl {XRAY_DAEMON_RPM} -o /home/ec2-user/xray.rpm"),
                "yum install -y /home/ec2-user/xray.rpm".to_string(),
            ],
            db_instance_type: "t3.small".to_string(),
            db_instances: 2,
            db_parameters: BTreeMap::from([
                ("character_set_client".to_string(), "utf8mb4".to_string()),
                ("character_set_server".to_string(), "utf8mb4".to_string()),
                ("collation_server".to_string(), "utf8_general_ci".to_string()),
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerlessConfig {
    pub bucket_name: String,
    pub queue_name: String,
    /// Directory holding the function code, relative to the working directory.
    pub code_path: String,
    pub handler: String,
    pub runtime: String,
}

impl Default for ServerlessConfig {
    fn default() -> Self {
        Self {
            bucket_name: "very-unique-bucket-name-2205".to_string(),
            queue_name: "serverless-queue".to_string(),
            code_path: "lambda_code".to_string(),
            handler: "index.handler".to_string(),
            runtime: "nodejs20.x".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WafConfig {
    pub name: String,
    pub scope: String,
    pub default_action: String,
    /// AWS managed rule groups, in priority order starting at 1.
    pub managed_rule_groups: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub association_arn: Option<String>,
}

impl Default for WafConfig {
    fn default() -> Self {
        Self {
            name: "MyWebACL".to_string(),
            scope: "regional".to_string(),
            default_action: "allow".to_string(),
            managed_rule_groups: vec!["AWSManagedRulesCommonRuleSet".to_string()],
            association_arn: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeployConfig {
    /// Bucket receiving packaged assets; required for stacks with assets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_bucket: Option<String>,
    /// Upper bound for a single AWS CLI invocation.
    pub timeout_secs: u64,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            asset_bucket: None,
            timeout_secs: 1800,
        }
    }
}

// ── Validators ───────────────────────────────────────────────────────────────

/// Validates a configuration key against the whitelist.
///
/// # Errors
///
/// Returns an error if the key is not in the allowed list.
pub fn validate_config_key(key: &str) -> Result<()> {
    if !VALID_CONFIG_KEYS.contains(&key) {
        return Err(ConfigError::UnknownKey {
            key: key.to_string(),
            valid: VALID_CONFIG_KEYS.join(", "),
        }
        .into());
    }
    Ok(())
}

fn invalid(key: &str, value: &str, valid: &str) -> anyhow::Error {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        valid: valid.to_string(),
    }
    .into()
}

fn parse_in_range<T>(key: &str, value: &str, range: std::ops::RangeInclusive<T>) -> Result<T>
where
    T: std::str::FromStr + PartialOrd + std::fmt::Display,
{
    let valid = format!("{}..={}", range.start(), range.end());
    value
        .parse::<T>()
        .ok()
        .filter(|n| range.contains(n))
        .ok_or_else(|| invalid(key, value, &valid))
}

/// Validates a configuration value for the given key.
///
/// # Errors
///
/// Returns an error if the value is not valid for the key.
pub fn validate_config_value(key: &str, value: &str) -> Result<()> {
    match key {
        "region" if !REGION_RE.is_match(value) => {
            Err(invalid(key, value, "a region name such as ap-northeast-1"))
        }
        "output_dir" | "serverless.code_path" if value.trim().is_empty() => {
            Err(invalid(key, value, "a non-empty path"))
        }
        "basic_server.cidr" => match value.parse::<Ipv4Network>() {
            Ok(net) if (MIN_SUBNET_MASK..MAX_SUBNET_MASK).contains(&net.prefix()) => Ok(()),
            _ => Err(invalid(
                key,
                value,
                &format!("an IPv4 CIDR with prefix /{MIN_SUBNET_MASK}../{}", MAX_SUBNET_MASK - 1),
            )),
        },
        "basic_server.max_azs" => parse_in_range(key, value, 1..=MAX_AZS).map(drop),
        "basic_server.nat_gateways" if value == UNSET => Ok(()),
        "basic_server.nat_gateways" => parse_in_range(key, value, 1..=MAX_AZS).map(drop),
        "basic_server.secret_arn" => SecretReference::parse(value)
            .map(drop)
            .map_err(|_| invalid(key, value, "arn:<partition>:secretsmanager:<region>:<account>:secret:<name>")),
        "basic_server.min_capacity" | "basic_server.max_capacity" => {
            parse_in_range(key, value, 1..=u32::MAX).map(drop)
        }
        "basic_server.cpu_target_percent" => parse_in_range(key, value, 1..=100u8).map(drop),
        "basic_server.cooldown_minutes" => parse_in_range(key, value, 1..=MAX_COOLDOWN_MINUTES).map(drop),
        "basic_server.bastion" => value
            .parse::<bool>()
            .map(drop)
            .map_err(|_| invalid(key, value, "true, false")),
        "serverless.bucket_name" => validate_bucket_name(value),
        "deploy.asset_bucket" if value == UNSET => Ok(()),
        "deploy.asset_bucket" => validate_bucket_name(value),
        "serverless.queue_name" => QueueProps {
            queue_name: Some(value.to_string()),
            visibility_timeout: None,
        }
        .validate(),
        "waf.scope" => value
            .parse::<Scope>()
            .map(drop)
            .map_err(|_| invalid(key, value, "regional, cloudfront")),
        "waf.default_action" => value
            .parse::<DefaultAction>()
            .map(drop)
            .map_err(|_| invalid(key, value, "allow, block")),
        "waf.association_arn" if value != UNSET && !value.starts_with("arn:") => {
            Err(invalid(key, value, "an ARN, or none"))
        }
        _ => Ok(()),
    }
}

/// Store a validated value into `config`.
///
/// # Errors
///
/// Returns an error if the key or value is invalid, or if the change would
/// leave the capacity bounds inconsistent.
pub fn apply_config_value(config: &mut StrataConfig, key: &str, value: &str) -> Result<()> {
    validate_config_key(key)?;
    validate_config_value(key, value)?;
    let optional = |v: &str| (v != UNSET).then(|| v.to_string());
    let basic = &mut config.basic_server;
    match key {
        "region" => config.region = Some(value.to_string()),
        "output_dir" => config.output_dir = value.to_string(),
        "basic_server.cidr" => basic.cidr = value.to_string(),
        "basic_server.max_azs" => basic.max_azs = value.parse()?,
        "basic_server.nat_gateways" => {
            basic.nat_gateways = optional(value).map(|v| v.parse()).transpose()?;
        }
        "basic_server.secret_arn" => basic.secret_arn = value.to_string(),
        "basic_server.min_capacity" => basic.min_capacity = value.parse()?,
        "basic_server.max_capacity" => basic.max_capacity = value.parse()?,
        "basic_server.cpu_target_percent" => basic.cpu_target_percent = value.parse()?,
        "basic_server.cooldown_minutes" => basic.cooldown_minutes = value.parse()?,
        "basic_server.bastion" => basic.bastion = value.parse()?,
        "serverless.bucket_name" => config.serverless.bucket_name = value.to_string(),
        "serverless.queue_name" => config.serverless.queue_name = value.to_string(),
        "serverless.code_path" => config.serverless.code_path = value.to_string(),
        "waf.scope" => config.waf.scope = value.to_ascii_lowercase(),
        "waf.default_action" => config.waf.default_action = value.to_ascii_lowercase(),
        "waf.association_arn" => config.waf.association_arn = optional(value),
        "deploy.asset_bucket" => config.deploy.asset_bucket = optional(value),
        _ => {}
    }
    validate_capacity(
        config.basic_server.min_capacity,
        config.basic_server.max_capacity,
        None,
    )
}

impl StrataConfig {
    /// Current value of every whitelisted key that is set, in whitelist
    /// order.
    fn settings(&self) -> Vec<(&'static str, String)> {
        let basic = &self.basic_server;
        let mut settings = vec![
            ("output_dir", self.output_dir.clone()),
            ("basic_server.cidr", basic.cidr.clone()),
            ("basic_server.max_azs", basic.max_azs.to_string()),
            ("basic_server.secret_arn", basic.secret_arn.clone()),
            ("basic_server.min_capacity", basic.min_capacity.to_string()),
            ("basic_server.max_capacity", basic.max_capacity.to_string()),
            ("basic_server.cpu_target_percent", basic.cpu_target_percent.to_string()),
            ("basic_server.cooldown_minutes", basic.cooldown_minutes.to_string()),
            ("serverless.bucket_name", self.serverless.bucket_name.clone()),
            ("serverless.queue_name", self.serverless.queue_name.clone()),
            ("serverless.code_path", self.serverless.code_path.clone()),
            ("waf.scope", self.waf.scope.clone()),
            ("waf.default_action", self.waf.default_action.clone()),
        ];
        let optional = [
            ("region", self.region.clone()),
            ("basic_server.nat_gateways", basic.nat_gateways.map(|n| n.to_string())),
            ("waf.association_arn", self.waf.association_arn.clone()),
            ("deploy.asset_bucket", self.deploy.asset_bucket.clone()),
        ];
        settings.extend(optional.into_iter().filter_map(|(key, value)| Some((key, value?))));
        settings
    }

    /// Check every value the same way `config set` would, so a hand-edited
    /// file fails here, naming the key, rather than during composition.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for the first out-of-range
    /// value, or an error if the capacity bounds are inverted.
    pub fn validate(&self) -> Result<()> {
        for (key, value) in self.settings() {
            validate_config_value(key, &value)?;
        }
        let basic = &self.basic_server;
        if !(1..=MAX_INSTANCES).contains(&basic.db_instances) {
            return Err(invalid(
                "basic_server.db_instances",
                &basic.db_instances.to_string(),
                &format!("1..={MAX_INSTANCES}"),
            ));
        }
        if self.deploy.timeout_secs == 0 {
            return Err(invalid("deploy.timeout_secs", "0", "1 or more"));
        }
        validate_capacity(basic.min_capacity, basic.max_capacity, None)
    }
}

// ── Unit tests ───────────────────────────────────────────────────────────────
