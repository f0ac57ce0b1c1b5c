//! Edge protection: a web ACL of prioritized rules evaluated in front of an
//! endpoint. Evaluation is first-match-wins by ascending priority; the
//! default action applies when nothing matches.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use serde::Serialize;
use serde_json::{Value, json};

use crate::domain::error::EdgeError;
use crate::domain::stack::{ResourceHandle, ResourceProps, Stack};

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Safety: this is a compile-time constant pattern — cannot fail.
    #[allow(clippy::expect_used)]
    Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("valid regex")
});

pub const MIN_RATE_LIMIT: u64 = 100;
pub const MAX_RATE_LIMIT: u64 = 2_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    #[default]
    Regional,
    /// Global distributions; must be deployed in us-east-1.
    Cloudfront,
}

impl Scope {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Regional => "REGIONAL",
            Self::Cloudfront => "CLOUDFRONT",
        }
    }
}

impl FromStr for Scope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "regional" => Ok(Self::Regional),
            "cloudfront" => Ok(Self::Cloudfront),
            _ => Err(EdgeError::UnknownScope(s.to_string()).into()),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action for requests no rule matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefaultAction {
    #[default]
    Allow,
    Block,
}

impl DefaultAction {
    fn to_value(self) -> Value {
        match self {
            Self::Allow => json!({ "Allow": {} }),
            Self::Block => json!({ "Block": {} }),
        }
    }
}

impl FromStr for DefaultAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "block" => Ok(Self::Block),
            _ => Err(EdgeError::UnknownDefaultAction(s.to_string()).into()),
        }
    }
}

impl fmt::Display for DefaultAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Allow => "allow",
            Self::Block => "block",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VisibilityConfig {
    pub cloud_watch_metrics_enabled: bool,
    pub metric_name: String,
    pub sampled_requests_enabled: bool,
}

impl VisibilityConfig {
    /// Metrics and sampled requests on, under `metric_name`.
    #[must_use]
    pub fn enabled(metric_name: &str) -> Self {
        Self {
            cloud_watch_metrics_enabled: true,
            metric_name: metric_name.to_string(),
            sampled_requests_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleStatement {
    ManagedRuleGroup {
        vendor: String,
        name: String,
        excluded_rules: Vec<String>,
    },
    RateBased {
        limit: u64,
    },
    GeoMatch {
        country_codes: Vec<String>,
    },
    IpSetReference {
        arn: String,
    },
}

impl RuleStatement {
    fn to_value(&self) -> Value {
        match self {
            Self::ManagedRuleGroup {
                vendor,
                name,
                excluded_rules,
            } => {
                let mut statement = json!({ "VendorName": vendor, "Name": name });
                if !excluded_rules.is_empty() {
                    statement["ExcludedRules"] = excluded_rules
                        .iter()
                        .map(|rule| json!({ "Name": rule }))
                        .collect();
                }
                json!({ "ManagedRuleGroupStatement": statement })
            }
            Self::RateBased { limit } => json!({
                "RateBasedStatement": { "Limit": limit, "AggregateKeyType": "IP" }
            }),
            Self::GeoMatch { country_codes } => json!({
                "GeoMatchStatement": { "CountryCodes": country_codes }
            }),
            Self::IpSetReference { arn } => json!({
                "IPSetReferenceStatement": { "Arn": arn }
            }),
        }
    }
}

/// What happens when a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    /// Managed groups: keep the group's own actions.
    OverrideNone,
    /// Managed groups: count instead of acting.
    OverrideCount,
    Allow,
    Block,
    Count,
}

impl RuleAction {
    fn is_override(self) -> bool {
        matches!(self, Self::OverrideNone | Self::OverrideCount)
    }

    fn to_entry(self) -> (&'static str, Value) {
        match self {
            Self::OverrideNone => ("OverrideAction", json!({ "None": {} })),
            Self::OverrideCount => ("OverrideAction", json!({ "Count": {} })),
            Self::Allow => ("Action", json!({ "Allow": {} })),
            Self::Block => ("Action", json!({ "Block": {} })),
            Self::Count => ("Action", json!({ "Count": {} })),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRule {
    pub name: String,
    pub priority: u32,
    pub statement: RuleStatement,
    pub action: RuleAction,
    pub visibility: VisibilityConfig,
}

impl EdgeRule {
    /// A managed rule group, named `<vendor>-<group>` and keeping the group's
    /// own actions.
    #[must_use]
    pub fn managed(vendor: &str, group: &str, priority: u32) -> Self {
        let name = format!("{vendor}-{group}");
        Self {
            visibility: VisibilityConfig::enabled(&name),
            name,
            priority,
            statement: RuleStatement::ManagedRuleGroup {
                vendor: vendor.to_string(),
                name: group.to_string(),
                excluded_rules: Vec::new(),
            },
            action: RuleAction::OverrideNone,
        }
    }

    #[must_use]
    pub fn custom(name: &str, priority: u32, statement: RuleStatement, action: RuleAction) -> Self {
        Self {
            name: name.to_string(),
            priority,
            statement,
            action,
            visibility: VisibilityConfig::enabled(name),
        }
    }

    fn validate(&self) -> Result<()> {
        if !NAME_RE.is_match(&self.name) {
            return Err(EdgeError::InvalidName(self.name.clone()).into());
        }
        if !NAME_RE.is_match(&self.visibility.metric_name) {
            return Err(EdgeError::InvalidMetricName(self.visibility.metric_name.clone()).into());
        }
        let managed = matches!(self.statement, RuleStatement::ManagedRuleGroup { .. });
        if managed != self.action.is_override() {
            return Err(EdgeError::ActionMismatch(self.name.clone()).into());
        }
        match &self.statement {
            RuleStatement::RateBased { limit }
                if !(MIN_RATE_LIMIT..=MAX_RATE_LIMIT).contains(limit) =>
            {
                Err(EdgeError::InvalidRateLimit(*limit).into())
            }
            RuleStatement::GeoMatch { country_codes } if country_codes.is_empty() => {
                Err(EdgeError::EmptyCountryList.into())
            }
            RuleStatement::GeoMatch { country_codes } => {
                match country_codes
                    .iter()
                    .find(|c| c.len() != 2 || !c.chars().all(|ch| ch.is_ascii_uppercase()))
                {
                    Some(code) => Err(EdgeError::InvalidCountryCode(code.clone()).into()),
                    None => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }

    fn to_value(&self) -> Value {
        let (key, action) = self.action.to_entry();
        let mut rule = json!({
            "Name": self.name,
            "Priority": self.priority,
            "Statement": self.statement.to_value(),
            "VisibilityConfig": self.visibility,
        });
        rule[key] = action;
        rule
    }
}

#[derive(Debug, Clone)]
pub struct EdgePolicyProps {
    pub name: String,
    pub scope: Scope,
    pub default_action: DefaultAction,
    pub visibility: VisibilityConfig,
    pub rules: Vec<EdgeRule>,
    /// ARN of a load balancer, API stage or GraphQL API to protect. Without
    /// it the policy has no effect until attached elsewhere.
    pub association: Option<String>,
}

impl EdgePolicyProps {
    /// # Errors
    ///
    /// Returns the first invalid name, duplicate priority or name, invalid
    /// statement, or an association on a global policy.
    pub fn validate(&self) -> Result<()> {
        if !NAME_RE.is_match(&self.name) {
            return Err(EdgeError::InvalidName(self.name.clone()).into());
        }
        if !NAME_RE.is_match(&self.visibility.metric_name) {
            return Err(EdgeError::InvalidMetricName(self.visibility.metric_name.clone()).into());
        }
        let mut priorities = BTreeSet::new();
        let mut names = BTreeSet::new();
        for rule in &self.rules {
            rule.validate()?;
            if !priorities.insert(rule.priority) {
                return Err(EdgeError::DuplicatePriority(rule.priority).into());
            }
            if !names.insert(rule.name.as_str()) {
                return Err(EdgeError::DuplicateRuleName(rule.name.clone()).into());
            }
        }
        if self.association.is_some() && self.scope != Scope::Regional {
            return Err(EdgeError::AssociationRequiresRegional.into());
        }
        Ok(())
    }

    /// Rules in the order the provider evaluates them.
    #[must_use]
    pub fn rules_in_evaluation_order(&self) -> Vec<&EdgeRule> {
        let mut rules: Vec<&EdgeRule> = self.rules.iter().collect();
        rules.sort_by_key(|r| r.priority);
        rules
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WebAclResource {
    name: String,
    scope: &'static str,
    default_action: Value,
    visibility_config: VisibilityConfig,
    rules: Vec<Value>,
}

impl ResourceProps for WebAclResource {
    const TYPE: &'static str = "AWS::WAFv2::WebACL";
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AssociationResource {
    resource_arn: String,
    #[serde(rename = "WebACLArn")]
    web_acl_arn: strata_common::Expr,
}

impl ResourceProps for AssociationResource {
    const TYPE: &'static str = "AWS::WAFv2::WebACLAssociation";
}

#[derive(Debug, Clone)]
pub struct EdgePolicy {
    pub web_acl: ResourceHandle,
    pub association: Option<ResourceHandle>,
}

impl EdgePolicy {
    /// Declare the web ACL under construct id `id`, plus its association
    /// when one is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the props are invalid or a logical id collides.
    pub fn build(stack: &mut Stack, id: &str, props: &EdgePolicyProps) -> Result<Self> {
        props.validate()?;
        let web_acl = stack.add(
            &[id],
            &WebAclResource {
                name: props.name.clone(),
                scope: props.scope.as_str(),
                default_action: props.default_action.to_value(),
                visibility_config: props.visibility.clone(),
                rules: props
                    .rules_in_evaluation_order()
                    .into_iter()
                    .map(EdgeRule::to_value)
                    .collect(),
            },
        )?;
        let association = props
            .association
            .as_ref()
            .map(|arn| {
                stack.add(
                    &[id, "Association"],
                    &AssociationResource {
                        resource_arn: arn.clone(),
                        web_acl_arn: web_acl.attr("Arn"),
                    },
                )
            })
            .transpose()?;
        Ok(Self {
            web_acl,
            association,
        })
    }
}
