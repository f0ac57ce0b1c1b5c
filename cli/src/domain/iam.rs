//! Identity and access declarations: roles, instance profiles and policy
//! documents attached to compute and function resources.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;
use strata_common::Expr;

use crate::domain::stack::{ResourceHandle, ResourceProps, Stack};

/// Policy language version used by every document.
pub const POLICY_VERSION: &str = "2012-10-17";

/// Service allowed to assume a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServicePrincipal {
    Ec2,
    Lambda,
}

impl ServicePrincipal {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ec2 => "ec2.amazonaws.com",
            Self::Lambda => "lambda.amazonaws.com",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

/// One statement of a policy document.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    pub effect: Effect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<BTreeMap<String, Expr>>,
    pub action: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resource: Vec<Expr>,
}

impl PolicyStatement {
    /// An `Allow` statement for `actions` on `resources`.
    #[must_use]
    pub fn allow(sid: &str, actions: &[&str], resources: Vec<Expr>) -> Self {
        Self {
            sid: Some(sid.to_string()),
            effect: Effect::Allow,
            principal: None,
            action: actions.iter().map(|a| (*a).to_string()).collect(),
            resource: resources,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: &'static str,
    pub statement: Vec<PolicyStatement>,
}

impl PolicyDocument {
    #[must_use]
    pub fn new(statements: Vec<PolicyStatement>) -> Self {
        Self {
            version: POLICY_VERSION,
            statement: statements,
        }
    }

    /// Trust policy letting `principal` assume the role.
    #[must_use]
    pub fn assume_role(principal: ServicePrincipal) -> Self {
        Self::new(vec![PolicyStatement {
            sid: None,
            effect: Effect::Allow,
            principal: Some(BTreeMap::from([(
                "Service".to_string(),
                Expr::str(principal.as_str()),
            )])),
            action: vec!["sts:AssumeRole".to_string()],
            resource: Vec::new(),
        }])
    }
}

/// Role declaration: who may assume it and what it may do.
#[derive(Debug, Clone)]
pub struct RoleProps {
    pub assumed_by: ServicePrincipal,
    /// Names of provider-managed policies, e.g. `AmazonS3ReadOnlyAccess`.
    pub managed_policies: Vec<String>,
    pub inline_policies: BTreeMap<String, PolicyDocument>,
}

impl RoleProps {
    #[must_use]
    pub fn new(assumed_by: ServicePrincipal) -> Self {
        Self {
            assumed_by,
            managed_policies: Vec::new(),
            inline_policies: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_managed_policy(mut self, name: &str) -> Self {
        self.managed_policies.push(name.to_string());
        self
    }

    #[must_use]
    pub fn with_inline_policy(mut self, name: &str, document: PolicyDocument) -> Self {
        self.inline_policies.insert(name.to_string(), document);
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct RoleResource {
    assume_role_policy_document: PolicyDocument,
    #[serde(rename = "ManagedPolicyArns", skip_serializing_if = "Vec::is_empty")]
    managed_policy_arns: Vec<Expr>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    policies: Vec<InlinePolicy>,
}

impl ResourceProps for RoleResource {
    const TYPE: &'static str = "AWS::IAM::Role";
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct InlinePolicy {
    policy_name: String,
    policy_document: PolicyDocument,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceProfileResource {
    roles: Vec<Expr>,
}

impl ResourceProps for InstanceProfileResource {
    const TYPE: &'static str = "AWS::IAM::InstanceProfile";
}

/// ARN of a provider-managed policy, partition-independent.
#[must_use]
pub fn managed_policy_arn(name: &str) -> Expr {
    Expr::sub(format!("arn:${{AWS::Partition}}:iam::aws:policy/{name}"))
}

/// Declare a role under `path`.
///
/// # Errors
///
/// Returns an error if the logical id is already taken.
pub fn build_role(stack: &mut Stack, path: &[&str], props: &RoleProps) -> Result<ResourceHandle> {
    let resource = RoleResource {
        assume_role_policy_document: PolicyDocument::assume_role(props.assumed_by),
        managed_policy_arns: props
            .managed_policies
            .iter()
            .map(|name| managed_policy_arn(name))
            .collect(),
        policies: props
            .inline_policies
            .iter()
            .map(|(name, doc)| InlinePolicy {
                policy_name: name.clone(),
                policy_document: doc.clone(),
            })
            .collect(),
    };
    stack.add(path, &resource)
}

/// Declare an instance profile wrapping `role`.
///
/// # Errors
///
/// Returns an error if the logical id is already taken.
pub fn build_instance_profile(
    stack: &mut Stack,
    path: &[&str],
    role: &ResourceHandle,
) -> Result<ResourceHandle> {
    stack.add(
        path,
        &InstanceProfileResource {
            roles: vec![role.reference()],
        },
    )
}
