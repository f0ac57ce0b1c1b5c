//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs` or `std::process`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use thiserror::Error;

// ── Stack errors ──────────────────────────────────────────────────────────────

/// Errors raised while assembling or synthesizing a resource graph.
#[derive(Debug, Error)]
pub enum StackError {
    #[error("Invalid stack name '{0}': must match ^[A-Za-z][A-Za-z0-9-]{{0,127}}$")]
    InvalidName(String),

    #[error("Duplicate logical id '{id}' (construct path '{path}')")]
    DuplicateLogicalId { id: String, path: String },

    #[error("Duplicate parameter '{0}'")]
    DuplicateParameter(String),

    #[error("Duplicate output '{0}'")]
    DuplicateOutput(String),

    #[error("Resource '{0}' is not part of this stack")]
    UnknownResource(String),

    #[error("'{from}' references '{target}', which is not declared in this stack")]
    DanglingReference { from: String, target: String },

    #[error("Dependency cycle between: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    #[error("Cannot serialize properties of '{path}': {reason}")]
    Serialization { path: String, reason: String },
}

// ── Network errors ────────────────────────────────────────────────────────────

/// Errors in a network declaration.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Invalid network CIDR '{0}'")]
    InvalidCidr(String),

    #[error("max_azs must be between 1 and 6 (got {0})")]
    InvalidAzCount(u8),

    #[error("A network needs at least one subnet group")]
    NoSubnets,

    #[error("Subnet group names must not be empty")]
    EmptySubnetName,

    #[error("Duplicate subnet group name '{0}'")]
    DuplicateSubnetName(String),

    #[error("Subnet group '{name}' has cidr_mask /{mask}; allowed range is /{min}../{max}")]
    InvalidCidrMask { name: String, mask: u8, min: u8, max: u8 },

    #[error("Private subnets with egress need a public subnet group to host the egress point")]
    EgressWithoutPublic,

    #[error("nat_gateways must be between 1 and {max} (got {requested})")]
    InvalidNatCount { requested: u8, max: u8 },

    #[error("nat_gateways is set but no private subnet group uses egress")]
    NatWithoutPrivate,

    #[error("Address space exhausted while allocating subnet group '{name}' in AZ {az}")]
    AddressSpaceExhausted { name: String, az: usize },

    #[error("Network has no {0} subnets")]
    NoSubnetsOfType(String),
}

// ── Security boundary errors ──────────────────────────────────────────────────

/// Errors in security boundary declarations.
#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("Security boundary names must not be empty")]
    EmptyName,

    #[error("Invalid port range {from}-{to}")]
    InvalidPortRange { from: u16, to: u16 },

    #[error("Boundary '{boundary}' allows traffic from unknown boundary '{peer}'")]
    UnknownPeer { boundary: String, peer: String },

    #[error("Security boundary '{0}' is declared twice")]
    DuplicateBoundary(String),
}

// ── Compute errors ────────────────────────────────────────────────────────────

/// Errors in a compute tier declaration.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("min_capacity must be at least 1")]
    ZeroMinCapacity,

    #[error("min_capacity ({min}) must not exceed max_capacity ({max})")]
    CapacityBounds { min: u32, max: u32 },

    #[error("desired_capacity ({desired}) must be within [{min}, {max}]")]
    DesiredOutOfBounds { desired: u32, min: u32, max: u32 },

    #[error("CPU utilization target must be between 1 and 100 percent (got {0})")]
    InvalidCpuTarget(u8),

    #[error("Cooldown must be at least one second")]
    ZeroCooldown,

    #[error("Invalid instance type '{0}': expected <class>.<size>, e.g. t3.micro")]
    InvalidInstanceType(String),

    #[error("Port must be non-zero")]
    ZeroPort,

    #[error("Invalid {kind} name '{name}': 1-32 characters of [A-Za-z0-9-], not starting or ending with '-'")]
    InvalidResourceName { kind: &'static str, name: String },

    #[error("Alarm evaluation needs 1 <= datapoints ({datapoints}) <= periods ({periods})")]
    InvalidAlarmWindow { datapoints: u32, periods: u32 },
}

// ── Data tier errors ──────────────────────────────────────────────────────────

/// Errors in a data cluster declaration.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Invalid secret reference '{0}': expected an ARN containing ':secret:'")]
    InvalidSecretReference(String),

    #[error("Data clusters must be placed in isolated subnets, but the network has none")]
    NoIsolatedSubnets,

    #[error("A cluster needs between 1 and 16 instances (got {0})")]
    InvalidInstanceCount(u8),

    #[error("Invalid parameter name '{0}'")]
    InvalidParameterName(String),

    #[error("Unknown database engine '{0}'")]
    UnknownEngine(String),
}

// ── Storage / event pipeline errors ───────────────────────────────────────────

/// Errors in bucket, queue or function declarations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid bucket name '{name}': {reason}")]
    InvalidBucketName { name: String, reason: &'static str },

    #[error("Invalid queue name '{0}': 1-80 characters of [A-Za-z0-9_-]")]
    InvalidQueueName(String),

    #[error("Function handler must not be empty")]
    EmptyHandler,

    #[error("Function memory must be between 128 and 10240 MB (got {0})")]
    InvalidMemorySize(u32),

    #[error("Function timeout must be between 1 and 900 seconds (got {0})")]
    InvalidTimeout(u64),

    #[error("Unknown function runtime '{0}'")]
    UnknownRuntime(String),
}

// ── Edge policy errors ────────────────────────────────────────────────────────

/// Errors in a web ACL declaration.
#[derive(Debug, Error)]
pub enum EdgeError {
    #[error("Invalid policy or rule name '{0}': 1-128 characters of [A-Za-z0-9_-]")]
    InvalidName(String),

    #[error("Priority {0} is used by more than one rule")]
    DuplicatePriority(u32),

    #[error("Rule name '{0}' is used by more than one rule")]
    DuplicateRuleName(String),

    #[error("Invalid metric name '{0}': 1-128 characters of [A-Za-z0-9_-]")]
    InvalidMetricName(String),

    #[error("Rate limit must be between 100 and 2000000000 (got {0})")]
    InvalidRateLimit(u64),

    #[error("Invalid country code '{0}': expected two uppercase letters")]
    InvalidCountryCode(String),

    #[error("Geo match rules need at least one country code")]
    EmptyCountryList,

    #[error("Rule '{0}': managed rule groups take an override action, other statements take a rule action")]
    ActionMismatch(String),

    #[error("Only regional policies can be associated with an endpoint")]
    AssociationRequiresRegional,

    #[error("Unknown scope '{0}': expected regional or cloudfront")]
    UnknownScope(String),

    #[error("Unknown default action '{0}': expected allow or block")]
    UnknownDefaultAction(String),
}

// ── App errors ────────────────────────────────────────────────────────────────

/// Errors resolving stacks by name.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unknown stack '{name}'\n\nAvailable stacks: {valid}")]
    UnknownStack { name: String, valid: String },

    #[error("Stack '{stack}' needs asset '{path}', which has not been hashed")]
    MissingAsset { stack: String, path: String },
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to configuration key/value validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown setting: {key}\n\nValid settings: {valid}")]
    UnknownKey { key: String, valid: String },

    #[error("Invalid value for {key}: {value}\n\nValid values: {valid}")]
    InvalidValue {
        key: String,
        value: String,
        valid: String,
    },
}
