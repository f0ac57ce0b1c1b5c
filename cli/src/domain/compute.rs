//! Compute tier: an autoscaled instance pool, the load balancer in front of
//! it, and the optional bastion host.
//!
//! The tier only supplies bounds and a scaling signal. Launching and
//! terminating instances is decided by the provider.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use regex::Regex;
use serde::Serialize;
use strata_common::{Expr, Parameter};

use crate::domain::error::{ComputeError, NetworkError, SecurityError};
use crate::domain::iam::{self, RoleProps};
use crate::domain::network::{Network, SubnetType, Tag};
use crate::domain::security::{BoundarySet, Peer, Port, SecurityBoundary};
use crate::domain::stack::{ResourceHandle, ResourceProps, Stack};

static INSTANCE_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Safety: this is a compile-time constant pattern — cannot fail.
    #[allow(clippy::expect_used)]
    Regex::new(r"^([a-z][a-z0-9-]*)\.([a-z0-9]+)$").expect("valid regex")
});

static ELB_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Safety: this is a compile-time constant pattern — cannot fail.
    #[allow(clippy::expect_used)]
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,30}[A-Za-z0-9])?$").expect("valid regex")
});

/// Template parameter backing `MachineImage::LatestAmazonLinux`.
pub const LATEST_AMAZON_LINUX_PARAMETER: &str = "LatestAmazonLinuxImageId";

const LATEST_AMAZON_LINUX_PATH: &str = "/aws/service/ami-amazon-linux-latest/amzn-ami-hvm-x86_64-gp2";

// ── Instance type ────────────────────────────────────────────────────────────

/// Instance type such as `t2.micro`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceType {
    class: String,
    size: String,
}

impl InstanceType {
    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
    }

    #[must_use]
    pub fn size(&self) -> &str {
        &self.size
    }

    /// Same type with the `db.` prefix used by managed databases.
    #[must_use]
    pub fn for_database(&self) -> String {
        format!("db.{self}")
    }
}

impl FromStr for InstanceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let caps = INSTANCE_TYPE_RE
            .captures(s)
            .ok_or_else(|| ComputeError::InvalidInstanceType(s.to_string()))?;
        Ok(Self {
            class: caps[1].to_string(),
            size: caps[2].to_string(),
        })
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class, self.size)
    }
}

// ── Machine image ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineImage {
    /// Resolved at deploy time from the public SSM parameter.
    LatestAmazonLinux,
    Ami(String),
}

impl MachineImage {
    /// Image id expression, declaring the backing parameter on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameter id is taken by a resource.
    pub fn image_id(&self, stack: &mut Stack) -> Result<Expr> {
        match self {
            Self::Ami(id) => Ok(Expr::str(id)),
            Self::LatestAmazonLinux if stack.has_parameter(LATEST_AMAZON_LINUX_PARAMETER) => {
                Ok(Expr::reference(LATEST_AMAZON_LINUX_PARAMETER))
            }
            Self::LatestAmazonLinux => stack.add_parameter(
                LATEST_AMAZON_LINUX_PARAMETER,
                Parameter {
                    parameter_type: "AWS::SSM::Parameter::Value<AWS::EC2::Image::Id>".to_string(),
                    default: Some(LATEST_AMAZON_LINUX_PATH.to_string()),
                    description: Some("Latest Amazon Linux image".to_string()),
                },
            ),
        }
    }
}

// ── User data ────────────────────────────────────────────────────────────────

/// Ordered shell commands run once at instance boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserData {
    shebang: String,
    commands: Vec<String>,
}

impl UserData {
    #[must_use]
    pub fn for_linux() -> Self {
        Self {
            shebang: "#!/bin/bash".to_string(),
            commands: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_shebang(mut self, shebang: &str) -> Self {
        self.shebang = shebang.to_string();
        self
    }

    pub fn add_commands<I, S>(&mut self, commands: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands.extend(commands.into_iter().map(Into::into));
    }

    #[must_use]
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    #[must_use]
    pub fn render(&self) -> String {
        let mut script = self.shebang.clone();
        for command in &self.commands {
            script.push('\n');
            script.push_str(command);
        }
        script
    }

    #[must_use]
    pub fn to_expr(&self) -> Expr {
        Expr::base64(Expr::str(self.render()))
    }
}

impl Default for UserData {
    fn default() -> Self {
        Self::for_linux()
    }
}

// ── Compute tier ─────────────────────────────────────────────────────────────

/// Target-tracking scaling on average CPU utilization of the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingSignal {
    pub target_cpu_percent: u8,
}

#[derive(Debug, Clone)]
pub struct ComputeTierProps {
    pub group_name: Option<String>,
    pub instance_type: InstanceType,
    pub machine_image: MachineImage,
    pub min_capacity: u32,
    pub max_capacity: u32,
    pub desired_capacity: Option<u32>,
    pub cooldown: Duration,
    pub user_data: UserData,
    pub scaling: Option<ScalingSignal>,
    pub group_metrics: bool,
    pub role: RoleProps,
    pub subnet_type: SubnetType,
}

impl ComputeTierProps {
    /// # Errors
    ///
    /// Returns an error if the capacity bounds, cooldown or CPU target are
    /// out of range.
    pub fn validate(&self) -> Result<()> {
        validate_capacity(self.min_capacity, self.max_capacity, self.desired_capacity)?;
        if self.cooldown.as_secs() == 0 {
            return Err(ComputeError::ZeroCooldown.into());
        }
        if let Some(signal) = self.scaling
            && !(1..=100).contains(&signal.target_cpu_percent)
        {
            return Err(ComputeError::InvalidCpuTarget(signal.target_cpu_percent).into());
        }
        Ok(())
    }
}

/// Check `1 <= min <= max` and, when given, `min <= desired <= max`.
///
/// # Errors
///
/// Returns the first violated bound.
pub fn validate_capacity(min: u32, max: u32, desired: Option<u32>) -> Result<()> {
    if min == 0 {
        return Err(ComputeError::ZeroMinCapacity.into());
    }
    if min > max {
        return Err(ComputeError::CapacityBounds { min, max }.into());
    }
    if let Some(desired) = desired
        && !(min..=max).contains(&desired)
    {
        return Err(ComputeError::DesiredOutOfBounds { desired, min, max }.into());
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct LaunchConfigurationResource {
    image_id: Expr,
    instance_type: String,
    iam_instance_profile: Expr,
    security_groups: Vec<Expr>,
    user_data: Expr,
}

impl ResourceProps for LaunchConfigurationResource {
    const TYPE: &'static str = "AWS::AutoScaling::LaunchConfiguration";
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct MetricsCollection {
    granularity: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AutoScalingGroupResource {
    #[serde(skip_serializing_if = "Option::is_none")]
    auto_scaling_group_name: Option<String>,
    min_size: String,
    max_size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    desired_capacity: Option<String>,
    cooldown: String,
    launch_configuration_name: Expr,
    #[serde(rename = "VPCZoneIdentifier")]
    vpc_zone_identifier: Vec<Expr>,
    #[serde(rename = "TargetGroupARNs", skip_serializing_if = "Vec::is_empty")]
    target_group_arns: Vec<Expr>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    metrics_collection: Vec<MetricsCollection>,
}

impl ResourceProps for AutoScalingGroupResource {
    const TYPE: &'static str = "AWS::AutoScaling::AutoScalingGroup";
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PredefinedMetric {
    predefined_metric_type: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct TargetTracking {
    predefined_metric_specification: PredefinedMetric,
    target_value: u8,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ScalingPolicyResource {
    auto_scaling_group_name: Expr,
    policy_type: &'static str,
    target_tracking_configuration: TargetTracking,
}

impl ResourceProps for ScalingPolicyResource {
    const TYPE: &'static str = "AWS::AutoScaling::ScalingPolicy";
}

/// Handles to a declared compute tier.
#[derive(Debug, Clone)]
pub struct ComputeTier {
    pub role: ResourceHandle,
    pub instance_profile: ResourceHandle,
    pub launch_configuration: ResourceHandle,
    pub group: ResourceHandle,
    pub scaling_policy: Option<ResourceHandle>,
}

impl ComputeTier {
    /// Declare the tier under construct id `id`, attached to `security_group`
    /// and registered with `target_groups`.
    ///
    /// # Errors
    ///
    /// Returns an error if the props are invalid, the network lacks the
    /// requested tier, or a logical id collides.
    pub fn build(
        stack: &mut Stack,
        id: &str,
        props: &ComputeTierProps,
        network: &Network,
        security_group: &ResourceHandle,
        target_groups: &[ResourceHandle],
    ) -> Result<Self> {
        props.validate()?;
        let subnets = network.subnet_ids(props.subnet_type)?;

        let role = iam::build_role(stack, &[id, "InstanceRole"], &props.role)?;
        let instance_profile = iam::build_instance_profile(stack, &[id, "InstanceProfile"], &role)?;
        let image_id = props.machine_image.image_id(stack)?;

        let launch_configuration = stack.add(
            &[id, "LaunchConfig"],
            &LaunchConfigurationResource {
                image_id,
                instance_type: props.instance_type.to_string(),
                iam_instance_profile: instance_profile.reference(),
                security_groups: vec![security_group.attr("GroupId")],
                user_data: props.user_data.to_expr(),
            },
        )?;
        stack.add_dependency(&launch_configuration, &role)?;

        let group = stack.add(
            &[id, "ASG"],
            &AutoScalingGroupResource {
                auto_scaling_group_name: props.group_name.clone(),
                min_size: props.min_capacity.to_string(),
                max_size: props.max_capacity.to_string(),
                desired_capacity: props.desired_capacity.map(|d| d.to_string()),
                cooldown: props.cooldown.as_secs().to_string(),
                launch_configuration_name: launch_configuration.reference(),
                vpc_zone_identifier: subnets,
                target_group_arns: target_groups.iter().map(ResourceHandle::reference).collect(),
                metrics_collection: if props.group_metrics {
                    vec![MetricsCollection {
                        granularity: "1Minute",
                    }]
                } else {
                    Vec::new()
                },
            },
        )?;

        let scaling_policy = props
            .scaling
            .map(|signal| {
                stack.add(
                    &[id, "ScalingPolicy", "CpuUtilization"],
                    &ScalingPolicyResource {
                        auto_scaling_group_name: group.reference(),
                        policy_type: "TargetTrackingScaling",
                        target_tracking_configuration: TargetTracking {
                            predefined_metric_specification: PredefinedMetric {
                                predefined_metric_type: "ASGAverageCPUUtilization",
                            },
                            target_value: signal.target_cpu_percent,
                        },
                    },
                )
            })
            .transpose()?;

        Ok(Self {
            role,
            instance_profile,
            launch_configuration,
            group,
            scaling_policy,
        })
    }
}

// ── Load balancer ────────────────────────────────────────────────────────────

/// Alarm raised when fewer than `threshold` targets are healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthAlarm {
    pub threshold: u32,
    pub period: Duration,
    pub evaluation_periods: u32,
    pub datapoints_to_alarm: u32,
}

impl Default for HealthAlarm {
    fn default() -> Self {
        Self {
            threshold: 1,
            period: Duration::from_secs(60),
            evaluation_periods: 60,
            datapoints_to_alarm: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadBalancerProps {
    pub name: Option<String>,
    pub internet_facing: bool,
    pub listener_port: u16,
    pub target_port: u16,
    pub stickiness: Option<Duration>,
    pub target_group_name: Option<String>,
    pub health_alarm: Option<HealthAlarm>,
    /// Name of the security boundary fronting the load balancer.
    pub boundary: String,
}

impl LoadBalancerProps {
    /// # Errors
    ///
    /// Returns an error on zero ports, names the provider would reject, or an
    /// alarm window that can never fire.
    pub fn validate(&self) -> Result<()> {
        if self.listener_port == 0 || self.target_port == 0 {
            return Err(ComputeError::ZeroPort.into());
        }
        for (kind, name) in [
            ("load balancer", &self.name),
            ("target group", &self.target_group_name),
        ] {
            if let Some(name) = name
                && !ELB_NAME_RE.is_match(name)
            {
                return Err(ComputeError::InvalidResourceName {
                    kind,
                    name: name.clone(),
                }
                .into());
            }
        }
        if let Some(alarm) = &self.health_alarm
            && (alarm.datapoints_to_alarm == 0
                || alarm.datapoints_to_alarm > alarm.evaluation_periods)
        {
            return Err(ComputeError::InvalidAlarmWindow {
                datapoints: alarm.datapoints_to_alarm,
                periods: alarm.evaluation_periods,
            }
            .into());
        }
        Ok(())
    }

    /// Declare the load balancer boundary and open the target port on the
    /// compute boundary to it. Traffic from anywhere else is not admitted.
    ///
    /// # Errors
    ///
    /// Returns an error if the compute boundary is unknown or the load
    /// balancer boundary already exists.
    pub fn declare_boundaries(&self, boundaries: &mut BoundarySet, compute: &str) -> Result<()> {
        let mut boundary = SecurityBoundary::new(&self.boundary, "Load balancer ingress")?;
        boundary.add_ingress_rule(
            Peer::any_ipv4(),
            Port::tcp(self.listener_port),
            &format!("Allow from anyone on port {}", self.listener_port),
        );
        boundaries.insert(boundary)?;

        let target = boundaries.get_mut(compute).ok_or_else(|| {
            SecurityError::UnknownPeer {
                boundary: self.boundary.clone(),
                peer: compute.to_string(),
            }
        })?;
        target.add_ingress_rule(
            Peer::boundary(&self.boundary),
            Port::tcp(self.target_port),
            "Load balancer to target",
        );
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Attribute {
    key: &'static str,
    value: String,
}

impl Attribute {
    fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct LoadBalancerResource {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    scheme: &'static str,
    #[serde(rename = "Type")]
    lb_type: &'static str,
    subnets: Vec<Expr>,
    security_groups: Vec<Expr>,
    load_balancer_attributes: Vec<Attribute>,
}

impl ResourceProps for LoadBalancerResource {
    const TYPE: &'static str = "AWS::ElasticLoadBalancingV2::LoadBalancer";
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct TargetGroupResource {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    port: u16,
    protocol: &'static str,
    target_type: &'static str,
    vpc_id: Expr,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    target_group_attributes: Vec<Attribute>,
}

impl ResourceProps for TargetGroupResource {
    const TYPE: &'static str = "AWS::ElasticLoadBalancingV2::TargetGroup";
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ListenerAction {
    #[serde(rename = "Type")]
    action_type: &'static str,
    target_group_arn: Expr,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ListenerResource {
    load_balancer_arn: Expr,
    port: u16,
    protocol: &'static str,
    default_actions: Vec<ListenerAction>,
}

impl ResourceProps for ListenerResource {
    const TYPE: &'static str = "AWS::ElasticLoadBalancingV2::Listener";
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Dimension {
    name: &'static str,
    value: Expr,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AlarmResource {
    alarm_description: String,
    namespace: &'static str,
    metric_name: &'static str,
    dimensions: Vec<Dimension>,
    statistic: &'static str,
    period: u64,
    evaluation_periods: u32,
    datapoints_to_alarm: u32,
    threshold: u32,
    comparison_operator: &'static str,
}

impl ResourceProps for AlarmResource {
    const TYPE: &'static str = "AWS::CloudWatch::Alarm";
}

#[derive(Debug, Clone)]
pub struct LoadBalancer {
    pub load_balancer: ResourceHandle,
    pub target_group: ResourceHandle,
    pub listener: ResourceHandle,
    pub alarm: Option<ResourceHandle>,
}

impl LoadBalancer {
    /// Declare the load balancer, its target group and listener, and the
    /// optional health alarm.
    ///
    /// # Errors
    ///
    /// Returns an error if the props are invalid, the network has no public
    /// subnets for an internet-facing balancer, or a logical id collides.
    pub fn build(
        stack: &mut Stack,
        id: &str,
        props: &LoadBalancerProps,
        network: &Network,
        security_group: &ResourceHandle,
    ) -> Result<Self> {
        props.validate()?;
        let (scheme, tier) = if props.internet_facing {
            ("internet-facing", SubnetType::Public)
        } else {
            ("internal", SubnetType::PrivateWithEgress)
        };

        let load_balancer = stack.add(
            &[id],
            &LoadBalancerResource {
                name: props.name.clone(),
                scheme,
                lb_type: "application",
                subnets: network.subnet_ids(tier)?,
                security_groups: vec![security_group.attr("GroupId")],
                load_balancer_attributes: vec![Attribute::new(
                    "deletion_protection.enabled",
                    "false",
                )],
            },
        )?;
        // Internet-facing balancers fail to provision before public routes exist.
        if props.internet_facing {
            let routes: Vec<ResourceHandle> = network
                .subnets(SubnetType::Public)
                .filter_map(|s| s.default_route.clone())
                .collect();
            for route in &routes {
                stack.add_dependency(&load_balancer, route)?;
            }
        }

        let mut attributes = Vec::new();
        if let Some(duration) = props.stickiness {
            attributes.push(Attribute::new("stickiness.enabled", "true"));
            attributes.push(Attribute::new("stickiness.type", "lb_cookie"));
            attributes.push(Attribute::new(
                "stickiness.lb_cookie.duration_seconds",
                duration.as_secs().to_string(),
            ));
        }
        let target_group = stack.add(
            &[id, "TargetGroup"],
            &TargetGroupResource {
                name: props.target_group_name.clone(),
                port: props.target_port,
                protocol: "HTTP",
                target_type: "instance",
                vpc_id: network.vpc_id(),
                target_group_attributes: attributes,
            },
        )?;

        let listener = stack.add(
            &[id, "Listener"],
            &ListenerResource {
                load_balancer_arn: load_balancer.reference(),
                port: props.listener_port,
                protocol: "HTTP",
                default_actions: vec![ListenerAction {
                    action_type: "forward",
                    target_group_arn: target_group.reference(),
                }],
            },
        )?;

        let alarm = props
            .health_alarm
            .map(|alarm| {
                stack.add(
                    &[id, "UnhealthyTargetAlarm"],
                    &AlarmResource {
                        alarm_description: format!(
                            "Fewer than {} healthy targets behind {id}",
                            alarm.threshold
                        ),
                        namespace: "AWS/ApplicationELB",
                        metric_name: "HealthyHostCount",
                        dimensions: vec![
                            Dimension {
                                name: "LoadBalancer",
                                value: load_balancer.attr("LoadBalancerFullName"),
                            },
                            Dimension {
                                name: "TargetGroup",
                                value: target_group.attr("TargetGroupFullName"),
                            },
                        ],
                        statistic: "Average",
                        period: alarm.period.as_secs(),
                        evaluation_periods: alarm.evaluation_periods,
                        datapoints_to_alarm: alarm.datapoints_to_alarm,
                        threshold: alarm.threshold,
                        comparison_operator: "LessThanThreshold",
                    },
                )
            })
            .transpose()?;

        Ok(Self {
            load_balancer,
            target_group,
            listener,
            alarm,
        })
    }
}

// ── Bastion ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceResource {
    availability_zone: Expr,
    iam_instance_profile: Expr,
    image_id: Expr,
    instance_type: String,
    security_group_ids: Vec<Expr>,
    subnet_id: Expr,
    tags: Vec<Tag>,
    user_data: Expr,
}

impl ResourceProps for InstanceResource {
    const TYPE: &'static str = "AWS::EC2::Instance";
}

/// A single instance in the first public subnet, reachable only through the
/// session manager; its boundary carries no ingress rules.
///
/// # Errors
///
/// Returns an error if the network has no public subnets or a logical id
/// collides.
pub fn build_bastion(
    stack: &mut Stack,
    id: &str,
    network: &Network,
    security_group: &ResourceHandle,
    instance_type: &InstanceType,
) -> Result<ResourceHandle> {
    let subnet = network
        .subnets(SubnetType::Public)
        .next()
        .ok_or_else(|| NetworkError::NoSubnetsOfType(SubnetType::Public.to_string()))?
        .clone();

    let role = iam::build_role(
        stack,
        &[id, "Role"],
        &RoleProps::new(iam::ServicePrincipal::Ec2).with_managed_policy("AmazonSSMManagedInstanceCore"),
    )?;
    let profile = iam::build_instance_profile(stack, &[id, "InstanceProfile"], &role)?;
    let image_id = MachineImage::LatestAmazonLinux.image_id(stack)?;

    let instance = stack.add(
        &[id],
        &InstanceResource {
            availability_zone: Expr::availability_zone(subnet.allocation.az_index),
            iam_instance_profile: profile.reference(),
            image_id,
            instance_type: instance_type.to_string(),
            security_group_ids: vec![security_group.attr("GroupId")],
            subnet_id: subnet.subnet.reference(),
            tags: vec![Tag::new("Name", "Bastion Host")],
            user_data: UserData::for_linux().to_expr(),
        },
    )?;
    stack.add_dependency(&instance, &role)?;
    Ok(instance)
}
