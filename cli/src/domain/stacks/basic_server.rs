//! Three-tier web server: load-balanced autoscaling group in the private
//! tier, Aurora cluster in the isolated tier, file bucket reached through a
//! gateway endpoint, optional bastion.

use std::time::Duration;

use anyhow::Result;
use ipnetwork::Ipv4Network;

use crate::domain::compute::{
    ComputeTier, ComputeTierProps, HealthAlarm, InstanceType, LoadBalancer, LoadBalancerProps,
    MachineImage, ScalingSignal, UserData, build_bastion,
};
use crate::domain::config::{BasicServerConfig, MAX_COOLDOWN_MINUTES};
use crate::domain::data::{DataCluster, DataClusterProps, DatabaseEngine, SecretReference};
use crate::domain::error::{ConfigError, NetworkError};
use crate::domain::iam::{PolicyDocument, PolicyStatement, RoleProps, ServicePrincipal};
use crate::domain::network::{Network, NetworkProps, SubnetType};
use crate::domain::security::{BoundarySet, SecurityBoundary};
use crate::domain::stack::Stack;
use crate::domain::storage::{BucketProps, bucket_arns, build_bucket};

pub const NAME: &str = "BasicServerStack";
pub const DESCRIPTION: &str = "Load-balanced autoscaling web tier with an Aurora cluster and a file bucket";

pub const ALB_BOUNDARY: &str = "Alb";
pub const APP_BOUNDARY: &str = "App";
pub const DB_BOUNDARY: &str = "Db";
pub const BASTION_BOUNDARY: &str = "Bastion";

const STICKINESS: Duration = Duration::from_secs(5 * 60);

/// Security boundaries of the stack with every inter-tier flow declared:
/// anyone → load balancer, load balancer → app, app → database.
///
/// # Errors
///
/// Returns an error if a boundary is declared twice.
pub fn boundaries(
    config: &BasicServerConfig,
    load_balancer: &LoadBalancerProps,
    database: &DataClusterProps,
) -> Result<BoundarySet> {
    let mut boundaries = BoundarySet::new();
    boundaries.insert(
        SecurityBoundary::new(APP_BOUNDARY, "Allow serving from instance")?
            .with_group_name("Allow serving"),
    )?;
    boundaries.insert(
        SecurityBoundary::new(DB_BOUNDARY, "Allow database connection")?
            .with_group_name("Allow database connection"),
    )?;
    if config.bastion {
        boundaries.insert(SecurityBoundary::new(
            BASTION_BOUNDARY,
            "Bastion host, session manager access only",
        )?)?;
    }
    load_balancer.declare_boundaries(&mut boundaries, APP_BOUNDARY)?;
    database.grant_access(&mut boundaries, DB_BOUNDARY, APP_BOUNDARY)?;
    Ok(boundaries)
}

fn load_balancer_props() -> LoadBalancerProps {
    LoadBalancerProps {
        name: Some(format!("{NAME}-AppLB")),
        internet_facing: true,
        listener_port: 80,
        target_port: 80,
        stickiness: Some(STICKINESS),
        target_group_name: Some(format!("{NAME}-Targets")),
        health_alarm: Some(HealthAlarm::default()),
        boundary: ALB_BOUNDARY.to_string(),
    }
}

fn database_props(config: &BasicServerConfig) -> Result<DataClusterProps> {
    let mut props = DataClusterProps::new(
        DatabaseEngine::AuroraMysql,
        config.db_instance_type.parse()?,
        SecretReference::parse(&config.secret_arn)?,
    );
    props.instances = config.db_instances;
    props.parameters.clone_from(&config.db_parameters);
    Ok(props)
}

fn cooldown(minutes: u64) -> Result<Duration> {
    minutes
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or_else(|| {
            ConfigError::InvalidValue {
                key: "basic_server.cooldown_minutes".to_string(),
                value: minutes.to_string(),
                valid: format!("1..={MAX_COOLDOWN_MINUTES}"),
            }
            .into()
        })
}

/// # Errors
///
/// Returns an error if the configuration is invalid or the resulting graph
/// fails a structural check.
pub fn build(config: &BasicServerConfig) -> Result<Stack> {
    let mut stack = Stack::new(NAME, Some(DESCRIPTION))?;

    let cidr: Ipv4Network = config
        .cidr
        .parse()
        .map_err(|_| NetworkError::InvalidCidr(config.cidr.clone()))?;
    let mut network_props = NetworkProps::three_tier(cidr, config.max_azs);
    network_props.nat_gateways = config.nat_gateways;
    let network = Network::build(&mut stack, "Vpc", &network_props)?;

    let lb_props = load_balancer_props();
    let db_props = database_props(config)?;
    let groups = boundaries(config, &lb_props, &db_props)?.build(&mut stack, &network)?;

    let bucket = build_bucket(&mut stack, &["FileBucket"], &BucketProps::default())?;
    network.add_gateway_endpoint(&mut stack, "S3Gateway", "s3", SubnetType::PrivateWithEgress)?;

    let lb = LoadBalancer::build(&mut stack, "AppLoadBalancer", &lb_props, &network, &groups[ALB_BOUNDARY])?;

    let mut user_data = UserData::for_linux();
    user_data.add_commands(config.bootstrap.iter().cloned());
    let role = RoleProps::new(ServicePrincipal::Ec2).with_inline_policy(
        "ec2-s3-access",
        PolicyDocument::new(vec![PolicyStatement::allow(
            "S3AccessStatement",
            &["s3:ListBucket", "s3:GetObject", "s3:PutObject", "s3:DeleteObject"],
            bucket_arns(&bucket).to_vec(),
        )]),
    );
    let compute_props = ComputeTierProps {
        group_name: Some("Auto Scale for Application instances".to_string()),
        instance_type: config.instance_type.parse()?,
        machine_image: MachineImage::LatestAmazonLinux,
        min_capacity: config.min_capacity,
        max_capacity: config.max_capacity,
        desired_capacity: None,
        cooldown: cooldown(config.cooldown_minutes)?,
        user_data,
        scaling: Some(ScalingSignal {
            target_cpu_percent: config.cpu_target_percent,
        }),
        group_metrics: true,
        role,
        subnet_type: SubnetType::PrivateWithEgress,
    };
    ComputeTier::build(
        &mut stack,
        "App",
        &compute_props,
        &network,
        &groups[APP_BOUNDARY],
        std::slice::from_ref(&lb.target_group),
    )?;

    let database = DataCluster::build(&mut stack, "Database", &db_props, &network, &groups[DB_BOUNDARY])?;

    if config.bastion {
        let instance_type: InstanceType = "t3.nano".parse()?;
        build_bastion(&mut stack, "Bastion", &network, &groups[BASTION_BOUNDARY], &instance_type)?;
    }

    stack.add_output(
        "LoadBalancerDns",
        &lb.load_balancer.attr("DNSName"),
        "Public DNS name of the application load balancer",
        false,
    )?;
    stack.add_output(
        "DatabaseEndpoint",
        &database.endpoint_address(),
        "Writer endpoint of the database cluster",
        false,
    )?;
    stack.add_output(
        "FileBucketName",
        &bucket.reference(),
        "Bucket shared by the application instances",
        false,
    )?;
    Ok(stack)
}
