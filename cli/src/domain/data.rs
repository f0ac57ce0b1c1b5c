//! Managed relational cluster placed in the isolated tier.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use serde::Serialize;
use strata_common::{DeletionPolicy, Expr};

use crate::domain::compute::InstanceType;
use crate::domain::error::{DataError, SecurityError};
use crate::domain::network::{Network, SubnetType};
use crate::domain::security::{BoundarySet, Peer, Port};
use crate::domain::stack::{ResourceHandle, ResourceProps, Stack};

static PARAMETER_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Safety: this is a compile-time constant pattern — cannot fail.
    #[allow(clippy::expect_used)]
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_.-]{0,254}$").expect("valid regex")
});

pub const MAX_INSTANCES: u8 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseEngine {
    AuroraMysql,
    AuroraPostgresql,
}

impl DatabaseEngine {
    #[must_use]
    pub fn engine_name(self) -> &'static str {
        match self {
            Self::AuroraMysql => "aurora-mysql",
            Self::AuroraPostgresql => "aurora-postgresql",
        }
    }

    #[must_use]
    pub fn default_port(self) -> u16 {
        match self {
            Self::AuroraMysql => 3306,
            Self::AuroraPostgresql => 5432,
        }
    }

    /// Parameter group family matching the cluster engine.
    #[must_use]
    pub fn parameter_group_family(self) -> &'static str {
        match self {
            Self::AuroraMysql => "aurora-mysql5.7",
            Self::AuroraPostgresql => "aurora-postgresql11",
        }
    }
}

impl FromStr for DatabaseEngine {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "aurora-mysql" => Ok(Self::AuroraMysql),
            "aurora-postgresql" => Ok(Self::AuroraPostgresql),
            _ => Err(DataError::UnknownEngine(s.to_string()).into()),
        }
    }
}

impl fmt::Display for DatabaseEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.engine_name())
    }
}

/// Reference to credentials held by the secret store. The secret itself is
/// never read here; the provider resolves it at deploy time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretReference(String);

impl SecretReference {
    /// # Errors
    ///
    /// Returns an error unless `arn` is an ARN naming a secret.
    pub fn parse(arn: &str) -> Result<Self> {
        let arn = arn.trim();
        if !arn.starts_with("arn:") || !arn.contains(":secret:") || arn.ends_with(":secret:") {
            return Err(DataError::InvalidSecretReference(arn.to_string()).into());
        }
        Ok(Self(arn.to_string()))
    }

    #[must_use]
    pub fn arn(&self) -> &str {
        &self.0
    }

    /// Dynamic reference to one JSON key of the secret string.
    #[must_use]
    pub fn resolve(&self, key: &str) -> String {
        format!("{{{{resolve:secretsmanager:{}:SecretString:{key}::}}}}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct DataClusterProps {
    pub engine: DatabaseEngine,
    pub engine_version: Option<String>,
    pub instance_type: InstanceType,
    /// Writer plus replicas.
    pub instances: u8,
    pub credentials: SecretReference,
    pub parameters: BTreeMap<String, String>,
    pub port: Option<u16>,
}

impl DataClusterProps {
    #[must_use]
    pub fn new(engine: DatabaseEngine, instance_type: InstanceType, credentials: SecretReference) -> Self {
        Self {
            engine,
            engine_version: None,
            instance_type,
            instances: 2,
            credentials,
            parameters: BTreeMap::new(),
            port: None,
        }
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.engine.default_port())
    }

    /// # Errors
    ///
    /// Returns an error on an instance count outside 1..=16 or a malformed
    /// parameter name.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_INSTANCES).contains(&self.instances) {
            return Err(DataError::InvalidInstanceCount(self.instances).into());
        }
        if let Some(name) = self.parameters.keys().find(|k| !PARAMETER_NAME_RE.is_match(k)) {
            return Err(DataError::InvalidParameterName(name.clone()).into());
        }
        Ok(())
    }

    /// Admit `from` to the engine port on the `data` boundary. This is the
    /// only inbound flow a data boundary should carry.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is not in the set.
    pub fn grant_access(&self, boundaries: &mut BoundarySet, data: &str, from: &str) -> Result<()> {
        let boundary = boundaries
            .get_mut(data)
            .ok_or_else(|| SecurityError::UnknownPeer {
                boundary: from.to_string(),
                peer: data.to_string(),
            })?;
        boundary.add_ingress_rule(
            Peer::boundary(from),
            Port::tcp(self.port()),
            "Database connection allow",
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct SubnetGroupResource {
    #[serde(rename = "DBSubnetGroupDescription")]
    description: String,
    #[serde(rename = "SubnetIds")]
    subnet_ids: Vec<Expr>,
}

impl ResourceProps for SubnetGroupResource {
    const TYPE: &'static str = "AWS::RDS::DBSubnetGroup";
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ClusterParameterGroupResource {
    description: String,
    family: &'static str,
    parameters: BTreeMap<String, String>,
}

impl ResourceProps for ClusterParameterGroupResource {
    const TYPE: &'static str = "AWS::RDS::DBClusterParameterGroup";
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ClusterResource {
    engine: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    engine_version: Option<String>,
    #[serde(rename = "DBClusterParameterGroupName")]
    parameter_group_name: Expr,
    #[serde(rename = "DBSubnetGroupName")]
    subnet_group_name: Expr,
    master_username: String,
    master_user_password: String,
    port: u16,
    vpc_security_group_ids: Vec<Expr>,
}

impl ResourceProps for ClusterResource {
    const TYPE: &'static str = "AWS::RDS::DBCluster";
}

#[derive(Serialize)]
struct InstanceResource {
    #[serde(rename = "DBClusterIdentifier")]
    cluster: Expr,
    #[serde(rename = "DBInstanceClass")]
    instance_class: String,
    #[serde(rename = "DBSubnetGroupName")]
    subnet_group_name: Expr,
    #[serde(rename = "Engine")]
    engine: &'static str,
    #[serde(rename = "PubliclyAccessible")]
    publicly_accessible: bool,
}

impl ResourceProps for InstanceResource {
    const TYPE: &'static str = "AWS::RDS::DBInstance";
}

#[derive(Debug, Clone)]
pub struct DataCluster {
    pub subnet_group: ResourceHandle,
    pub parameter_group: ResourceHandle,
    pub cluster: ResourceHandle,
    pub instances: Vec<ResourceHandle>,
}

impl DataCluster {
    /// Declare the cluster under construct id `id` in the network's isolated
    /// subnets, attached to `security_group`.
    ///
    /// # Errors
    ///
    /// Returns an error if the props are invalid, the network has no isolated
    /// subnets, or a logical id collides.
    pub fn build(
        stack: &mut Stack,
        id: &str,
        props: &DataClusterProps,
        network: &Network,
        security_group: &ResourceHandle,
    ) -> Result<Self> {
        props.validate()?;
        if !network.has_tier(SubnetType::Isolated) {
            return Err(DataError::NoIsolatedSubnets.into());
        }

        let subnet_group = stack.add(
            &[id, "Subnets"],
            &SubnetGroupResource {
                description: format!("Subnets for {id} database"),
                subnet_ids: network.subnet_ids(SubnetType::Isolated)?,
            },
        )?;
        let parameter_group = stack.add(
            &[id, "Parameters"],
            &ClusterParameterGroupResource {
                description: format!("Cluster parameter group for {}", props.engine),
                family: props.engine.parameter_group_family(),
                parameters: props.parameters.clone(),
            },
        )?;
        let cluster = stack.add(
            &[id],
            &ClusterResource {
                engine: props.engine.engine_name(),
                engine_version: props.engine_version.clone(),
                parameter_group_name: parameter_group.reference(),
                subnet_group_name: subnet_group.reference(),
                master_username: props.credentials.resolve("username"),
                master_user_password: props.credentials.resolve("password"),
                port: props.port(),
                vpc_security_group_ids: vec![security_group.attr("GroupId")],
            },
        )?;
        stack.set_removal_policy(&cluster, DeletionPolicy::Snapshot)?;

        let mut instances = Vec::with_capacity(usize::from(props.instances));
        for n in 1..=props.instances {
            let instance = stack.add(
                &[id, &format!("Instance{n}")],
                &InstanceResource {
                    cluster: cluster.reference(),
                    instance_class: props.instance_type.for_database(),
                    subnet_group_name: subnet_group.reference(),
                    engine: props.engine.engine_name(),
                    publicly_accessible: false,
                },
            )?;
            // Isolated subnets must be routable inside the network before instances launch.
            for subnet in network.subnets(SubnetType::Isolated) {
                stack.add_dependency(&instance, &subnet.route_table)?;
            }
            instances.push(instance);
        }

        Ok(Self {
            subnet_group,
            parameter_group,
            cluster,
            instances,
        })
    }

    #[must_use]
    pub fn endpoint_address(&self) -> Expr {
        self.cluster.attr("Endpoint.Address")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::network::NetworkProps;
    use crate::domain::security::SecurityBoundary;
    use serde_json::json;

    const SECRET: &str = "arn:aws:secretsmanager:ap-northeast-1:123456:secret:sample";

    fn props() -> DataClusterProps {
        let mut props = DataClusterProps::new(
            "AURORA_MYSQL".parse().unwrap(),
            "t3.small".parse().unwrap(),
            SecretReference::parse(SECRET).unwrap(),
        );
        props
            .parameters
            .insert("character_set_client".to_string(), "utf8mb4".to_string());
        props
    }

    fn setup(network: &NetworkProps) -> (Stack, Network, BTreeMap<String, ResourceHandle>) {
        let mut stack = Stack::new("S", None).unwrap();
        let network = Network::build(&mut stack, "Vpc", network).unwrap();
        let mut boundaries = BoundarySet::new();
        boundaries
            .insert(SecurityBoundary::new("App", "app").unwrap())
            .unwrap();
        boundaries
            .insert(SecurityBoundary::new("Db", "db").unwrap())
            .unwrap();
        props().grant_access(&mut boundaries, "Db", "App").unwrap();
        let groups = boundaries.build(&mut stack, &network).unwrap();
        (stack, network, groups)
    }

    #[test]
    fn test_engine_parse_and_defaults() {
        let engine: DatabaseEngine = "aurora-postgresql".parse().unwrap();
        assert_eq!(engine, DatabaseEngine::AuroraPostgresql);
        assert_eq!(engine.default_port(), 5432);
        assert_eq!(DatabaseEngine::AuroraMysql.parameter_group_family(), "aurora-mysql5.7");
        assert!("oracle".parse::<DatabaseEngine>().is_err());
    }

    #[test]
    fn test_secret_reference_rules() {
        assert!(SecretReference::parse("arn:aws:secretsmanager:us-east-1:1:secret:db").is_ok());
        assert!(SecretReference::parse("db-credentials").is_err());
        assert!(SecretReference::parse("arn:aws:s3:::bucket").is_err());
        assert!(SecretReference::parse("arn:aws:secretsmanager:us-east-1:1:secret:").is_err());
    }

    #[test]
    fn test_cluster_scenario() {
        let (mut stack, network, groups) =
            setup(&NetworkProps::three_tier("10.0.0.0/16".parse().unwrap(), 2));
        let cluster = DataCluster::build(&mut stack, "Db", &props(), &network, &groups["Db"]).unwrap();
        let template = stack.synth().unwrap();

        let params = &template.resources[cluster.parameter_group.logical_id()].properties;
        assert_eq!(params["Parameters"], json!({"character_set_client": "utf8mb4"}));
        assert_eq!(params["Family"], "aurora-mysql5.7");

        let resource = &template.resources[cluster.cluster.logical_id()];
        assert_eq!(resource.deletion_policy, Some(DeletionPolicy::Snapshot));
        assert_eq!(resource.update_replace_policy, Some(DeletionPolicy::Snapshot));
        assert_eq!(
            resource.properties["MasterUsername"],
            format!("{{{{resolve:secretsmanager:{SECRET}:SecretString:username::}}}}")
        );
        assert!(
            resource.properties["MasterUserPassword"]
                .as_str()
                .unwrap()
                .contains(SECRET)
        );
        assert_eq!(resource.properties["Port"], 3306);
        assert_eq!(cluster.instances.len(), 2);
        assert_eq!(template.count_of_type("AWS::RDS::DBInstance"), 2);
    }

    #[test]
    fn test_cluster_uses_isolated_subnets_only() {
        let (mut stack, network, groups) =
            setup(&NetworkProps::three_tier("10.0.0.0/16".parse().unwrap(), 2));
        let cluster = DataCluster::build(&mut stack, "Db", &props(), &network, &groups["Db"]).unwrap();
        let template = stack.synth().unwrap();
        let isolated: Vec<_> = network
            .subnets(SubnetType::Isolated)
            .map(|s| json!({"Ref": s.subnet.logical_id()}))
            .collect();
        assert_eq!(
            template.resources[cluster.subnet_group.logical_id()].properties["SubnetIds"],
            json!(isolated)
        );
    }

    #[test]
    fn test_network_without_isolated_tier_rejected() {
        let mut net = NetworkProps::three_tier("10.0.0.0/16".parse().unwrap(), 2);
        net.subnets.retain(|s| s.subnet_type != SubnetType::Isolated);
        let (mut stack, network, groups) = setup(&net);
        let err = DataCluster::build(&mut stack, "Db", &props(), &network, &groups["Db"]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DataError>(),
            Some(DataError::NoIsolatedSubnets)
        ));
    }

    #[test]
    fn test_validate_instances_and_parameter_names() {
        let mut p = props();
        p.instances = 0;
        assert!(p.validate().is_err());
        let mut p = props();
        p.parameters.insert("bad name".to_string(), "x".to_string());
        assert!(p.validate().is_err());
    }
}
