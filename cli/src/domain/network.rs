//! Network topology: address space, tiered subnets and their routing.
//!
//! Pure functions only — no I/O, no async, no filesystem access.

use std::fmt;
use std::net::Ipv4Addr;

use anyhow::Result;
use ipnetwork::Ipv4Network;
use serde::Serialize;
use strata_common::Expr;

use crate::domain::error::NetworkError;
use crate::domain::stack::{ResourceHandle, ResourceProps, Stack};

/// Smallest and largest subnet sizes the provider accepts.
pub const MIN_SUBNET_MASK: u8 = 16;
pub const MAX_SUBNET_MASK: u8 = 28;

/// Upper bound on availability zones a network spans.
pub const MAX_AZS: u8 = 6;

const DEFAULT_ROUTE: &str = "0.0.0.0/0";

/// Reachability class of a subnet tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubnetType {
    /// Ingress tier: routes to and from the internet.
    Public,
    /// Application tier: outbound only, through a managed egress point.
    PrivateWithEgress,
    /// Data tier: no route to any external network.
    Isolated,
}

impl fmt::Display for SubnetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Public => "public",
            Self::PrivateWithEgress => "private",
            Self::Isolated => "isolated",
        })
    }
}

/// One subnet group; it is instantiated once per availability zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetConfiguration {
    pub name: String,
    pub cidr_mask: u8,
    pub subnet_type: SubnetType,
}

impl SubnetConfiguration {
    #[must_use]
    pub fn new(name: &str, cidr_mask: u8, subnet_type: SubnetType) -> Self {
        Self {
            name: name.to_string(),
            cidr_mask,
            subnet_type,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NetworkProps {
    pub cidr: Ipv4Network,
    pub max_azs: u8,
    pub enable_dns_hostnames: bool,
    pub enable_dns_support: bool,
    pub subnets: Vec<SubnetConfiguration>,
    /// Number of egress points; one per AZ when unset.
    pub nat_gateways: Option<u8>,
}

impl NetworkProps {
    /// Ingress, application and data tiers, each a `/24` per AZ.
    #[must_use]
    pub fn three_tier(cidr: Ipv4Network, max_azs: u8) -> Self {
        Self {
            cidr,
            max_azs,
            enable_dns_hostnames: true,
            enable_dns_support: true,
            subnets: vec![
                SubnetConfiguration::new("load balancer", 24, SubnetType::Public),
                SubnetConfiguration::new("application", 24, SubnetType::PrivateWithEgress),
                SubnetConfiguration::new("rds", 24, SubnetType::Isolated),
            ],
            nat_gateways: None,
        }
    }

    fn has_type(&self, subnet_type: SubnetType) -> bool {
        self.subnets.iter().any(|s| s.subnet_type == subnet_type)
    }

    /// Check the declaration before any address is allocated.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first violated rule.
    pub fn validate(&self) -> Result<()> {
        if self.max_azs == 0 || self.max_azs > MAX_AZS {
            return Err(NetworkError::InvalidAzCount(self.max_azs).into());
        }
        if self.subnets.is_empty() {
            return Err(NetworkError::NoSubnets.into());
        }
        let min = MIN_SUBNET_MASK.max(self.cidr.prefix());
        for (i, subnet) in self.subnets.iter().enumerate() {
            if subnet.name.trim().is_empty() {
                return Err(NetworkError::EmptySubnetName.into());
            }
            if self.subnets[..i].iter().any(|s| s.name == subnet.name) {
                return Err(NetworkError::DuplicateSubnetName(subnet.name.clone()).into());
            }
            if subnet.cidr_mask < min || subnet.cidr_mask > MAX_SUBNET_MASK {
                return Err(NetworkError::InvalidCidrMask {
                    name: subnet.name.clone(),
                    mask: subnet.cidr_mask,
                    min,
                    max: MAX_SUBNET_MASK,
                }
                .into());
            }
        }
        let private = self.has_type(SubnetType::PrivateWithEgress);
        if private && !self.has_type(SubnetType::Public) {
            return Err(NetworkError::EgressWithoutPublic.into());
        }
        if let Some(n) = self.nat_gateways {
            if !private {
                return Err(NetworkError::NatWithoutPrivate.into());
            }
            if n == 0 || n > self.max_azs {
                return Err(NetworkError::InvalidNatCount {
                    requested: n,
                    max: self.max_azs,
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Address block assigned to one subnet group in one AZ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetAllocation {
    pub group: String,
    pub subnet_type: SubnetType,
    pub az_index: usize,
    pub cidr: Ipv4Network,
}

/// Carve the network's address block into subnets.
///
/// Groups are allocated in declaration order, AZs in order within a group,
/// each block aligned to its own size. Blocks never overlap and always lie
/// inside the network.
///
/// # Errors
///
/// Returns an error if the declaration is invalid or the address space runs out.
pub fn allocate_subnets(props: &NetworkProps) -> Result<Vec<SubnetAllocation>> {
    props.validate()?;
    let base = u64::from(u32::from(props.cidr.network()));
    let end = base + (1u64 << (32 - u32::from(props.cidr.prefix())));
    let mut cursor = base;
    let mut out = Vec::with_capacity(props.subnets.len() * usize::from(props.max_azs));

    for group in &props.subnets {
        let size = 1u64 << (32 - u32::from(group.cidr_mask));
        for az_index in 0..usize::from(props.max_azs) {
            let start = cursor.div_ceil(size) * size;
            if start + size > end {
                return Err(NetworkError::AddressSpaceExhausted {
                    name: group.name.clone(),
                    az: az_index + 1,
                }
                .into());
            }
            let addr = u32::try_from(start)
                .map_err(|_| NetworkError::InvalidCidr(props.cidr.to_string()))?;
            let cidr = Ipv4Network::new(Ipv4Addr::from(addr), group.cidr_mask)
                .map_err(|e| NetworkError::InvalidCidr(e.to_string()))?;
            out.push(SubnetAllocation {
                group: group.name.clone(),
                subnet_type: group.subnet_type,
                az_index,
                cidr,
            });
            cursor = start + size;
        }
    }
    Ok(out)
}

// ── Resource properties ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    #[must_use]
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct VpcResource {
    cidr_block: String,
    enable_dns_hostnames: bool,
    enable_dns_support: bool,
    instance_tenancy: &'static str,
    tags: Vec<Tag>,
}

impl ResourceProps for VpcResource {
    const TYPE: &'static str = "AWS::EC2::VPC";
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SubnetResource {
    vpc_id: Expr,
    cidr_block: String,
    availability_zone: Expr,
    map_public_ip_on_launch: bool,
    tags: Vec<Tag>,
}

impl ResourceProps for SubnetResource {
    const TYPE: &'static str = "AWS::EC2::Subnet";
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct RouteTableResource {
    vpc_id: Expr,
    tags: Vec<Tag>,
}

impl ResourceProps for RouteTableResource {
    const TYPE: &'static str = "AWS::EC2::RouteTable";
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct RouteTableAssociationResource {
    route_table_id: Expr,
    subnet_id: Expr,
}

impl ResourceProps for RouteTableAssociationResource {
    const TYPE: &'static str = "AWS::EC2::SubnetRouteTableAssociation";
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct RouteResource {
    route_table_id: Expr,
    destination_cidr_block: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    gateway_id: Option<Expr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nat_gateway_id: Option<Expr>,
}

impl ResourceProps for RouteResource {
    const TYPE: &'static str = "AWS::EC2::Route";
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct InternetGatewayResource {
    tags: Vec<Tag>,
}

impl ResourceProps for InternetGatewayResource {
    const TYPE: &'static str = "AWS::EC2::InternetGateway";
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct GatewayAttachmentResource {
    vpc_id: Expr,
    internet_gateway_id: Expr,
}

impl ResourceProps for GatewayAttachmentResource {
    const TYPE: &'static str = "AWS::EC2::VPCGatewayAttachment";
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct EipResource {
    domain: &'static str,
    tags: Vec<Tag>,
}

impl ResourceProps for EipResource {
    const TYPE: &'static str = "AWS::EC2::EIP";
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct NatGatewayResource {
    subnet_id: Expr,
    allocation_id: Expr,
    tags: Vec<Tag>,
}

impl ResourceProps for NatGatewayResource {
    const TYPE: &'static str = "AWS::EC2::NatGateway";
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct VpcEndpointResource {
    service_name: Expr,
    vpc_id: Expr,
    route_table_ids: Vec<Expr>,
    vpc_endpoint_type: &'static str,
}

impl ResourceProps for VpcEndpointResource {
    const TYPE: &'static str = "AWS::EC2::VPCEndpoint";
}

// ── Network construct ────────────────────────────────────────────────────────

/// A subnet and the route table that decides its reachability.
#[derive(Debug, Clone)]
pub struct Subnet {
    pub allocation: SubnetAllocation,
    pub subnet: ResourceHandle,
    pub route_table: ResourceHandle,
    pub default_route: Option<ResourceHandle>,
}

/// A declared network and handles to its parts.
#[derive(Debug, Clone)]
pub struct Network {
    id: String,
    vpc: ResourceHandle,
    subnets: Vec<Subnet>,
    internet_gateway: Option<ResourceHandle>,
    nat_gateways: Vec<ResourceHandle>,
}

impl Network {
    /// Declare the network under construct id `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the declaration is invalid, the address space is
    /// exhausted, or a logical id collides.
    pub fn build(stack: &mut Stack, id: &str, props: &NetworkProps) -> Result<Self> {
        let allocations = allocate_subnets(props)?;
        let name_tag = format!("{}/{id}", stack.name());

        let vpc = stack.add(
            &[id],
            &VpcResource {
                cidr_block: props.cidr.to_string(),
                enable_dns_hostnames: props.enable_dns_hostnames,
                enable_dns_support: props.enable_dns_support,
                instance_tenancy: "default",
                tags: vec![Tag::new("Name", &name_tag)],
            },
        )?;

        let (internet_gateway, attachment) = if props.has_type(SubnetType::Public) {
            let igw = stack.add(
                &[id, "IGW"],
                &InternetGatewayResource {
                    tags: vec![Tag::new("Name", &name_tag)],
                },
            )?;
            let attachment = stack.add(
                &[id, "VPCGW"],
                &GatewayAttachmentResource {
                    vpc_id: vpc.reference(),
                    internet_gateway_id: igw.reference(),
                },
            )?;
            (Some(igw), Some(attachment))
        } else {
            (None, None)
        };

        let mut network = Self {
            id: id.to_string(),
            vpc,
            subnets: Vec::with_capacity(allocations.len()),
            internet_gateway,
            nat_gateways: Vec::new(),
        };

        for allocation in allocations {
            let subnet = network.declare_subnet(stack, &name_tag, allocation)?;
            network.subnets.push(subnet);
        }

        network.route_public(stack, attachment.as_ref())?;
        network.declare_egress(stack, props, &name_tag)?;
        Ok(network)
    }

    fn declare_subnet(
        &self,
        stack: &mut Stack,
        name_tag: &str,
        allocation: SubnetAllocation,
    ) -> Result<Subnet> {
        let local = format!("{}Subnet{}", allocation.group, allocation.az_index + 1);
        let tag = format!("{name_tag}/{local}");
        let tags = vec![
            Tag::new("Name", &tag),
            Tag::new("strata:subnet-name", &allocation.group),
            Tag::new("strata:subnet-type", &allocation.subnet_type.to_string()),
        ];
        let subnet = stack.add(
            &[&self.id, &local, "Subnet"],
            &SubnetResource {
                vpc_id: self.vpc.reference(),
                cidr_block: allocation.cidr.to_string(),
                availability_zone: Expr::availability_zone(allocation.az_index),
                map_public_ip_on_launch: allocation.subnet_type == SubnetType::Public,
                tags,
            },
        )?;
        let route_table = stack.add(
            &[&self.id, &local, "RouteTable"],
            &RouteTableResource {
                vpc_id: self.vpc.reference(),
                tags: vec![Tag::new("Name", &tag)],
            },
        )?;
        stack.add(
            &[&self.id, &local, "RouteTableAssociation"],
            &RouteTableAssociationResource {
                route_table_id: route_table.reference(),
                subnet_id: subnet.reference(),
            },
        )?;
        Ok(Subnet {
            allocation,
            subnet,
            route_table,
            default_route: None,
        })
    }

    fn route_public(&mut self, stack: &mut Stack, attachment: Option<&ResourceHandle>) -> Result<()> {
        let (Some(igw), Some(attachment)) = (self.internet_gateway.clone(), attachment) else {
            return Ok(());
        };
        let id = self.id.clone();
        for subnet in self
            .subnets
            .iter_mut()
            .filter(|s| s.allocation.subnet_type == SubnetType::Public)
        {
            let local = format!(
                "{}Subnet{}",
                subnet.allocation.group,
                subnet.allocation.az_index + 1
            );
            let route = stack.add(
                &[&id, &local, "DefaultRoute"],
                &RouteResource {
                    route_table_id: subnet.route_table.reference(),
                    destination_cidr_block: DEFAULT_ROUTE,
                    gateway_id: Some(igw.reference()),
                    nat_gateway_id: None,
                },
            )?;
            stack.add_dependency(&route, attachment)?;
            subnet.default_route = Some(route);
        }
        Ok(())
    }

    fn declare_egress(&mut self, stack: &mut Stack, props: &NetworkProps, name_tag: &str) -> Result<()> {
        if !props.has_type(SubnetType::PrivateWithEgress) {
            return Ok(());
        }
        let count = props.nat_gateways.unwrap_or(props.max_azs);
        // Egress points live in the first public group, one per AZ.
        let hosts: Vec<Subnet> = self
            .subnets
            .iter()
            .filter(|s| s.allocation.subnet_type == SubnetType::Public)
            .filter(|s| s.allocation.group == first_group(props, SubnetType::Public))
            .take(usize::from(count))
            .cloned()
            .collect();

        for host in &hosts {
            let local = format!("{}Subnet{}", host.allocation.group, host.allocation.az_index + 1);
            let tag = format!("{name_tag}/{local}");
            let eip = stack.add(
                &[&self.id, &local, "EIP"],
                &EipResource {
                    domain: "vpc",
                    tags: vec![Tag::new("Name", &tag)],
                },
            )?;
            let nat = stack.add(
                &[&self.id, &local, "NATGateway"],
                &NatGatewayResource {
                    subnet_id: host.subnet.reference(),
                    allocation_id: eip.attr("AllocationId"),
                    tags: vec![Tag::new("Name", &tag)],
                },
            )?;
            if let Some(route) = &host.default_route {
                stack.add_dependency(&nat, route)?;
            }
            self.nat_gateways.push(nat);
        }

        let id = self.id.clone();
        let nats = self.nat_gateways.clone();
        for subnet in self
            .subnets
            .iter_mut()
            .filter(|s| s.allocation.subnet_type == SubnetType::PrivateWithEgress)
        {
            // Round-robin when there are fewer egress points than AZs.
            let nat = &nats[subnet.allocation.az_index % nats.len()];
            let local = format!(
                "{}Subnet{}",
                subnet.allocation.group,
                subnet.allocation.az_index + 1
            );
            let route = stack.add(
                &[&id, &local, "DefaultRoute"],
                &RouteResource {
                    route_table_id: subnet.route_table.reference(),
                    destination_cidr_block: DEFAULT_ROUTE,
                    gateway_id: None,
                    nat_gateway_id: Some(nat.reference()),
                },
            )?;
            subnet.default_route = Some(route);
        }
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn vpc_id(&self) -> Expr {
        self.vpc.reference()
    }

    #[must_use]
    pub fn vpc(&self) -> &ResourceHandle {
        &self.vpc
    }

    #[must_use]
    pub fn nat_gateways(&self) -> &[ResourceHandle] {
        &self.nat_gateways
    }

    #[must_use]
    pub fn has_tier(&self, subnet_type: SubnetType) -> bool {
        self.subnets
            .iter()
            .any(|s| s.allocation.subnet_type == subnet_type)
    }

    /// Subnets of one tier, ordered by group then AZ.
    pub fn subnets(&self, subnet_type: SubnetType) -> impl Iterator<Item = &Subnet> {
        self.subnets
            .iter()
            .filter(move |s| s.allocation.subnet_type == subnet_type)
    }

    /// Subnet id references of one tier.
    ///
    /// # Errors
    ///
    /// Returns an error if the network has no subnets of that tier.
    pub fn subnet_ids(&self, subnet_type: SubnetType) -> Result<Vec<Expr>> {
        let ids: Vec<Expr> = self
            .subnets(subnet_type)
            .map(|s| s.subnet.reference())
            .collect();
        if ids.is_empty() {
            return Err(NetworkError::NoSubnetsOfType(subnet_type.to_string()).into());
        }
        Ok(ids)
    }

    /// Declare a gateway endpoint (e.g. `s3`) routed from one tier's subnets.
    ///
    /// # Errors
    ///
    /// Returns an error if the tier is absent or the logical id collides.
    pub fn add_gateway_endpoint(
        &self,
        stack: &mut Stack,
        id: &str,
        service: &str,
        subnet_type: SubnetType,
    ) -> Result<ResourceHandle> {
        let route_table_ids: Vec<Expr> = self
            .subnets(subnet_type)
            .map(|s| s.route_table.reference())
            .collect();
        if route_table_ids.is_empty() {
            return Err(NetworkError::NoSubnetsOfType(subnet_type.to_string()).into());
        }
        stack.add(
            &[&self.id, id],
            &VpcEndpointResource {
                service_name: Expr::sub(format!("com.amazonaws.${{AWS::Region}}.{service}")),
                vpc_id: self.vpc.reference(),
                route_table_ids,
                vpc_endpoint_type: "Gateway",
            },
        )
    }
}

fn first_group(props: &NetworkProps, subnet_type: SubnetType) -> &str {
    props
        .subnets
        .iter()
        .find(|s| s.subnet_type == subnet_type)
        .map_or("", |s| s.name.as_str())
}
