//! Security boundaries: named allow-lists of inbound traffic flows.
//!
//! Rules are additive only. The traffic a resource accepts is the union of the
//! rules of every boundary attached to it; there is no deny rule and no
//! ordering between rules.

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use anyhow::Result;
use ipnetwork::Ipv4Network;
use serde::Serialize;
use strata_common::Expr;

use crate::domain::error::SecurityError;
use crate::domain::network::Network;
use crate::domain::stack::{ResourceHandle, ResourceProps, Stack};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    All,
}

impl Protocol {
    /// Protocol identifier as the provider spells it.
    #[must_use]
    pub fn ip_protocol(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
            Self::All => "-1",
        }
    }
}

/// A protocol and port range. `All` ignores the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Port {
    pub protocol: Protocol,
    pub from: u16,
    pub to: u16,
}

impl Port {
    #[must_use]
    pub fn tcp(port: u16) -> Self {
        Self {
            protocol: Protocol::Tcp,
            from: port,
            to: port,
        }
    }

    #[must_use]
    pub fn udp(port: u16) -> Self {
        Self {
            protocol: Protocol::Udp,
            from: port,
            to: port,
        }
    }

    /// # Errors
    ///
    /// Returns an error if `from > to`.
    pub fn tcp_range(from: u16, to: u16) -> Result<Self> {
        if from > to {
            return Err(SecurityError::InvalidPortRange { from, to }.into());
        }
        Ok(Self {
            protocol: Protocol::Tcp,
            from,
            to,
        })
    }

    #[must_use]
    pub fn all_traffic() -> Self {
        Self {
            protocol: Protocol::All,
            from: 0,
            to: u16::MAX,
        }
    }

    /// Whether this port definition admits every packet `other` admits.
    #[must_use]
    pub fn covers(&self, other: &Port) -> bool {
        match self.protocol {
            Protocol::All => true,
            p => p == other.protocol && self.from <= other.from && other.to <= self.to,
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.protocol {
            Protocol::All => f.write_str("all traffic"),
            p if self.from == self.to => write!(f, "{}/{}", p.ip_protocol(), self.from),
            p => write!(f, "{}/{}-{}", p.ip_protocol(), self.from, self.to),
        }
    }
}

/// Source of a traffic flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Peer {
    Ipv4(Ipv4Network),
    /// Every resource attached to the named boundary.
    Boundary(String),
}

impl Peer {
    #[must_use]
    pub fn any_ipv4() -> Self {
        Self::Ipv4(any_ipv4_network())
    }

    #[must_use]
    pub fn boundary(name: &str) -> Self {
        Self::Boundary(name.to_string())
    }

    /// Whether traffic from `other` is traffic from this peer.
    #[must_use]
    pub fn includes(&self, other: &Peer) -> bool {
        match (self, other) {
            (Self::Ipv4(a), Self::Ipv4(b)) => a.prefix() <= b.prefix() && a.contains(b.network()),
            (Self::Boundary(a), Self::Boundary(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ipv4(net) => write!(f, "{net}"),
            Self::Boundary(name) => write!(f, "boundary:{name}"),
        }
    }
}

/// `0.0.0.0/0`.
#[must_use]
pub fn any_ipv4_network() -> Ipv4Network {
    Ipv4Network::new(Ipv4Addr::UNSPECIFIED, 0).unwrap_or_else(|_| Ipv4Network::from(Ipv4Addr::UNSPECIFIED))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressRule {
    pub peer: Peer,
    pub port: Port,
    pub description: String,
}

/// A named set of inbound allow rules.
#[derive(Debug, Clone)]
pub struct SecurityBoundary {
    name: String,
    description: String,
    group_name: Option<String>,
    allow_all_outbound: bool,
    rules: Vec<IngressRule>,
}

impl SecurityBoundary {
    /// # Errors
    ///
    /// Returns an error if `name` is empty.
    pub fn new(name: &str, description: &str) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(SecurityError::EmptyName.into());
        }
        Ok(Self {
            name: name.to_string(),
            description: description.to_string(),
            group_name: None,
            allow_all_outbound: true,
            rules: Vec::new(),
        })
    }

    #[must_use]
    pub fn with_group_name(mut self, group_name: &str) -> Self {
        self.group_name = Some(group_name.to_string());
        self
    }

    #[must_use]
    pub fn with_allow_all_outbound(mut self, allow: bool) -> Self {
        self.allow_all_outbound = allow;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn rules(&self) -> &[IngressRule] {
        &self.rules
    }

    /// Allow `port` from `peer`. Returns `false` if the same flow was
    /// already allowed.
    pub fn add_ingress_rule(&mut self, peer: Peer, port: Port, description: &str) -> bool {
        if self.rules.iter().any(|r| r.peer == peer && r.port == port) {
            return false;
        }
        self.rules.push(IngressRule {
            peer,
            port,
            description: description.to_string(),
        });
        true
    }

    /// Drop the rule for exactly this flow. Returns `false` if none existed.
    pub fn remove_ingress_rule(&mut self, peer: &Peer, port: &Port) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| !(r.peer == *peer && r.port == *port));
        self.rules.len() != before
    }

    /// Rules whose source is exactly `peer`.
    #[must_use]
    pub fn inbound_rules_from(&self, peer: &Peer) -> Vec<&IngressRule> {
        self.rules.iter().filter(|r| r.peer == *peer).collect()
    }

    /// Whether any rule admits `port` traffic from `peer`.
    #[must_use]
    pub fn allows(&self, peer: &Peer, port: &Port) -> bool {
        self.rules
            .iter()
            .any(|r| r.peer.includes(peer) && r.port.covers(port))
    }
}

// ── Resource properties ──────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CidrRule {
    ip_protocol: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from_port: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to_port: Option<i32>,
    cidr_ip: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    description: String,
}

impl CidrRule {
    fn new(port: &Port, cidr: &Ipv4Network, description: &str) -> Self {
        let (from_port, to_port) = port_bounds(port);
        Self {
            ip_protocol: port.protocol.ip_protocol(),
            from_port,
            to_port,
            cidr_ip: cidr.to_string(),
            description: description.to_string(),
        }
    }
}

fn port_bounds(port: &Port) -> (Option<i32>, Option<i32>) {
    match port.protocol {
        Protocol::All => (None, None),
        _ => (Some(i32::from(port.from)), Some(i32::from(port.to))),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SecurityGroupResource {
    group_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    group_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    security_group_ingress: Vec<CidrRule>,
    security_group_egress: Vec<CidrRule>,
    vpc_id: Expr,
}

impl ResourceProps for SecurityGroupResource {
    const TYPE: &'static str = "AWS::EC2::SecurityGroup";
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SecurityGroupIngressResource {
    ip_protocol: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from_port: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to_port: Option<i32>,
    group_id: Expr,
    source_security_group_id: Expr,
    #[serde(skip_serializing_if = "String::is_empty")]
    description: String,
}

impl ResourceProps for SecurityGroupIngressResource {
    const TYPE: &'static str = "AWS::EC2::SecurityGroupIngress";
}

fn disallow_all_egress() -> CidrRule {
    // The provider adds allow-all egress to groups without egress rules;
    // a rule matching nothing suppresses it.
    CidrRule {
        ip_protocol: "icmp",
        from_port: Some(252),
        to_port: Some(86),
        cidr_ip: "255.255.255.255/32".to_string(),
        description: "Disallow all traffic".to_string(),
    }
}

// ── Boundary set ─────────────────────────────────────────────────────────────

/// All boundaries of one stack, so that boundary-to-boundary flows can be
/// resolved when the stack is built.
#[derive(Debug, Clone, Default)]
pub struct BoundarySet {
    boundaries: Vec<SecurityBoundary>,
}

impl BoundarySet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns an error if a boundary with the same name exists.
    pub fn insert(&mut self, boundary: SecurityBoundary) -> Result<()> {
        if self.get(boundary.name()).is_some() {
            return Err(SecurityError::DuplicateBoundary(boundary.name).into());
        }
        self.boundaries.push(boundary);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SecurityBoundary> {
        self.boundaries.iter().find(|b| b.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut SecurityBoundary> {
        self.boundaries.iter_mut().find(|b| b.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SecurityBoundary> {
        self.boundaries.iter()
    }

    /// Whether traffic from boundary `from` on `port` reaches boundary `to`.
    #[must_use]
    pub fn flow_allowed(&self, from: &str, to: &str, port: &Port) -> bool {
        self.get(to)
            .is_some_and(|b| b.allows(&Peer::boundary(from), port))
    }

    /// Declare one security group per boundary, then one ingress resource
    /// per boundary-sourced rule naming both source and destination groups.
    ///
    /// # Errors
    ///
    /// Returns an error if a rule names an unknown boundary or a logical id
    /// collides.
    pub fn build(
        &self,
        stack: &mut Stack,
        network: &Network,
    ) -> Result<BTreeMap<String, ResourceHandle>> {
        for boundary in &self.boundaries {
            for rule in &boundary.rules {
                if let Peer::Boundary(peer) = &rule.peer
                    && self.get(peer).is_none()
                {
                    return Err(SecurityError::UnknownPeer {
                        boundary: boundary.name.clone(),
                        peer: peer.clone(),
                    }
                    .into());
                }
            }
        }

        let mut groups = BTreeMap::new();
        for boundary in &self.boundaries {
            let ingress = boundary
                .rules
                .iter()
                .filter_map(|r| match &r.peer {
                    Peer::Ipv4(cidr) => Some(CidrRule::new(&r.port, cidr, &r.description)),
                    Peer::Boundary(_) => None,
                })
                .collect();
            let egress = if boundary.allow_all_outbound {
                vec![CidrRule::new(
                    &Port::all_traffic(),
                    &any_ipv4_network(),
                    "Allow all outbound traffic by default",
                )]
            } else {
                vec![disallow_all_egress()]
            };
            let group_description = format!("{}/{}", stack.name(), boundary.description);
            let handle = stack.add(
                &[&boundary.name, "SecurityGroup"],
                &SecurityGroupResource {
                    group_description,
                    group_name: boundary.group_name.clone(),
                    security_group_ingress: ingress,
                    security_group_egress: egress,
                    vpc_id: network.vpc_id(),
                },
            )?;
            groups.insert(boundary.name.clone(), handle);
        }

        for boundary in &self.boundaries {
            for rule in &boundary.rules {
                let Peer::Boundary(peer) = &rule.peer else {
                    continue;
                };
                let (from_port, to_port) = port_bounds(&rule.port);
                let local = format!("from {peer} {}", rule.port);
                stack.add(
                    &[&boundary.name, &local],
                    &SecurityGroupIngressResource {
                        ip_protocol: rule.port.protocol.ip_protocol(),
                        from_port,
                        to_port,
                        group_id: groups[&boundary.name].attr("GroupId"),
                        source_security_group_id: groups[peer].attr("GroupId"),
                        description: rule.description.clone(),
                    },
                )?;
            }
        }
        Ok(groups)
    }
}
