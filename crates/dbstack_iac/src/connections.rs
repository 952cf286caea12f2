//! Network access policy attached to a unit.

use serde::{Deserialize, Serialize};

use dbstack_core::{ConfigurationError, Ipv4Cidr};

/// Source allowed by an ingress rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "cidr")]
pub enum Peer {
    /// Members of the same security group.
    SelfReference,
    /// Any address inside the range.
    Ipv4(Ipv4Cidr),
}

impl Peer {
    pub fn ipv4(cidr: Ipv4Cidr) -> Self {
        Peer::Ipv4(cidr)
    }
}

impl std::fmt::Display for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Peer::SelfReference => write!(f, "self"),
            Peer::Ipv4(cidr) => write!(f, "{}", cidr),
        }
    }
}

/// Additive allow rule for TCP traffic on one port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IngressRule {
    pub peer: Peer,
    pub port: u16,
    pub description: String,
}

/// Ingress rules of a unit, with the port it listens on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connections {
    default_port: u16,
    rules: Vec<IngressRule>,
}

impl Connections {
    pub fn new(default_port: u16) -> Self {
        Self {
            default_port,
            rules: Vec::new(),
        }
    }

    pub fn default_port(&self) -> u16 {
        self.default_port
    }

    /// Allow members to reach each other on the default port.
    pub fn allow_default_port_internally(&mut self) -> &mut Self {
        self.allow_default_port_from(Peer::SelfReference, "from self")
    }

    /// Like [`Connections::allow_default_port_from`], but a rule that is
    /// already present is an error instead of a no-op.
    pub fn require_default_port_from(
        &mut self,
        peer: Peer,
        description: impl Into<String>,
    ) -> Result<&mut Self, ConfigurationError> {
        if self.allows(&peer, self.default_port) {
            return Err(ConfigurationError::DuplicateAccessRule {
                peer: peer.to_string(),
                port: self.default_port,
            });
        }
        Ok(self.allow_default_port_from(peer, description))
    }

    /// Allow `peer` to reach the default port. Repeated rules are ignored.
    pub fn allow_default_port_from(&mut self, peer: Peer, description: impl Into<String>) -> &mut Self {
        let rule = IngressRule {
            peer,
            port: self.default_port,
            description: description.into(),
        };
        if !self.rules.iter().any(|r| r.peer == rule.peer && r.port == rule.port) {
            self.rules.push(rule);
        }
        self
    }

    pub fn rules(&self) -> &[IngressRule] {
        &self.rules
    }

    pub fn allows(&self, peer: &Peer, port: u16) -> bool {
        self.rules.iter().any(|r| r.peer == *peer && r.port == port)
    }
}
