//! # dbstack_iac
//!
//! Declarative network and database units, and the templates they
//! synthesize to.
//!
//! Nothing here talks to a cloud provider. Units describe desired state;
//! an external orchestrator applies the synthesized templates.
//!
//! ## Features
//!
//! - Two-tier network unit with public and private subnets
//! - Aurora database cluster bound to that network, with a rotated secret
//! - Deterministic identifiers and template output
//! - Local topology checks before synthesis
//!
//! ## Example
//!
//! ```rust,no_run
//! use dbstack_core::{ContextMap, DeploymentConfig};
//! use dbstack_iac::{assemble_environment, Synthesizer};
//!
//! let topology = assemble_environment(&DeploymentConfig::demo(), "demo", &ContextMap::new()).unwrap();
//! let manifest = Synthesizer::new("dbstack.out").synthesize(&topology).unwrap();
//! assert_eq!(manifest.deployment_order, vec!["VpcStackDemo", "RdsStackDemo"]);
//! ```

pub mod connections;
pub mod database;
pub mod engine;
pub mod error;
pub mod network;
pub mod parameter_group;
pub mod synth;
pub mod template;
pub mod topology;
pub mod unit;
pub mod validator;

pub use connections::{Connections, IngressRule, Peer};
pub use database::{
    ClusterHandle, DatabaseProps, DatabaseUnit, RotationSchedule, SecretRef, SECRETS_MANAGER_TRANSFORM,
    SECRET_ARN_EXPORT,
};
pub use engine::{DatabaseEngine, EngineFamily, InstanceClass, InstanceSize, InstanceType, SubnetType};
pub use error::{IacError, IacResult};
pub use network::{NetworkHandle, NetworkProps, NetworkUnit, Subnet, SubnetGroup, VPC_LOGICAL_ID};
pub use parameter_group::{check_parameter_group, DefaultParameterGroups, ParameterGroupCatalog};
pub use synth::{ArtifactEntry, SynthManifest, SynthOutput, Synthesizer, MANIFEST_FILE};
pub use template::{Export, Template};
pub use topology::{assemble, assemble_environment, Topology, DATABASE_UNIT_BASE, NETWORK_UNIT_BASE};
pub use unit::{DeclaredUnit, UnitKind};
pub use validator::{TopologyValidator, ValidationCheck, ValidationReport};
