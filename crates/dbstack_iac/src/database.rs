//! Database unit: a managed relational cluster, its access rules, credential
//! rotation and the exported secret reference.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use dbstack_core::{ConfigurationError, Ipv4Cidr, RemovalPolicy};

use crate::connections::{Connections, Peer};
use crate::engine::{DatabaseEngine, InstanceType, SubnetType};
use crate::error::IacResult;
use crate::network::NetworkHandle;
use crate::parameter_group::{check_parameter_group, DefaultParameterGroups, ParameterGroupCatalog};
use crate::template::{get_att, reference, sub, Export, Template};
use crate::unit::{DeclaredUnit, UnitKind};

/// Fixed export name of the credential-secret reference.
pub const SECRET_ARN_EXPORT: &str = "SecretArn";

const CLUSTER_LOGICAL_ID: &str = "RdsCluster";
const SECURITY_GROUP_LOGICAL_ID: &str = "RdsClusterSecurityGroup";
const SUBNET_GROUP_LOGICAL_ID: &str = "RdsClusterSubnets";
const SECRET_LOGICAL_ID: &str = "RdsClusterSecret";
const SECRET_ATTACHMENT_LOGICAL_ID: &str = "RdsClusterSecretAttachment";
const ROTATION_LOGICAL_ID: &str = "RdsClusterSecretRotationSchedule";

/// Transform required by `HostedRotationLambda`.
pub const SECRETS_MANAGER_TRANSFORM: &str = "AWS::SecretsManager-2020-07-23";

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z][A-Za-z0-9_]{0,62}$";

/// Automatic credential rotation declared on the cluster secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationSchedule {
    /// Hosted rotation application, e.g. `PostgreSQLSingleUser`.
    pub application: String,
    pub automatically_after_days: u32,
}

impl RotationSchedule {
    pub fn single_user(engine: &DatabaseEngine) -> Self {
        Self {
            application: engine.family.single_user_rotation().to_string(),
            automatically_after_days: 30,
        }
    }

    pub fn every(mut self, days: u32) -> Self {
        self.automatically_after_days = days;
        self
    }
}

/// Database unit inputs. The external ingress range has no default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseProps {
    pub engine: DatabaseEngine,
    pub instance_type: InstanceType,
    pub instances: u32,
    pub port: u16,
    pub default_database_name: String,
    pub master_username: String,
    pub subnet_type: SubnetType,
    pub parameter_group: String,
    pub removal_policy: RemovalPolicy,
    pub rotation: Option<RotationSchedule>,
    pub ingress_cidr: Ipv4Cidr,
}

impl DatabaseProps {
    /// Aurora PostgreSQL 11.7 on one `db.r5.large`, port 5432, schema `pgdb`,
    /// public subnets, default parameter group, single-user rotation, and
    /// no retention on removal.
    pub fn new(ingress_cidr: Ipv4Cidr) -> Self {
        let engine = DatabaseEngine::aurora_postgres_11_7();
        Self {
            port: engine.family.default_port(),
            parameter_group: engine.default_parameter_group(),
            rotation: Some(RotationSchedule::single_user(&engine)),
            engine,
            instance_type: InstanceType::default(),
            instances: 1,
            default_database_name: "pgdb".to_string(),
            master_username: "postgres".to_string(),
            subnet_type: SubnetType::Public,
            removal_policy: RemovalPolicy::Destroy,
            ingress_cidr,
        }
    }

    pub fn with_instances(mut self, instances: u32) -> Self {
        self.instances = instances;
        self
    }

    pub fn with_instance_type(mut self, instance_type: InstanceType) -> Self {
        self.instance_type = instance_type;
        self
    }

    pub fn with_subnet_type(mut self, subnet_type: SubnetType) -> Self {
        self.subnet_type = subnet_type;
        self
    }

    pub fn with_parameter_group(mut self, name: impl Into<String>) -> Self {
        self.parameter_group = name.into();
        self
    }

    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = policy;
        self
    }

    pub fn with_rotation(mut self, rotation: Option<RotationSchedule>) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.instances == 0 {
            return Err(ConfigurationError::invalid_setting("database.instances", "must be at least 1"));
        }
        if self.port == 0 {
            return Err(ConfigurationError::invalid_setting("database.port", "must not be 0"));
        }

        let identifier = Regex::new(IDENTIFIER_PATTERN)
            .map_err(|e| ConfigurationError::invalid_setting("database", e.to_string()))?;
        for (key, value) in [
            ("database.default_database_name", &self.default_database_name),
            ("database.master_username", &self.master_username),
        ] {
            if !identifier.is_match(value) {
                return Err(ConfigurationError::invalid_setting(
                    key,
                    format!("'{}' is not a valid identifier", value),
                ));
            }
        }

        if let Some(rotation) = &self.rotation {
            if !(1..=365).contains(&rotation.automatically_after_days) {
                return Err(ConfigurationError::invalid_setting(
                    "database.rotation",
                    "rotation interval must be between 1 and 365 days",
                ));
            }
        }
        Ok(())
    }
}

/// What the database keeps from the network handle after construction.
#[derive(Debug, Clone, PartialEq)]
struct NetworkBinding {
    network_id: String,
    vpc_id: Value,
    subnet_ids: Vec<Value>,
}

/// Reference to the cluster credential secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRef {
    logical_id: String,
}

impl SecretRef {
    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    /// Template expression resolving to the secret ARN.
    pub fn arn(&self) -> Value {
        reference(&self.logical_id)
    }
}

/// Borrowed view of the declared cluster.
#[derive(Debug, Clone, Copy)]
pub struct ClusterHandle<'a> {
    unit: &'a DatabaseUnit,
}

impl<'a> ClusterHandle<'a> {
    pub fn port(&self) -> u16 {
        self.unit.props.port
    }

    pub fn secret(&self) -> &'a SecretRef {
        &self.unit.secret
    }

    pub fn connections(&self) -> &'a Connections {
        &self.unit.connections
    }

    pub fn endpoint_address(&self) -> Value {
        get_att(CLUSTER_LOGICAL_ID, "Endpoint.Address")
    }
}

/// Declared database cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseUnit {
    id: String,
    props: DatabaseProps,
    network: NetworkBinding,
    connections: Connections,
    secret: SecretRef,
}

impl DatabaseUnit {
    /// Declare the cluster inside `network` using the built-in parameter
    /// group catalog.
    pub fn new(id: impl Into<String>, network: &NetworkHandle<'_>, props: DatabaseProps) -> IacResult<Self> {
        Self::with_catalog(id, network, props, &DefaultParameterGroups)
    }

    pub fn with_catalog(
        id: impl Into<String>,
        network: &NetworkHandle<'_>,
        props: DatabaseProps,
        catalog: &dyn ParameterGroupCatalog,
    ) -> IacResult<Self> {
        let id = id.into();
        props.validate()?;
        check_parameter_group(catalog, &props.engine, &props.parameter_group)?;

        let subnets = network.select_subnets(props.subnet_type)?;
        let binding = NetworkBinding {
            network_id: network.id().to_string(),
            vpc_id: network.vpc_id(),
            subnet_ids: subnets.iter().map(|s| network.subnet_id(s)).collect(),
        };

        // All three rules or none: the unit only exists once they are in.
        let mut connections = Connections::new(props.port);
        connections
            .require_default_port_from(Peer::SelfReference, "from self")?
            .require_default_port_from(Peer::ipv4(network.cidr_block()), "from network")?
            .require_default_port_from(Peer::ipv4(props.ingress_cidr), "from allow-listed range")?;

        debug!(
            "Access rules for {}: {}",
            id,
            connections
                .rules()
                .iter()
                .map(|r| r.peer.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        info!(
            "Declared database {} ({} {}, {} x {}, removal={})",
            id,
            props.engine.family,
            props.engine.version,
            props.instances,
            props.instance_type,
            props.removal_policy
        );

        Ok(Self {
            id,
            props,
            network: binding,
            connections,
            secret: SecretRef {
                logical_id: SECRET_ATTACHMENT_LOGICAL_ID.to_string(),
            },
        })
    }

    pub fn props(&self) -> &DatabaseProps {
        &self.props
    }

    pub fn network_id(&self) -> &str {
        &self.network.network_id
    }

    pub fn cluster(&self) -> ClusterHandle<'_> {
        ClusterHandle { unit: self }
    }

    /// Extend the access policy with another allow rule on the cluster port.
    pub fn allow_from(&mut self, peer: Peer, description: impl Into<String>) -> &mut Self {
        self.connections.allow_default_port_from(peer, description);
        self
    }

    fn ingress_resources(&self, template: &mut Template) {
        for (i, rule) in self.connections.rules().iter().enumerate() {
            let mut properties = json!({
                "GroupId": get_att(SECURITY_GROUP_LOGICAL_ID, "GroupId"),
                "IpProtocol": "tcp",
                "FromPort": rule.port,
                "ToPort": rule.port,
                "Description": rule.description,
            });
            match rule.peer {
                Peer::SelfReference => {
                    properties["SourceSecurityGroupId"] = get_att(SECURITY_GROUP_LOGICAL_ID, "GroupId");
                }
                Peer::Ipv4(cidr) => {
                    properties["CidrIp"] = json!(cidr.to_string());
                }
            }
            template.resource(
                &format!("{}Ingress{}", SECURITY_GROUP_LOGICAL_ID, i + 1),
                "AWS::EC2::SecurityGroupIngress",
                properties,
            );
        }
    }
}

impl DeclaredUnit for DatabaseUnit {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> UnitKind {
        UnitKind::Database
    }

    fn template(&self) -> Template {
        let props = &self.props;
        let mut template = Template::new(format!("Database unit {}", self.id));
        let publicly_accessible = props.subnet_type == SubnetType::Public;

        template.resource(
            SUBNET_GROUP_LOGICAL_ID,
            "AWS::RDS::DBSubnetGroup",
            json!({
                "DBSubnetGroupDescription": format!("Subnets for {} database", CLUSTER_LOGICAL_ID),
                "SubnetIds": self.network.subnet_ids,
            }),
        );

        template.resource(
            SECURITY_GROUP_LOGICAL_ID,
            "AWS::EC2::SecurityGroup",
            json!({
                "GroupDescription": format!("{}/{} security group", self.id, CLUSTER_LOGICAL_ID),
                "VpcId": self.network.vpc_id,
                "SecurityGroupEgress": [{ "CidrIp": "0.0.0.0/0", "IpProtocol": "-1" }],
            }),
        );
        self.ingress_resources(&mut template);

        template.resource_with_policy(
            SECRET_LOGICAL_ID,
            "AWS::SecretsManager::Secret",
            json!({
                "Description": format!("Generated by {} for {}", self.id, CLUSTER_LOGICAL_ID),
                "GenerateSecretString": {
                    "SecretStringTemplate": json!({ "username": props.master_username }).to_string(),
                    "GenerateStringKey": "password",
                    "PasswordLength": 30,
                    "ExcludeCharacters": " %+~`#$&*()|[]{}:;<>?!'/@\"\\",
                },
            }),
            without_snapshot(props.removal_policy),
        );
        template.resource(
            SECRET_ATTACHMENT_LOGICAL_ID,
            "AWS::SecretsManager::SecretTargetAttachment",
            json!({
                "SecretId": reference(SECRET_LOGICAL_ID),
                "TargetId": reference(CLUSTER_LOGICAL_ID),
                "TargetType": "AWS::RDS::DBCluster",
            }),
        );

        template.resource_with_policy(
            CLUSTER_LOGICAL_ID,
            "AWS::RDS::DBCluster",
            json!({
                "Engine": props.engine.family.as_str(),
                "EngineVersion": props.engine.version,
                "Port": props.port,
                "DatabaseName": props.default_database_name,
                "DBClusterParameterGroupName": props.parameter_group,
                "DBSubnetGroupName": reference(SUBNET_GROUP_LOGICAL_ID),
                "VpcSecurityGroupIds": [get_att(SECURITY_GROUP_LOGICAL_ID, "GroupId")],
                "MasterUsername": sub(&format!(
                    "{{{{resolve:secretsmanager:${{{}}}:SecretString:username}}}}",
                    SECRET_LOGICAL_ID
                )),
                "MasterUserPassword": sub(&format!(
                    "{{{{resolve:secretsmanager:${{{}}}:SecretString:password}}}}",
                    SECRET_LOGICAL_ID
                )),
            }),
            props.removal_policy,
        );

        for n in 1..=props.instances {
            let instance_id = format!("{}Instance{}", CLUSTER_LOGICAL_ID, n);
            template.resource_with_policy(
                &instance_id,
                "AWS::RDS::DBInstance",
                json!({
                    "DBClusterIdentifier": reference(CLUSTER_LOGICAL_ID),
                    "DBInstanceClass": props.instance_type.db_instance_class(),
                    "Engine": props.engine.family.as_str(),
                    "DBSubnetGroupName": reference(SUBNET_GROUP_LOGICAL_ID),
                    "PubliclyAccessible": publicly_accessible,
                }),
                without_snapshot(props.removal_policy),
            );
        }

        if let Some(rotation) = &props.rotation {
            template.with_transform(SECRETS_MANAGER_TRANSFORM);
            template.resource(
                ROTATION_LOGICAL_ID,
                "AWS::SecretsManager::RotationSchedule",
                json!({
                    "SecretId": reference(SECRET_ATTACHMENT_LOGICAL_ID),
                    "HostedRotationLambda": {
                        "RotationType": rotation.application,
                        "VpcSecurityGroupIds": get_att(SECURITY_GROUP_LOGICAL_ID, "GroupId"),
                        "VpcSubnetIds": { "Fn::Join": [",", self.network.subnet_ids] },
                    },
                    "RotationRules": { "AutomaticallyAfterDays": rotation.automatically_after_days },
                }),
            );
        }

        for export in self.exports() {
            template.output(&export);
        }

        template
    }

    fn exports(&self) -> Vec<Export> {
        vec![Export::new(SECRET_ARN_EXPORT, SECRET_ARN_EXPORT, self.cluster().secret().arn())
            .with_description("Database credential secret")]
    }
}

/// Only clusters can be snapshotted; everything else is deleted instead.
fn without_snapshot(policy: RemovalPolicy) -> RemovalPolicy {
    match policy {
        RemovalPolicy::Snapshot => RemovalPolicy::Destroy,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IacError;
    use crate::network::{NetworkProps, NetworkUnit, SubnetGroup};

    fn network() -> NetworkUnit {
        NetworkUnit::new("VpcStackDemo", "ap-northeast-2", NetworkProps::default()).unwrap()
    }

    fn ingress() -> Ipv4Cidr {
        Ipv4Cidr::new("39.115.51.138/32").unwrap()
    }

    #[test]
    fn test_three_rules_in_order() {
        let network = network();
        let db = DatabaseUnit::new("RdsStackDemo", &network.handle(), DatabaseProps::new(ingress())).unwrap();

        let rules = db.cluster().connections().rules();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].peer, Peer::SelfReference);
        assert_eq!(rules[1].peer, Peer::Ipv4(Ipv4Cidr::new("10.0.0.0/16").unwrap()));
        assert_eq!(rules[2].peer, Peer::Ipv4(ingress()));
        assert!(rules.iter().all(|r| r.port == 5432));
    }

    #[test]
    fn test_single_secret_export() {
        let network = network();
        let db = DatabaseUnit::new("RdsStackDemo", &network.handle(), DatabaseProps::new(ingress())).unwrap();
        let exports = db.exports();
        assert_eq!(exports.len(), 1);
        assert_eq!(exports[0].name, "SecretArn");
        assert_eq!(exports[0].value, json!({ "Ref": "RdsClusterSecretAttachment" }));
    }

    #[test]
    fn test_template_cluster_settings() {
        let network = network();
        let db = DatabaseUnit::new("RdsStackDemo", &network.handle(), DatabaseProps::new(ingress())).unwrap();
        let doc = db.template().to_json();
        let cluster = &doc["Resources"]["RdsCluster"];

        assert_eq!(cluster["Properties"]["Engine"], "aurora-postgresql");
        assert_eq!(cluster["Properties"]["EngineVersion"], "11.7");
        assert_eq!(cluster["Properties"]["Port"], 5432);
        assert_eq!(cluster["Properties"]["DatabaseName"], "pgdb");
        assert_eq!(
            cluster["Properties"]["DBClusterParameterGroupName"],
            "default.aurora-postgresql11"
        );
        assert_eq!(cluster["DeletionPolicy"], "Delete");
        assert_eq!(
            cluster["Properties"]["MasterUsername"]["Fn::Sub"],
            "{{resolve:secretsmanager:${RdsClusterSecret}:SecretString:username}}"
        );

        let instance = &doc["Resources"]["RdsClusterInstance1"]["Properties"];
        assert_eq!(instance["DBInstanceClass"], "db.r5.large");
        assert_eq!(instance["PubliclyAccessible"], true);
        assert!(doc["Resources"].get("RdsClusterInstance2").is_none());

        let rotation = &doc["Resources"]["RdsClusterSecretRotationSchedule"]["Properties"];
        assert_eq!(rotation["HostedRotationLambda"]["RotationType"], "PostgreSQLSingleUser");
        assert_eq!(rotation["RotationRules"]["AutomaticallyAfterDays"], 30);
        assert_eq!(doc["Transform"], "AWS::SecretsManager-2020-07-23");

        assert_eq!(
            doc["Resources"]["RdsClusterSecurityGroupIngress3"]["Properties"]["CidrIp"],
            "39.115.51.138/32"
        );
        assert_eq!(
            doc["Resources"]["RdsClusterSubnets"]["Properties"]["SubnetIds"][0],
            json!({ "Fn::ImportValue": "VpcStackDemo-PublicSubnet1Id" })
        );
        assert_eq!(doc["Outputs"]["SecretArn"]["Export"]["Name"], "SecretArn");
    }

    #[test]
    fn test_retain_policy_configurable() {
        let network = network();
        let props = DatabaseProps::new(ingress())
            .with_removal_policy(RemovalPolicy::Snapshot)
            .with_instances(2);
        let db = DatabaseUnit::new("RdsStackProd", &network.handle(), props).unwrap();
        let doc = db.template().to_json();
        assert_eq!(doc["Resources"]["RdsCluster"]["DeletionPolicy"], "Snapshot");
        assert_eq!(doc["Resources"]["RdsClusterSecret"]["DeletionPolicy"], "Delete");
        assert_eq!(doc["Resources"]["RdsClusterInstance2"]["DeletionPolicy"], "Delete");
    }

    #[test]
    fn test_missing_subnet_type_fails() {
        let network = NetworkUnit::new(
            "VpcStackDemo",
            "ap-northeast-2",
            NetworkProps::default().with_subnet_groups(vec![SubnetGroup::public("Public", 24)]),
        )
        .unwrap();
        let props = DatabaseProps::new(ingress()).with_subnet_type(SubnetType::Private);
        let err = DatabaseUnit::new("RdsStackDemo", &network.handle(), props).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_mismatched_default_parameter_group() {
        let network = network();
        let props = DatabaseProps::new(ingress()).with_parameter_group("default.aurora-postgresql12");
        let err = DatabaseUnit::new("RdsStackDemo", &network.handle(), props).unwrap_err();
        assert!(err.to_string().contains("default.aurora-postgresql12"));
    }

    #[test]
    fn test_invalid_props() {
        let network = network();
        let handle = network.handle();
        assert!(DatabaseUnit::new("Db", &handle, DatabaseProps::new(ingress()).with_instances(0)).is_err());
        assert!(DatabaseUnit::new("Db", &handle, DatabaseProps::new(ingress()).with_port(0)).is_err());

        let mut props = DatabaseProps::new(ingress());
        props.default_database_name = "pg-db".to_string();
        assert!(DatabaseUnit::new("Db", &handle, props).is_err());
    }

    #[test]
    fn test_without_rotation() {
        let network = network();
        let props = DatabaseProps::new(ingress()).with_rotation(None);
        let db = DatabaseUnit::new("Db", &network.handle(), props).unwrap();
        let doc = db.template().to_json();
        assert!(doc["Resources"].get("RdsClusterSecretRotationSchedule").is_none());
        assert!(doc.get("Transform").is_none());
    }

    #[test]
    fn test_ingress_equal_to_network_rejected() {
        let network = network();
        let props = DatabaseProps::new(Ipv4Cidr::new("10.0.0.0/16").unwrap());
        let err = DatabaseUnit::new("RdsStackDemo", &network.handle(), props).unwrap_err();
        assert!(matches!(
            err,
            IacError::Configuration(ConfigurationError::DuplicateAccessRule { ref peer, port: 5432 })
                if peer == "10.0.0.0/16"
        ));
    }

    #[test]
    fn test_allow_from_extends_policy() {
        let network = network();
        let mut db = DatabaseUnit::new("Db", &network.handle(), DatabaseProps::new(ingress())).unwrap();
        db.allow_from(Peer::ipv4(Ipv4Cidr::new("192.0.2.0/24").unwrap()), "bastion");
        assert_eq!(db.cluster().connections().rules().len(), 4);
        assert!(db.template().has_resource("RdsClusterSecurityGroupIngress4"));
    }
}
