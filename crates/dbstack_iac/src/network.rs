//! Network unit: an isolated virtual network and its subnet topology.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use dbstack_core::{ConfigurationError, Ipv4Cidr};

use crate::engine::SubnetType;
use crate::error::IacResult;
use crate::template::{get_att, import_value, reference, Export, Template};
use crate::unit::{DeclaredUnit, UnitKind};

pub const VPC_LOGICAL_ID: &str = "Vpc";
const IGW_LOGICAL_ID: &str = "VpcIgw";
const IGW_ATTACHMENT_LOGICAL_ID: &str = "VpcIgwAttachment";
const MAX_AZS: u32 = 6;

/// A group of equally sized subnets, one per availability zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetGroup {
    pub name: String,
    pub subnet_type: SubnetType,
    pub cidr_mask: u8,
}

impl SubnetGroup {
    pub fn public(name: impl Into<String>, cidr_mask: u8) -> Self {
        Self {
            name: name.into(),
            subnet_type: SubnetType::Public,
            cidr_mask,
        }
    }

    pub fn private(name: impl Into<String>, cidr_mask: u8) -> Self {
        Self {
            name: name.into(),
            subnet_type: SubnetType::Private,
            cidr_mask,
        }
    }
}

/// Network unit inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkProps {
    pub cidr: Ipv4Cidr,
    pub max_azs: u32,
    pub subnet_groups: Vec<SubnetGroup>,
    pub nat_gateways: u32,
}

impl Default for NetworkProps {
    fn default() -> Self {
        Self {
            cidr: Ipv4Cidr::clamped(Ipv4Addr::new(10, 0, 0, 0), 16),
            max_azs: 2,
            subnet_groups: vec![
                SubnetGroup::public("Public", 24),
                SubnetGroup::private("Private", 24),
            ],
            nat_gateways: 1,
        }
    }
}

impl NetworkProps {
    pub fn with_cidr(mut self, cidr: Ipv4Cidr) -> Self {
        self.cidr = cidr;
        self
    }

    pub fn with_max_azs(mut self, max_azs: u32) -> Self {
        self.max_azs = max_azs;
        self
    }

    pub fn with_subnet_groups(mut self, groups: Vec<SubnetGroup>) -> Self {
        self.subnet_groups = groups;
        self
    }

    pub fn with_nat_gateways(mut self, count: u32) -> Self {
        self.nat_gateways = count;
        self
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.cidr.is_canonical() {
            return Err(ConfigurationError::invalid_setting(
                "network.cidr",
                format!("{} has host bits set", self.cidr),
            ));
        }
        if !(16..=28).contains(&self.cidr.prefix()) {
            return Err(ConfigurationError::invalid_setting(
                "network.cidr",
                format!("prefix /{} must be between /16 and /28", self.cidr.prefix()),
            ));
        }
        if self.max_azs == 0 || self.max_azs > MAX_AZS {
            return Err(ConfigurationError::invalid_setting(
                "network.max_azs",
                format!("must be between 1 and {}", MAX_AZS),
            ));
        }
        if self.subnet_groups.is_empty() {
            return Err(ConfigurationError::invalid_setting(
                "network.subnet_groups",
                "at least one subnet group is required",
            ));
        }

        let name_pattern = Regex::new(r"^[A-Za-z][A-Za-z0-9]*$")
            .map_err(|e| ConfigurationError::invalid_setting("network.subnet_groups", e.to_string()))?;
        let mut seen = BTreeSet::new();
        for group in &self.subnet_groups {
            if !name_pattern.is_match(&group.name) || !seen.insert(group.name.as_str()) {
                return Err(ConfigurationError::invalid_setting(
                    "network.subnet_groups",
                    format!("subnet group name '{}' is invalid or duplicated", group.name),
                ));
            }
            if group.cidr_mask <= self.cidr.prefix() || group.cidr_mask > 28 {
                return Err(ConfigurationError::invalid_setting(
                    "network.subnet_groups",
                    format!(
                        "mask /{} of group {} must be longer than /{} and at most /28",
                        group.cidr_mask,
                        group.name,
                        self.cidr.prefix()
                    ),
                ));
            }
        }

        let has_public = self.has_group(SubnetType::Public);
        if self.has_group(SubnetType::Private) && (!has_public || self.nat_gateways == 0) {
            return Err(ConfigurationError::invalid_setting(
                "network.nat_gateways",
                "private subnets need at least one NAT gateway in a public subnet",
            ));
        }

        Ok(())
    }

    fn has_group(&self, subnet_type: SubnetType) -> bool {
        self.subnet_groups.iter().any(|g| g.subnet_type == subnet_type)
    }
}

/// One allocated subnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub logical_id: String,
    pub group: String,
    pub subnet_type: SubnetType,
    pub availability_zone: String,
    pub cidr: Ipv4Cidr,
}

/// Declared virtual network.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkUnit {
    id: String,
    region: String,
    props: NetworkProps,
    availability_zones: Vec<String>,
    subnets: Vec<Subnet>,
    nat_subnets: Vec<String>,
}

impl NetworkUnit {
    pub fn new(id: impl Into<String>, region: &str, props: NetworkProps) -> IacResult<Self> {
        let id = id.into();
        props.validate()?;

        let availability_zones: Vec<String> = ('a'..='z')
            .take(props.max_azs as usize)
            .map(|letter| format!("{}{}", region, letter))
            .collect();

        let subnets = allocate_subnets(&props, &availability_zones)?;

        let nat_subnets: Vec<String> = subnets
            .iter()
            .filter(|s| s.subnet_type == SubnetType::Public)
            .take(props.nat_gateways as usize)
            .map(|s| s.logical_id.clone())
            .collect();
        let nat_subnets = if props.has_group(SubnetType::Private) {
            nat_subnets
        } else {
            Vec::new()
        };

        info!(
            "Declared network {} ({}) with {} subnets across {} AZs",
            id,
            props.cidr,
            subnets.len(),
            availability_zones.len()
        );

        Ok(Self {
            id,
            region: region.to_string(),
            props,
            availability_zones,
            subnets,
            nat_subnets,
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn cidr_block(&self) -> Ipv4Cidr {
        self.props.cidr
    }

    pub fn availability_zones(&self) -> &[String] {
        &self.availability_zones
    }

    pub fn subnets(&self) -> &[Subnet] {
        &self.subnets
    }

    /// Number of NAT gateways actually placed.
    pub fn nat_gateway_count(&self) -> usize {
        self.nat_subnets.len()
    }

    /// Borrowed handle for downstream units.
    pub fn handle(&self) -> NetworkHandle<'_> {
        NetworkHandle { unit: self }
    }

    /// Export name for a value published by this network.
    pub fn export_name(&self, output: &str) -> String {
        format!("{}-{}", self.id, output)
    }

    fn has_public(&self) -> bool {
        self.subnets.iter().any(|s| s.subnet_type == SubnetType::Public)
    }
}

impl DeclaredUnit for NetworkUnit {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> UnitKind {
        UnitKind::Network
    }

    fn template(&self) -> Template {
        let mut template = Template::new(format!("Network unit {}", self.id));

        template.resource(
            VPC_LOGICAL_ID,
            "AWS::EC2::VPC",
            json!({
                "CidrBlock": self.props.cidr.to_string(),
                "EnableDnsHostnames": true,
                "EnableDnsSupport": true,
                "Tags": [{ "Key": "Name", "Value": format!("{}/{}", self.id, VPC_LOGICAL_ID) }],
            }),
        );

        if self.has_public() {
            template.resource(
                IGW_LOGICAL_ID,
                "AWS::EC2::InternetGateway",
                json!({ "Tags": [{ "Key": "Name", "Value": format!("{}/{}", self.id, VPC_LOGICAL_ID) }] }),
            );
            template.resource(
                IGW_ATTACHMENT_LOGICAL_ID,
                "AWS::EC2::VPCGatewayAttachment",
                json!({
                    "VpcId": reference(VPC_LOGICAL_ID),
                    "InternetGatewayId": reference(IGW_LOGICAL_ID),
                }),
            );
        }

        for subnet in &self.subnets {
            let lid = &subnet.logical_id;
            let route_table = format!("{}RouteTable", lid);
            let route = format!("{}DefaultRoute", lid);

            template.resource(
                lid,
                "AWS::EC2::Subnet",
                json!({
                    "VpcId": reference(VPC_LOGICAL_ID),
                    "CidrBlock": subnet.cidr.to_string(),
                    "AvailabilityZone": subnet.availability_zone,
                    "MapPublicIpOnLaunch": subnet.subnet_type == SubnetType::Public,
                    "Tags": [
                        { "Key": "Name", "Value": format!("{}/{}", self.id, lid) },
                        { "Key": "SubnetType", "Value": subnet.subnet_type.as_str() },
                    ],
                }),
            );
            template.resource(
                &route_table,
                "AWS::EC2::RouteTable",
                json!({ "VpcId": reference(VPC_LOGICAL_ID) }),
            );
            template.resource(
                &format!("{}RouteTableAssociation", lid),
                "AWS::EC2::SubnetRouteTableAssociation",
                json!({
                    "RouteTableId": reference(&route_table),
                    "SubnetId": reference(lid),
                }),
            );

            match subnet.subnet_type {
                SubnetType::Public => {
                    template.resource(
                        &route,
                        "AWS::EC2::Route",
                        json!({
                            "RouteTableId": reference(&route_table),
                            "DestinationCidrBlock": Ipv4Cidr::any().to_string(),
                            "GatewayId": reference(IGW_LOGICAL_ID),
                        }),
                    );
                    template.depends_on(&route, IGW_ATTACHMENT_LOGICAL_ID);
                }
                SubnetType::Private => {
                    if let Some(nat) = self.nat_for(subnet) {
                        template.resource(
                            &route,
                            "AWS::EC2::Route",
                            json!({
                                "RouteTableId": reference(&route_table),
                                "DestinationCidrBlock": Ipv4Cidr::any().to_string(),
                                "NatGatewayId": reference(&format!("{}NatGateway", nat)),
                            }),
                        );
                    }
                }
            }
        }

        for lid in &self.nat_subnets {
            let eip = format!("{}Eip", lid);
            template.resource(&eip, "AWS::EC2::EIP", json!({ "Domain": "vpc" }));
            template.resource(
                &format!("{}NatGateway", lid),
                "AWS::EC2::NatGateway",
                json!({
                    "AllocationId": get_att(&eip, "AllocationId"),
                    "SubnetId": reference(lid),
                }),
            );
        }

        for export in self.exports() {
            template.output(&export);
        }

        template
    }

    fn exports(&self) -> Vec<Export> {
        let mut exports = vec![
            Export::new("VpcId", self.export_name("VpcId"), reference(VPC_LOGICAL_ID))
                .with_description("Virtual network id"),
            Export::new(
                "VpcCidrBlock",
                self.export_name("VpcCidrBlock"),
                get_att(VPC_LOGICAL_ID, "CidrBlock"),
            ),
        ];
        for subnet in &self.subnets {
            let output = format!("{}Id", subnet.logical_id);
            exports.push(Export::new(
                output.clone(),
                self.export_name(&output),
                reference(&subnet.logical_id),
            ));
        }
        exports
    }
}

impl NetworkUnit {
    fn nat_for(&self, subnet: &Subnet) -> Option<&str> {
        if self.nat_subnets.is_empty() {
            return None;
        }
        let index = self
            .availability_zones
            .iter()
            .position(|az| *az == subnet.availability_zone)
            .unwrap_or(0);
        self.nat_subnets
            .get(index % self.nat_subnets.len())
            .map(|s| s.as_str())
    }
}

/// Carve each group's subnets out of the network block, group by group,
/// one per AZ, each aligned to its own size.
fn allocate_subnets(props: &NetworkProps, azs: &[String]) -> Result<Vec<Subnet>, ConfigurationError> {
    let mut subnets = Vec::new();
    let mut cursor: u64 = 0;

    for group in &props.subnet_groups {
        let block = 1u64 << (32 - u32::from(group.cidr_mask));
        for (i, az) in azs.iter().enumerate() {
            let aligned = cursor.div_ceil(block) * block;
            let index = u32::try_from(aligned / block).map_err(|_| ConfigurationError::AddressSpaceExhausted {
                cidr: props.cidr.to_string(),
                mask: group.cidr_mask,
            })?;
            let cidr = props
                .cidr
                .subnet(group.cidr_mask, index)
                .ok_or_else(|| ConfigurationError::AddressSpaceExhausted {
                    cidr: props.cidr.to_string(),
                    mask: group.cidr_mask,
                })?;

            let logical_id = format!("{}Subnet{}", group.name, i + 1);
            debug!("Allocated {} {} in {}", logical_id, cidr, az);

            subnets.push(Subnet {
                logical_id,
                group: group.name.clone(),
                subnet_type: group.subnet_type,
                availability_zone: az.clone(),
                cidr,
            });
            cursor = aligned + block;
        }
    }

    Ok(subnets)
}

/// Borrowed view of a declared network, as consumed by downstream units.
#[derive(Debug, Clone, Copy)]
pub struct NetworkHandle<'a> {
    unit: &'a NetworkUnit,
}

impl<'a> NetworkHandle<'a> {
    pub fn id(&self) -> &'a str {
        &self.unit.id
    }

    pub fn cidr_block(&self) -> Ipv4Cidr {
        self.unit.props.cidr
    }

    /// Subnets of the given classification, failing when there are none.
    pub fn select_subnets(&self, subnet_type: SubnetType) -> Result<Vec<&'a Subnet>, ConfigurationError> {
        let selected: Vec<&Subnet> = self
            .unit
            .subnets
            .iter()
            .filter(|s| s.subnet_type == subnet_type)
            .collect();

        if selected.is_empty() {
            return Err(ConfigurationError::SubnetTypeUnavailable {
                network: self.unit.id.clone(),
                subnet_type: subnet_type.to_string(),
            });
        }
        Ok(selected)
    }

    /// Cross-unit reference to the network id.
    pub fn vpc_id(&self) -> Value {
        import_value(&self.unit.export_name("VpcId"))
    }

    /// Cross-unit reference to a subnet id.
    pub fn subnet_id(&self, subnet: &Subnet) -> Value {
        import_value(&self.unit.export_name(&format!("{}Id", subnet.logical_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_network() -> NetworkUnit {
        NetworkUnit::new("VpcStackDemo", "ap-northeast-2", NetworkProps::default()).unwrap()
    }

    #[test]
    fn test_default_allocation() {
        let network = demo_network();
        let cidrs: Vec<String> = network.subnets().iter().map(|s| s.cidr.to_string()).collect();
        assert_eq!(cidrs, vec!["10.0.0.0/24", "10.0.1.0/24", "10.0.2.0/24", "10.0.3.0/24"]);
        assert_eq!(network.availability_zones(), ["ap-northeast-2a", "ap-northeast-2b"]);
        assert_eq!(network.subnets()[0].logical_id, "PublicSubnet1");
        assert_eq!(network.subnets()[3].logical_id, "PrivateSubnet2");
        assert_eq!(network.nat_gateway_count(), 1);
    }

    #[test]
    fn test_mixed_masks_are_aligned() {
        let props = NetworkProps::default().with_subnet_groups(vec![
            SubnetGroup::public("Public", 26),
            SubnetGroup::private("Private", 24),
        ]);
        let network = NetworkUnit::new("Net", "us-east-1", props).unwrap();
        let cidrs: Vec<String> = network.subnets().iter().map(|s| s.cidr.to_string()).collect();
        assert_eq!(cidrs, vec!["10.0.0.0/26", "10.0.0.64/26", "10.0.1.0/24", "10.0.2.0/24"]);
    }

    #[test]
    fn test_address_space_exhausted() {
        let props = NetworkProps::default()
            .with_cidr(Ipv4Cidr::new("10.0.0.0/24").unwrap())
            .with_subnet_groups(vec![SubnetGroup::public("Public", 25)])
            .with_max_azs(3);
        let err = NetworkUnit::new("Net", "us-east-1", props).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_private_without_nat_rejected() {
        let props = NetworkProps::default().with_nat_gateways(0);
        assert!(NetworkUnit::new("Net", "us-east-1", props).is_err());

        let props = NetworkProps::default()
            .with_subnet_groups(vec![SubnetGroup::private("Isolated", 24)]);
        assert!(NetworkUnit::new("Net", "us-east-1", props).is_err());
    }

    #[test]
    fn test_invalid_props() {
        let host_bits = NetworkProps::default().with_cidr(Ipv4Cidr::new("10.0.0.1/16").unwrap());
        assert!(NetworkUnit::new("Net", "us-east-1", host_bits).is_err());

        let no_azs = NetworkProps::default().with_max_azs(0);
        assert!(NetworkUnit::new("Net", "us-east-1", no_azs).is_err());

        let dup = NetworkProps::default().with_subnet_groups(vec![
            SubnetGroup::public("Public", 24),
            SubnetGroup::public("Public", 24),
        ]);
        assert!(NetworkUnit::new("Net", "us-east-1", dup).is_err());
    }

    #[test]
    fn test_handle_selects_subnets() {
        let network = demo_network();
        let handle = network.handle();
        let public = handle.select_subnets(SubnetType::Public).unwrap();
        assert_eq!(public.len(), 2);
        assert_eq!(handle.cidr_block().to_string(), "10.0.0.0/16");
        assert_eq!(
            handle.subnet_id(public[0]),
            json!({ "Fn::ImportValue": "VpcStackDemo-PublicSubnet1Id" })
        );
    }

    #[test]
    fn test_missing_subnet_type() {
        let props = NetworkProps::default()
            .with_subnet_groups(vec![SubnetGroup::public("Public", 24)]);
        let network = NetworkUnit::new("Net", "us-east-1", props).unwrap();
        assert_eq!(
            network.handle().select_subnets(SubnetType::Private).unwrap_err(),
            ConfigurationError::SubnetTypeUnavailable {
                network: "Net".into(),
                subnet_type: "private".into(),
            }
        );
        assert_eq!(network.nat_gateway_count(), 0);
    }

    #[test]
    fn test_template_routes() {
        let doc = demo_network().template().to_json();
        let resources = &doc["Resources"];
        assert_eq!(resources["Vpc"]["Properties"]["CidrBlock"], "10.0.0.0/16");
        assert_eq!(
            resources["PublicSubnet1DefaultRoute"]["Properties"]["GatewayId"]["Ref"],
            "VpcIgw"
        );
        assert_eq!(
            resources["PrivateSubnet2DefaultRoute"]["Properties"]["NatGatewayId"]["Ref"],
            "PublicSubnet1NatGateway"
        );
        assert!(resources.get("PublicSubnet2NatGateway").is_none());
        assert_eq!(doc["Outputs"]["VpcId"]["Export"]["Name"], "VpcStackDemo-VpcId");
        assert_eq!(
            doc["Outputs"]["PrivateSubnet1Id"]["Export"]["Name"],
            "VpcStackDemo-PrivateSubnet1Id"
        );
    }
}
