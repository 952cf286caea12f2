//! IPv4 address range value object.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// IPv4 address range in CIDR notation (e.g. `10.0.0.0/16`).
///
/// Invariants:
/// - the prefix length is always present and within 0-32
/// - the textual form round-trips through [`Display`](fmt::Display)
///
/// Host bits are allowed (`39.115.51.138/32` and `10.0.0.5/16` both parse);
/// use [`Ipv4Cidr::is_canonical`] where a network address is required.
///
/// ```rust
/// use dbstack_core::Ipv4Cidr;
///
/// let cidr: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
/// assert_eq!(cidr.prefix(), 16);
/// assert_eq!(cidr.subnet(24, 1).unwrap().to_string(), "10.0.1.0/24");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Cidr {
    address: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    /// Parse CIDR notation. A bare address without `/prefix` is rejected.
    pub fn new(cidr: impl AsRef<str>) -> Result<Self, ConfigurationError> {
        let cidr = cidr.as_ref().trim();

        let (addr_str, prefix_str) = cidr
            .split_once('/')
            .ok_or_else(|| ConfigurationError::InvalidCidr(cidr.to_string()))?;

        let address = Ipv4Addr::from_str(addr_str)
            .map_err(|_| ConfigurationError::InvalidCidr(cidr.to_string()))?;

        let prefix = prefix_str
            .parse::<u8>()
            .map_err(|_| ConfigurationError::InvalidCidr(cidr.to_string()))?;

        Self::from_parts(address, prefix)
    }

    pub fn from_parts(address: Ipv4Addr, prefix: u8) -> Result<Self, ConfigurationError> {
        if prefix > 32 {
            return Err(ConfigurationError::InvalidPrefixLength(prefix));
        }
        Ok(Self { address, prefix })
    }

    /// Build from parts, capping the prefix at 32.
    pub fn clamped(address: Ipv4Addr, prefix: u8) -> Self {
        Self {
            address,
            prefix: prefix.min(32),
        }
    }

    /// The whole IPv4 space, `0.0.0.0/0`.
    pub fn any() -> Self {
        Self {
            address: Ipv4Addr::UNSPECIFIED,
            prefix: 0,
        }
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    fn mask(&self) -> u32 {
        match self.prefix {
            0 => 0,
            p => u32::MAX << (32 - p),
        }
    }

    /// Network address with host bits cleared.
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.address) & self.mask())
    }

    /// True when no host bits are set.
    pub fn is_canonical(&self) -> bool {
        self.network() == self.address
    }

    /// Number of addresses covered by the range.
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix))
    }

    /// Whether `other` lies entirely inside this range.
    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        other.prefix >= self.prefix
            && (u32::from(other.address) & self.mask()) == u32::from(self.network())
    }

    /// The `index`-th aligned block of size `/new_prefix` inside this range.
    ///
    /// Returns `None` when `new_prefix` is not longer than the current prefix
    /// or the index runs past the end of the range.
    pub fn subnet(&self, new_prefix: u8, index: u32) -> Option<Ipv4Cidr> {
        if new_prefix <= self.prefix || new_prefix > 32 {
            return None;
        }
        let bits = u32::from(new_prefix - self.prefix);
        if bits < 32 && u64::from(index) >= (1u64 << bits) {
            return None;
        }
        let step = 1u64 << (32 - u32::from(new_prefix));
        let start = u64::from(u32::from(self.network())) + u64::from(index) * step;
        let start = u32::try_from(start).ok()?;
        Some(Ipv4Cidr {
            address: Ipv4Addr::from(start),
            prefix: new_prefix,
        })
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Ipv4Cidr {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Ipv4Cidr> for String {
    fn from(value: Ipv4Cidr) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_range() {
        let cidr = Ipv4Cidr::new("39.115.51.138/32").unwrap();
        assert_eq!(cidr.address(), Ipv4Addr::new(39, 115, 51, 138));
        assert_eq!(cidr.prefix(), 32);
        assert!(cidr.is_canonical());
        assert_eq!(cidr.size(), 1);
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(matches!(
            Ipv4Cidr::new("39.115.51.138"),
            Err(ConfigurationError::InvalidCidr(_))
        ));
        assert!(matches!(
            Ipv4Cidr::new("300.1.1.1/8"),
            Err(ConfigurationError::InvalidCidr(_))
        ));
        assert!(matches!(
            Ipv4Cidr::new("10.0.0.0/33"),
            Err(ConfigurationError::InvalidPrefixLength(33))
        ));
        assert!(Ipv4Cidr::new("").is_err());
    }

    #[test]
    fn test_non_canonical() {
        let cidr = Ipv4Cidr::new("10.0.0.5/16").unwrap();
        assert!(!cidr.is_canonical());
        assert_eq!(cidr.network(), Ipv4Addr::new(10, 0, 0, 0));
    }

    #[test]
    fn test_subnet_allocation() {
        let vpc = Ipv4Cidr::new("10.0.0.0/16").unwrap();
        assert_eq!(vpc.subnet(24, 0).unwrap().to_string(), "10.0.0.0/24");
        assert_eq!(vpc.subnet(24, 3).unwrap().to_string(), "10.0.3.0/24");
        assert_eq!(vpc.subnet(18, 3).unwrap().to_string(), "10.0.192.0/18");
        assert!(vpc.subnet(18, 4).is_none());
        assert!(vpc.subnet(16, 0).is_none());
    }

    #[test]
    fn test_contains() {
        let vpc = Ipv4Cidr::new("10.0.0.0/16").unwrap();
        assert!(vpc.contains(&Ipv4Cidr::new("10.0.4.0/24").unwrap()));
        assert!(!vpc.contains(&Ipv4Cidr::new("10.1.0.0/24").unwrap()));
        assert!(!vpc.contains(&Ipv4Cidr::new("10.0.0.0/8").unwrap()));
        assert!(Ipv4Cidr::any().contains(&vpc));
    }

    #[test]
    fn test_serde_as_string() {
        let cidr: Ipv4Cidr = serde_yaml::from_str("\"10.0.0.0/16\"").unwrap();
        assert_eq!(cidr.to_string(), "10.0.0.0/16");
        assert!(serde_yaml::from_str::<Ipv4Cidr>("\"nope\"").is_err());
    }
}
