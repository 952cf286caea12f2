//! Database engine, instance and subnet definitions.

use serde::{Deserialize, Serialize};

/// Managed relational engine families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineFamily {
    AuroraPostgresql,
    AuroraMysql,
}

impl EngineFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineFamily::AuroraPostgresql => "aurora-postgresql",
            EngineFamily::AuroraMysql => "aurora-mysql",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "aurora-postgresql" | "postgres" | "postgresql" => Some(EngineFamily::AuroraPostgresql),
            "aurora-mysql" | "mysql" => Some(EngineFamily::AuroraMysql),
            _ => None,
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            EngineFamily::AuroraPostgresql => 5432,
            EngineFamily::AuroraMysql => 3306,
        }
    }

    /// Hosted single-user rotation application for this family.
    pub fn single_user_rotation(&self) -> &'static str {
        match self {
            EngineFamily::AuroraPostgresql => "PostgreSQLSingleUser",
            EngineFamily::AuroraMysql => "MySQLSingleUser",
        }
    }
}

impl std::fmt::Display for EngineFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Engine family plus full version string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatabaseEngine {
    pub family: EngineFamily,
    pub version: String,
}

impl DatabaseEngine {
    pub fn aurora_postgres(version: impl Into<String>) -> Self {
        Self {
            family: EngineFamily::AuroraPostgresql,
            version: version.into(),
        }
    }

    pub fn aurora_mysql(version: impl Into<String>) -> Self {
        Self {
            family: EngineFamily::AuroraMysql,
            version: version.into(),
        }
    }

    /// Aurora PostgreSQL 11.7.
    pub fn aurora_postgres_11_7() -> Self {
        Self::aurora_postgres("11.7")
    }

    /// Parameter group family, e.g. `aurora-postgresql11` or `aurora-mysql5.7`.
    pub fn parameter_group_family(&self) -> String {
        let mut parts = self.version.split('.');
        let major = parts.next().unwrap_or_default();
        match self.family {
            EngineFamily::AuroraPostgresql => format!("{}{}", self.family.as_str(), major),
            EngineFamily::AuroraMysql => {
                let minor = parts.next().unwrap_or("0");
                format!("{}{}.{}", self.family.as_str(), major, minor)
            }
        }
    }

    /// Name of the provider-managed default parameter group.
    pub fn default_parameter_group(&self) -> String {
        format!("default.{}", self.parameter_group_family())
    }
}

impl Default for DatabaseEngine {
    fn default() -> Self {
        Self::aurora_postgres_11_7()
    }
}

/// Instance class (hardware generation/family).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceClass {
    T3,
    R5,
    R6g,
}

impl InstanceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceClass::T3 => "t3",
            InstanceClass::R5 => "r5",
            InstanceClass::R6g => "r6g",
        }
    }
}

/// Instance size within a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceSize {
    Medium,
    Large,
    Xlarge,
    Xlarge2,
}

impl InstanceSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceSize::Medium => "medium",
            InstanceSize::Large => "large",
            InstanceSize::Xlarge => "xlarge",
            InstanceSize::Xlarge2 => "2xlarge",
        }
    }
}

/// Database instance type, rendered as `db.<class>.<size>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceType {
    pub class: InstanceClass,
    pub size: InstanceSize,
}

impl InstanceType {
    pub fn of(class: InstanceClass, size: InstanceSize) -> Self {
        Self { class, size }
    }

    pub fn db_instance_class(&self) -> String {
        format!("db.{}.{}", self.class.as_str(), self.size.as_str())
    }
}

impl Default for InstanceType {
    fn default() -> Self {
        Self::of(InstanceClass::R5, InstanceSize::Large)
    }
}

impl std::fmt::Display for InstanceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.db_instance_class())
    }
}

/// Subnet classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubnetType {
    Public,
    Private,
}

impl SubnetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubnetType::Public => "public",
            SubnetType::Private => "private",
        }
    }
}

impl std::fmt::Display for SubnetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
