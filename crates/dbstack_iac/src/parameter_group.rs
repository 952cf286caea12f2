//! Parameter group lookup.
//!
//! Provider-managed groups (`default.<family>`) can be checked locally.
//! Anything else is assumed to exist and is left to the orchestrator.

use dbstack_core::ConfigurationError;

use crate::engine::DatabaseEngine;

const DEFAULT_PREFIX: &str = "default.";

/// Source of truth for parameter group names known before apply time.
#[cfg_attr(test, mockall::automock)]
pub trait ParameterGroupCatalog {
    /// Whether `name` is usable for the engine's parameter group `family`.
    fn contains(&self, family: &str, name: &str) -> bool;
}

/// Knows the provider-managed default group of each family.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultParameterGroups;

impl ParameterGroupCatalog for DefaultParameterGroups {
    fn contains(&self, family: &str, name: &str) -> bool {
        match name.strip_prefix(DEFAULT_PREFIX) {
            Some(rest) => rest == family,
            None => !name.trim().is_empty(),
        }
    }
}

/// Fail when the catalog does not know `name` for the engine.
pub fn check_parameter_group(
    catalog: &dyn ParameterGroupCatalog,
    engine: &DatabaseEngine,
    name: &str,
) -> Result<(), ConfigurationError> {
    let family = engine.parameter_group_family();
    if catalog.contains(&family, name) {
        Ok(())
    } else {
        Err(ConfigurationError::UnknownParameterGroup {
            name: name.to_string(),
            family,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    #[test]
    fn test_default_groups() {
        let engine = DatabaseEngine::aurora_postgres_11_7();
        let catalog = DefaultParameterGroups;
        assert!(check_parameter_group(&catalog, &engine, "default.aurora-postgresql11").is_ok());
        assert!(check_parameter_group(&catalog, &engine, "my-tuned-group").is_ok());
        assert_eq!(
            check_parameter_group(&catalog, &engine, "default.aurora-postgresql10").unwrap_err(),
            ConfigurationError::UnknownParameterGroup {
                name: "default.aurora-postgresql10".into(),
                family: "aurora-postgresql11".into(),
            }
        );
        assert!(check_parameter_group(&catalog, &engine, "").is_err());
    }

    #[test]
    fn test_catalog_is_consulted_with_family() {
        let mut catalog = MockParameterGroupCatalog::new();
        catalog
            .expect_contains()
            .with(eq("aurora-postgresql11"), eq("custom"))
            .times(1)
            .returning(|_, _| false);

        let engine = DatabaseEngine::aurora_postgres_11_7();
        assert!(check_parameter_group(&catalog, &engine, "custom").is_err());
    }
}
