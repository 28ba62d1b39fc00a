//! # World Configuration
//!
//! Sizing knobs for a [`World`](crate::World). Loaded once at startup from
//! an external TOML file, or built from one of the presets.
//!
//! ```toml
//! entity_segment_size = 4096
//! filter_initial_capacity = 256
//! max_entities = 1000000
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::{EcsError, EcsResult};

/// Configuration for a world.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldConfig {
    /// Entity records are reserved in steps of this many slots.
    pub entity_segment_size: usize,
    /// Initial capacity of filter member and projection arrays.
    pub filter_initial_capacity: usize,
    /// Hard cap on simultaneously alive entities.
    pub max_entities: Option<usize>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            entity_segment_size: 1024,
            filter_initial_capacity: 64,
            max_entities: None,
        }
    }
}

impl WorldConfig {
    /// Small footprint for tools and tests.
    #[must_use]
    pub const fn compact() -> Self {
        Self {
            entity_segment_size: 64,
            filter_initial_capacity: 8,
            max_entities: None,
        }
    }

    /// Server-sized reservations, avoids regrowth during play.
    #[must_use]
    pub const fn production() -> Self {
        Self {
            entity_segment_size: 16_384,
            filter_initial_capacity: 1024,
            max_entities: None,
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` on malformed TOML or zero-sized fields.
    pub fn from_toml_str(source: &str) -> EcsResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| EcsError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> EcsResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| EcsError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Checks that every size is usable.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the offending field.
    pub fn validate(&self) -> EcsResult<()> {
        if self.entity_segment_size == 0 {
            return Err(EcsError::InvalidConfig(
                "entity_segment_size must be greater than zero".to_string(),
            ));
        }
        if self.filter_initial_capacity == 0 {
            return Err(EcsError::InvalidConfig(
                "filter_initial_capacity must be greater than zero".to_string(),
            ));
        }
        if self.max_entities == Some(0) {
            return Err(EcsError::InvalidConfig(
                "max_entities must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = WorldConfig::from_toml_str("").unwrap();
        assert_eq!(config, WorldConfig::default());
    }

    #[test]
    fn test_config_partial_override() {
        let config = WorldConfig::from_toml_str("max_entities = 10").unwrap();
        assert_eq!(config.max_entities, Some(10));
        assert_eq!(config.entity_segment_size, 1024);
    }

    #[test]
    fn test_config_rejects_zero_sizes() {
        let err = WorldConfig::from_toml_str("entity_segment_size = 0").unwrap_err();
        assert!(matches!(err, EcsError::InvalidConfig(_)));

        let err = WorldConfig::from_toml_str("max_entities = 0").unwrap_err();
        assert!(matches!(err, EcsError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_rejects_unknown_fields() {
        assert!(WorldConfig::from_toml_str("segment = 4").is_err());
    }

    #[test]
    fn test_config_missing_file() {
        let err = WorldConfig::load("/nonexistent/world.toml").unwrap_err();
        assert!(matches!(err, EcsError::InvalidConfig(_)));
    }
}
