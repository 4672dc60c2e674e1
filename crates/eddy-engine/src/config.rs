//! Engine configuration.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Per-call property overrides, as mutated by `SET` and `UNSET`.
pub type PropertyOverrides = HashMap<String, String>;

/// Override key for the default sink partition count.
pub const SINK_PARTITIONS_PROPERTY: &str = "sink.partitions";
/// Override key for the default sink replication factor.
pub const SINK_REPLICAS_PROPERTY: &str = "sink.replicas";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML for [`EngineConfig`].
    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    /// A property has a value of the wrong shape.
    #[error("Invalid value '{value}' for property '{key}'")]
    InvalidValue {
        /// Property key.
        key: String,
        /// Offending value.
        value: String,
    },
}

/// Defaults for topics created by CREATE ... AS SELECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkDefaults {
    /// Partition count.
    pub partitions: u32,
    /// Replication factor.
    pub replicas: u16,
}

impl Default for SinkDefaults {
    fn default() -> Self {
        Self {
            partitions: 4,
            replicas: 1,
        }
    }
}

/// Configuration passed to every statement execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Prefix identifying this engine instance in application ids.
    pub service_id: String,
    /// Application id segment for persistent queries.
    pub persistent_query_prefix: String,
    /// Application id segment for transient queries.
    pub transient_query_prefix: String,
    /// Sink topic defaults.
    pub sink: SinkDefaults,
    /// Properties handed to the query runtime.
    pub properties: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            service_id: "default_".to_string(),
            persistent_query_prefix: "query_".to_string(),
            transient_query_prefix: "transient_".to_string(),
            sink: SinkDefaults::default(),
            properties: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Toml` if the document is invalid.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Loads a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Returns a copy with `overrides` applied.
    ///
    /// `sink.partitions` and `sink.replicas` update [`SinkDefaults`]; every
    /// other key is merged into [`properties`](Self::properties).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a sink override is not a number.
    pub fn with_overrides(&self, overrides: &PropertyOverrides) -> Result<Self, ConfigError> {
        let mut config = self.clone();
        for (key, value) in overrides {
            match key.as_str() {
                SINK_PARTITIONS_PROPERTY => config.sink.partitions = parse_value(key, value)?,
                SINK_REPLICAS_PROPERTY => config.sink.replicas = parse_value(key, value)?,
                _ => {
                    config.properties.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(config)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.service_id, "default_");
        assert_eq!(config.sink.partitions, 4);
        assert_eq!(config.sink.replicas, 1);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            service_id = "pipeline_"

            [sink]
            partitions = 8

            [properties]
            "auto.offset.reset" = "earliest"
            "#,
        )
        .unwrap();
        assert_eq!(config.service_id, "pipeline_");
        assert_eq!(config.persistent_query_prefix, "query_");
        assert_eq!(config.sink.partitions, 8);
        assert_eq!(config.sink.replicas, 1);
        assert_eq!(
            config.properties.get("auto.offset.reset").map(String::as_str),
            Some("earliest")
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "service_id = \"file_\"").unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.service_id, "file_");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_overrides() {
        let mut overrides = PropertyOverrides::new();
        overrides.insert(SINK_PARTITIONS_PROPERTY.to_string(), "2".to_string());
        overrides.insert("commit.interval.ms".to_string(), "100".to_string());

        let config = EngineConfig::default().with_overrides(&overrides).unwrap();
        assert_eq!(config.sink.partitions, 2);
        assert_eq!(
            config.properties.get("commit.interval.ms").map(String::as_str),
            Some("100")
        );

        overrides.insert(SINK_REPLICAS_PROPERTY.to_string(), "x".to_string());
        assert!(matches!(
            EngineConfig::default().with_overrides(&overrides),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
