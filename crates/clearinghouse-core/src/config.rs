//! Configuration for the import pipeline.
//!
//! Loaded from a TOML file whose path is the first CLI argument. Policy
//! parameters live under `[policies]`, keyed by policy id.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Main application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ImportConfig {
    /// General pipeline options.
    #[serde(default)]
    pub options: OptionsConfig,

    /// Policy engine parameters.
    #[serde(default)]
    pub policies: PoliciesConfig,

    /// Target database connection settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ImportConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        toml::from_str(&text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Check whether a policy is disabled by configuration.
    pub fn is_policy_disabled(&self, id: &str) -> bool {
        self.policies.disabled.iter().any(|x| x == id)
    }
}

/// General pipeline options.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OptionsConfig {
    /// Glob patterns of column names excluded from validation and dispatch.
    #[serde(default = "default_ignore_columns")]
    pub ignore_columns: Vec<String>,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            ignore_columns: default_ignore_columns(),
        }
    }
}

/// Policy engine parameters, keyed by policy id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoliciesConfig {
    /// Policy ids that must not run.
    #[serde(default = "default_disabled_policies")]
    pub disabled: Vec<String>,

    /// Default FK values: table name -> { fk column name -> value }.
    #[serde(default)]
    pub update_missing_foreign_key: IndexMap<String, IndexMap<String, i64>>,

    /// Tables synthesized with an identity system_id/public_id mapping when
    /// absent from the submission but referenced by it.
    #[serde(default)]
    pub add_identity_mapping_system_id_to_public_id: Vec<String>,
}

impl Default for PoliciesConfig {
    fn default() -> Self {
        Self {
            disabled: default_disabled_policies(),
            update_missing_foreign_key: IndexMap::new(),
            add_identity_mapping_system_id_to_public_id: Vec::new(),
        }
    }
}

/// Target database connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub dbname: String,

    #[serde(default)]
    pub user: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dbname: String::new(),
            user: String::new(),
        }
    }
}

impl DatabaseConfig {
    /// Connection URI for the target store. The password is taken from the
    /// environment by the driver, never from the config file.
    pub fn uri(&self) -> String {
        format!(
            "postgresql://{}@{}:{}/{}",
            self.user, self.host, self.port, self.dbname
        )
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions
fn default_ignore_columns() -> Vec<String> {
    vec!["date_updated".to_string(), "*_uuid".to_string()]
}

fn default_disabled_policies() -> Vec<String> {
    vec!["set_public_id_to_negative_system_id_for_new_lookups".to_string()]
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = ImportConfig::default();
        assert_eq!(config.options.ignore_columns, vec!["date_updated", "*_uuid"]);
        assert_eq!(config.database.port, 5432);
        assert!(config.is_policy_disabled("set_public_id_to_negative_system_id_for_new_lookups"));
        assert!(!config.is_policy_disabled("drop_ignored_columns"));
    }

    #[test]
    fn test_parse_policy_sections() {
        let text = r#"
            [options]
            ignore_columns = ["date_updated"]

            [policies]
            disabled = []
            add_identity_mapping_system_id_to_public_id = ["tbl_locations"]

            [policies.update_missing_foreign_key.tbl_sample_group_coordinates]
            coordinate_method_dimension_id = 1

            [database]
            host = "db.example.org"
            dbname = "sead"
            user = "clearinghouse"
        "#;
        let config: ImportConfig = toml::from_str(text).unwrap();
        assert_eq!(
            config.policies.add_identity_mapping_system_id_to_public_id,
            vec!["tbl_locations"]
        );
        assert_eq!(
            config
                .policies
                .update_missing_foreign_key
                .get("tbl_sample_group_coordinates")
                .and_then(|m| m.get("coordinate_method_dimension_id")),
            Some(&1)
        );
        assert_eq!(
            config.database.uri(),
            "postgresql://clearinghouse@db.example.org:5432/sead"
        );
        assert!(!config.is_policy_disabled("set_public_id_to_negative_system_id_for_new_lookups"));
    }
}
