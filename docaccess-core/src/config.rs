//! Connection configuration loaded with Figment.
//!
//! Sources are merged with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: `DOCACCESS_`, e.g. `DOCACCESS_DATABASE`)
//! 2. An optional TOML file passed to [`StoreConfig::load_from`]
//! 3. Default values
//!
//! Loading never checks reachability; [`StoreConfig::validate`] only rejects descriptors
//! that are empty or malformed.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

use crate::{
    document::{Decoder, UnknownFields},
    error::{DocumentStoreError, DocumentStoreResult},
};

/// Characters a database name may not contain.
const FORBIDDEN_DATABASE_CHARS: [char; 7] = ['/', '\\', '.', '"', '$', ' ', '\0'];

/// Maximum length of a database name in bytes.
const MAX_DATABASE_NAME_LEN: usize = 63;

/// Connection settings for one logical database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Connection string, e.g. `mongodb://localhost:27017`.
    #[serde(default)]
    pub connection_string: String,

    /// Name of the logical database.
    #[serde(default)]
    pub database: String,

    /// Drop stored fields the entity type does not declare instead of failing.
    #[serde(default = "default_ignore_unknown_fields")]
    pub ignore_unknown_fields: bool,

    /// Application name reported to the server.
    #[serde(default)]
    pub app_name: Option<String>,

    /// Upper bound on pooled connections.
    #[serde(default)]
    pub max_pool_size: Option<u32>,

    /// Connection timeout in seconds.
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
}

fn default_ignore_unknown_fields() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            connection_string: String::new(),
            database: String::new(),
            ignore_unknown_fields: default_ignore_unknown_fields(),
            app_name: None,
            max_pool_size: None,
            connect_timeout_secs: None,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration for the given descriptor and database.
    pub fn new(connection_string: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            database: database.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from defaults and `DOCACCESS_` environment variables.
    pub fn load() -> DocumentStoreResult<Self> {
        Self::from_figment(Self::figment())
    }

    /// Loads configuration from defaults, a TOML file, and environment variables.
    ///
    /// A missing file is not an error; its values are simply absent.
    pub fn load_from(path: impl AsRef<Path>) -> DocumentStoreResult<Self> {
        let path = path.as_ref();
        tracing::debug!("Loading store configuration from {}", path.display());

        Self::from_figment(
            Figment::new()
                .merge(Serialized::defaults(StoreConfig::default()))
                .merge(Toml::file(path))
                .merge(Env::prefixed("DOCACCESS_")),
        )
    }

    /// Extracts and validates a configuration from an arbitrary figment.
    pub fn from_figment(figment: Figment) -> DocumentStoreResult<Self> {
        let config: StoreConfig = figment.extract()?;
        config.validate()?;

        Ok(config)
    }

    fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(StoreConfig::default()))
            .merge(Env::prefixed("DOCACCESS_"))
    }

    /// Returns the decoder implied by `ignore_unknown_fields`.
    pub fn decoder(&self) -> Decoder {
        Decoder::new(if self.ignore_unknown_fields {
            UnknownFields::Ignore
        } else {
            UnknownFields::Reject
        })
    }

    /// Returns the connection timeout, if configured.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }

    /// Rejects empty or malformed descriptors.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`] describing the first problem found.
    pub fn validate(&self) -> DocumentStoreResult<()> {
        validate_connection_string(&self.connection_string)?;
        validate_database_name(&self.database)?;

        if self.max_pool_size == Some(0) {
            return Err(DocumentStoreError::Configuration(
                "max_pool_size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Checks that a connection string is non-empty and of the form `scheme://rest`.
pub fn validate_connection_string(connection_string: &str) -> DocumentStoreResult<()> {
    let trimmed = connection_string.trim();
    if trimmed.is_empty() {
        return Err(DocumentStoreError::Configuration(
            "Connection string is empty".to_string(),
        ));
    }

    match trimmed.split_once("://") {
        Some((scheme, rest))
            if !scheme.is_empty()
                && !rest.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.') =>
        {
            Ok(())
        }
        _ => Err(DocumentStoreError::Configuration(
            "Connection string must look like 'scheme://host'".to_string(),
        )),
    }
}

/// Checks that a database name is non-empty and uses only permitted characters.
pub fn validate_database_name(database: &str) -> DocumentStoreResult<()> {
    if database.is_empty() {
        return Err(DocumentStoreError::Configuration(
            "Database name is empty. A database name is required to access a database".to_string(),
        ));
    }
    if database.len() > MAX_DATABASE_NAME_LEN {
        return Err(DocumentStoreError::Configuration(format!(
            "Database name '{}' exceeds {} bytes",
            database, MAX_DATABASE_NAME_LEN
        )));
    }
    if let Some(c) = database.chars().find(|c| FORBIDDEN_DATABASE_CHARS.contains(c)) {
        return Err(DocumentStoreError::Configuration(format!(
            "Database name '{}' contains forbidden character {:?}",
            database, c
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_config_passes() {
        let config = StoreConfig::new("mongodb://localhost:27017", "app");

        assert!(config.validate().is_ok());
        assert!(config.ignore_unknown_fields);
    }

    #[test]
    fn empty_descriptor_is_a_configuration_error() {
        let err = StoreConfig::new("", "app").validate().unwrap_err();

        assert!(matches!(err, DocumentStoreError::Configuration(_)));
    }

    #[test]
    fn malformed_descriptor_is_rejected() {
        assert!(validate_connection_string("localhost:27017").is_err());
        assert!(validate_connection_string("://localhost").is_err());
        assert!(validate_connection_string("mongodb://").is_err());
        assert!(validate_connection_string("mongodb+srv://cluster.example.net").is_ok());
        assert!(validate_connection_string("memory://local").is_ok());
    }

    #[test]
    fn database_names_follow_store_rules() {
        assert!(validate_database_name("").is_err());
        assert!(validate_database_name("my.db").is_err());
        assert!(validate_database_name("my db").is_err());
        assert!(validate_database_name(&"x".repeat(64)).is_err());
        assert!(validate_database_name("inventory_2024").is_ok());
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let config = StoreConfig {
            max_pool_size: Some(0),
            ..StoreConfig::new("mongodb://localhost", "app")
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn figment_merges_toml_over_defaults() {
        let config = StoreConfig::from_figment(
            Figment::new()
                .merge(Serialized::defaults(StoreConfig::default()))
                .merge(Toml::string(
                    r#"
                    connection_string = "mongodb://db:27017"
                    database = "orders"
                    ignore_unknown_fields = false
                    max_pool_size = 20
                    "#,
                )),
        )
        .unwrap();

        assert_eq!(config.database, "orders");
        assert_eq!(config.max_pool_size, Some(20));
        assert_eq!(config.decoder(), Decoder::strict());
    }

    #[test]
    fn figment_without_database_fails_validation() {
        let result = StoreConfig::from_figment(
            Figment::new()
                .merge(Serialized::defaults(StoreConfig::default()))
                .merge(Toml::string(r#"connection_string = "mongodb://db:27017""#)),
        );

        assert!(matches!(result, Err(DocumentStoreError::Configuration(_))));
    }
}
