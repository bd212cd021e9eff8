//! Application configuration module
//!
//! Loads settings from an optional `schemadrift.toml`, `SCHEMADRIFT__*`
//! environment variables and a `.env` file, and resolves which connection
//! and schema source a run targets.

use crate::diff::{Dialect, DEFAULT_MIGRATIONS_TABLE};
use crate::error::{config_error, DriftError, DriftResult};
use crate::migration::DEFAULT_LINE_LENGTH;
use ::config::builder::DefaultState;
use ::config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use validator::Validate;

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "schemadrift";

const ENV_PREFIX: &str = "SCHEMADRIFT";

/// Name used for the implicit connection and entity manager
pub const DEFAULT_NAME: &str = "default";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl From<ConfigError> for DriftError {
    fn from(err: ConfigError) -> Self {
        DriftError::Configuration(err.to_string())
    }
}

/// A database connection the migrations are generated for
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ConnectionConfig {
    #[validate(url)]
    pub url: String,
    /// Overrides the dialect derived from the URL scheme
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub shards: Vec<String>,
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            platform: None,
            shards: Vec::new(),
        }
    }

    pub fn dialect(&self) -> DriftResult<Dialect> {
        if let Some(ref platform) = self.platform {
            return platform.parse();
        }

        let parsed = url::Url::parse(&self.url)
            .map_err(|e| config_error(format!("Invalid connection URL '{}': {}", self.url, e)))?;
        parsed.scheme().parse()
    }
}

/// Where the desired schema of one entity manager comes from
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityManagerConfig {
    #[serde(default)]
    pub connection: Option<String>,
    #[serde(default)]
    pub schema_file: Option<PathBuf>,
    #[serde(default)]
    pub filter_expression: Option<String>,
}

/// Complete application settings
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Settings {
    pub migrations_dir: PathBuf,
    #[validate(length(min = 1, max = 128))]
    pub migrations_table: String,
    #[serde(default)]
    pub filter_expression: Option<String>,
    #[validate(range(min = 40, max = 1000))]
    pub line_length: usize,
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionConfig>,
    #[serde(default)]
    pub entity_managers: BTreeMap<String, EntityManagerConfig>,
}

/// Connection, dialect and schema source selected for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub connection: String,
    pub dialect: Dialect,
    pub shard: Option<String>,
    pub schema_file: Option<PathBuf>,
    pub filter_expression: Option<String>,
}

impl Settings {
    /// Load settings from `path` (or `./schemadrift.toml` if present) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();

        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let builder = Self::defaults()?.add_source(file).add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let mut settings = Self::from_builder(builder)?;
        settings.apply_database_url(std::env::var("DATABASE_URL").ok());
        settings.check()?;

        debug!(
            "Configuration loaded: {} connections, {} entity managers",
            settings.connections.len(),
            settings.entity_managers.len()
        );
        Ok(settings)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Ok(Config::builder()
            .set_default("migrations_dir", "migrations")?
            .set_default("migrations_table", DEFAULT_MIGRATIONS_TABLE)?
            .set_default("line_length", DEFAULT_LINE_LENGTH as i64)?)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        Ok(builder.build()?.try_deserialize()?)
    }

    /// A bare `DATABASE_URL` stands in for an undeclared default connection
    fn apply_database_url(&mut self, database_url: Option<String>) {
        if self.connections.contains_key(DEFAULT_NAME) {
            return;
        }
        if let Some(url) = database_url.filter(|u| !u.trim().is_empty()) {
            self.connections
                .insert(DEFAULT_NAME.to_string(), ConnectionConfig::new(url));
        }
    }

    fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;
        for (name, connection) in &self.connections {
            connection.validate()?;
            if connection.shards.iter().any(|s| s.trim().is_empty()) {
                return Err(ConfigError::InvalidValue(format!(
                    "Connection '{}' declares an empty shard name",
                    name
                )));
            }
        }
        for (name, em) in &self.entity_managers {
            if let Some(ref connection) = em.connection {
                if !self.connections.contains_key(connection) {
                    return Err(ConfigError::InvalidValue(format!(
                        "Entity manager '{}' refers to unknown connection '{}'",
                        name, connection
                    )));
                }
            }
        }
        Ok(())
    }

    /// Pick connection, dialect and schema source for the given selection flags
    pub fn resolve_target(
        &self,
        entity_manager: &str,
        connection: Option<&str>,
        shard: Option<&str>,
    ) -> DriftResult<Target> {
        let em = match self.entity_managers.get(entity_manager) {
            Some(em) => em.clone(),
            None if entity_manager == DEFAULT_NAME => EntityManagerConfig::default(),
            None => {
                return Err(config_error(format!(
                    "Unknown entity manager '{}'",
                    entity_manager
                )))
            }
        };

        let connection_name = connection
            .map(str::to_string)
            .or_else(|| em.connection.clone())
            .unwrap_or_else(|| DEFAULT_NAME.to_string());
        let connection = self.connections.get(&connection_name).ok_or_else(|| {
            config_error(format!(
                "Unknown connection '{}'; declare it under [connections] or set DATABASE_URL",
                connection_name
            ))
        })?;

        if let Some(shard) = shard {
            if connection.shards.is_empty() {
                return Err(config_error(format!(
                    "Connection of entity manager '{}' must implement shards configuration.",
                    entity_manager
                )));
            }
            if !connection.shards.iter().any(|s| s == shard) {
                return Err(config_error(format!(
                    "Unknown shard '{}' for connection '{}'",
                    shard, connection_name
                )));
            }
        }

        Ok(Target {
            dialect: connection.dialect()?,
            connection: connection_name,
            shard: shard.map(str::to_string),
            schema_file: em.schema_file,
            filter_expression: em.filter_expression.or_else(|| self.filter_expression.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::config::FileFormat;

    fn parse(toml: &str) -> Settings {
        let builder = Settings::defaults()
            .unwrap()
            .add_source(File::from_str(toml, FileFormat::Toml));
        let settings = Settings::from_builder(builder).unwrap();
        settings.check().unwrap();
        settings
    }

    const SAMPLE: &str = r#"
        migrations_dir = "db/migrations"
        filter_expression = "^app_"

        [connections.default]
        url = "postgresql://app@localhost/app"

        [connections.legacy]
        url = "mysql://root@localhost/legacy"
        shards = ["eu", "us"]

        [connections.local]
        url = "sqlite:///tmp/app.db"

        [entity_managers.default]
        schema_file = "schema.json"

        [entity_managers.archive]
        connection = "legacy"
        schema_file = "archive.json"
        filter_expression = "^archive_"
    "#;

    #[test]
    fn test_defaults() {
        let settings = parse("");
        assert_eq!(settings.migrations_dir, PathBuf::from("migrations"));
        assert_eq!(settings.migrations_table, "migration_versions");
        assert_eq!(settings.line_length, 120);
        assert!(settings.connections.is_empty());
    }

    #[test]
    fn test_resolve_default_target() {
        let settings = parse(SAMPLE);

        let target = settings.resolve_target("default", None, None).unwrap();

        assert_eq!(target.connection, "default");
        assert_eq!(target.dialect, Dialect::PostgreSql);
        assert_eq!(target.schema_file, Some(PathBuf::from("schema.json")));
        assert_eq!(target.filter_expression.as_deref(), Some("^app_"));
    }

    #[test]
    fn test_entity_manager_and_db_override() {
        let settings = parse(SAMPLE);

        let archive = settings.resolve_target("archive", None, Some("eu")).unwrap();
        assert_eq!(archive.dialect, Dialect::MySql);
        assert_eq!(archive.shard.as_deref(), Some("eu"));
        assert_eq!(archive.filter_expression.as_deref(), Some("^archive_"));

        let local = settings.resolve_target("default", Some("local"), None).unwrap();
        assert_eq!(local.dialect, Dialect::Sqlite);
    }

    #[test]
    fn test_shard_errors() {
        let settings = parse(SAMPLE);

        let err = settings.resolve_target("default", None, Some("eu")).unwrap_err();
        assert!(err.to_string().contains("must implement shards configuration"));

        let err = settings.resolve_target("archive", None, Some("asia")).unwrap_err();
        assert!(matches!(err, DriftError::Configuration(_)));
    }

    #[test]
    fn test_unknown_names_are_configuration_errors() {
        let settings = parse(SAMPLE);
        assert!(settings.resolve_target("reporting", None, None).is_err());
        assert!(settings.resolve_target("default", Some("missing"), None).is_err());
    }

    #[test]
    fn test_database_url_fallback() {
        let mut settings = parse("");
        settings.apply_database_url(Some("mariadb://root@db/app".to_string()));

        let target = settings.resolve_target("default", None, None).unwrap();
        assert_eq!(target.dialect, Dialect::MySql);

        // an explicit default connection wins
        let mut settings = parse(SAMPLE);
        settings.apply_database_url(Some("sqlite:///tmp/other.db".to_string()));
        assert_eq!(
            settings.resolve_target("default", None, None).unwrap().dialect,
            Dialect::PostgreSql
        );
    }

    #[test]
    fn test_platform_overrides_url_scheme() {
        let settings = parse(
            r#"
            [connections.default]
            url = "postgres://localhost/app"
            platform = "sqlite"
            "#,
        );
        assert_eq!(
            settings.resolve_target("default", None, None).unwrap().dialect,
            Dialect::Sqlite
        );
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let builder = Settings::defaults()
            .unwrap()
            .add_source(File::from_str("line_length = 10", FileFormat::Toml));
        let settings = Settings::from_builder(builder).unwrap();
        assert!(matches!(settings.check(), Err(ConfigError::Invalid(_))));

        let builder = Settings::defaults().unwrap().add_source(File::from_str(
            "[entity_managers.default]\nconnection = \"nowhere\"",
            FileFormat::Toml,
        ));
        let settings = Settings::from_builder(builder).unwrap();
        assert!(matches!(settings.check(), Err(ConfigError::InvalidValue(_))));
    }
}
