//! Connection descriptors

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::{Result, SprocketError};

/// Describes how to reach a database.
///
/// Loaded from TOML or built in code:
///
/// ```toml
/// driver = "mssql"
/// host = "db.internal"
/// port = 1433
/// database = "sales"
/// username = "app"
/// password = "secret"
///
/// [params]
/// trust_cert = "true"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Driver ID (e.g., "mssql")
    pub driver: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Host address
    #[serde(default)]
    pub host: String,
    /// Port number (0 for the driver default)
    #[serde(default)]
    pub port: u16,
    /// Database name
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Complete driver connection string; takes precedence over the
    /// discrete fields when set
    #[serde(default)]
    pub connection_string: Option<String>,
    /// Additional connection parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl ConnectionConfig {
    /// Create a new configuration with default values
    pub fn new(driver: &str, name: &str) -> Self {
        Self {
            driver: driver.to_string(),
            name: name.to_string(),
            host: String::new(),
            port: 0,
            database: None,
            username: None,
            password: None,
            connection_string: None,
            params: HashMap::new(),
        }
    }

    /// Create a SQL Server configuration
    pub fn new_mssql(host: &str, port: u16, database: &str, username: &str) -> Self {
        let mut config = Self::new("mssql", "MS SQL Server");
        config.host = host.to_string();
        config.port = port;
        config.database = Some(database.to_string());
        config.username = Some(username.to_string());
        config
    }

    /// Create a configuration from a driver connection string
    pub fn from_connection_string(driver: &str, connection_string: &str) -> Self {
        let mut config = Self::new(driver, driver);
        config.connection_string = Some(connection_string.to_string());
        config
    }

    /// Set a connection parameter
    pub fn with_param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    /// Get a string parameter, checking params before the known fields
    pub fn get_string(&self, key: &str) -> Option<String> {
        if let Some(val) = self.params.get(key) {
            return Some(val.clone());
        }
        match key {
            "host" if !self.host.is_empty() => Some(self.host.clone()),
            "database" => self.database.clone(),
            "username" | "user" => self.username.clone(),
            "password" => self.password.clone(),
            "connection_string" => self.connection_string.clone(),
            _ => None,
        }
    }

    /// Get a boolean parameter ("true"/"1"/"yes")
    pub fn get_bool(&self, key: &str) -> bool {
        self.params
            .get(key)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false)
    }

    /// Parse a TOML descriptor
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        if config.driver.trim().is_empty() {
            return Err(SprocketError::Configuration(
                "connection descriptor has an empty driver".into(),
            ));
        }
        Ok(config)
    }

    /// Load a TOML descriptor from disk
    #[tracing::instrument]
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!(driver = %config.driver, "loaded connection descriptor");
        Ok(config)
    }
}

/// Default location of the connection descriptor,
/// `<config_dir>/sprocket/connection.toml`
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|p| p.join("sprocket").join("connection.toml"))
        .ok_or_else(|| {
            SprocketError::Configuration("could not determine config directory".into())
        })
}
