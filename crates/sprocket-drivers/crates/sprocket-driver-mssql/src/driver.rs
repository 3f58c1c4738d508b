//! MS SQL Server driver implementation

use sprocket_core::{ConnectionConfig, Driver, DriverConnection, Result};

use crate::connection::{DEFAULT_PORT, MssqlConnection};

/// MS SQL Server database driver
pub struct MssqlDriver;

impl MssqlDriver {
    /// Create a new MS SQL Server driver instance
    pub fn new() -> Self {
        tracing::debug!("MS SQL Server driver initialized");
        Self
    }
}

impl Default for MssqlDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for MssqlDriver {
    fn id(&self) -> &'static str {
        "mssql"
    }

    fn display_name(&self) -> &'static str {
        "MS SQL Server"
    }

    fn default_port(&self) -> Option<u16> {
        Some(DEFAULT_PORT)
    }

    #[tracing::instrument(
        skip(self, config),
        fields(
            host = config.get_string("host").as_deref(),
            database = config.get_string("database").as_deref(),
        )
    )]
    fn create_connection(&self, config: &ConnectionConfig) -> Result<Box<dyn DriverConnection>> {
        let connection = MssqlConnection::from_config(config)?;
        Ok(Box::new(connection))
    }

    fn build_connection_string(&self, config: &ConnectionConfig) -> String {
        if let Some(conn_str) = config.get_string("connection_string") {
            return conn_str;
        }

        let host = config
            .get_string("host")
            .unwrap_or_else(|| "localhost".to_string());
        let port = if config.port > 0 { config.port } else { DEFAULT_PORT };

        let mut conn_str = format!("Server=tcp:{},{}", host, port);

        if let Some(db) = config.get_string("database") {
            conn_str.push_str(&format!(";Database={}", db));
        }
        if let Some(u) = config.get_string("user") {
            conn_str.push_str(&format!(";User Id={}", u));
            if let Some(p) = config.get_string("password") {
                conn_str.push_str(&format!(";Password={}", p));
            }
        }
        if config.get_bool("trust_cert") {
            conn_str.push_str(";TrustServerCertificate=true");
        }

        conn_str
    }
}
