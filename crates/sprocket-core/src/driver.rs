//! Database driver trait definition

use crate::{ConnectionConfig, DriverConnection, Result};

/// A database driver: constructs connection handles from descriptors
pub trait Driver: Send + Sync {
    /// Unique identifier matched against `ConnectionConfig::driver`
    fn id(&self) -> &'static str;

    /// Human-readable name
    fn display_name(&self) -> &'static str;

    /// Default port for this database
    fn default_port(&self) -> Option<u16> {
        None
    }

    /// Construct an unopened connection handle for `config`
    fn create_connection(&self, config: &ConnectionConfig) -> Result<Box<dyn DriverConnection>>;

    /// Build a connection string from configuration
    fn build_connection_string(&self, config: &ConnectionConfig) -> String;
}
