//! Driver registry for managing available database drivers

use std::collections::HashMap;
use std::sync::Arc;
use sprocket_core::{ConnectionConfig, Driver, DriverConnection, Result, SprocketError};

/// Registry of available database drivers
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl DriverRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Create a registry with all built-in drivers registered
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        #[cfg(feature = "mssql")]
        registry.register(Arc::new(crate::mssql::MssqlDriver::new()));

        registry
    }

    /// Register a new driver, replacing any driver with the same id
    pub fn register(&mut self, driver: Arc<dyn Driver>) {
        let id = driver.id().to_string();
        tracing::info!(driver = %id, "registering database driver");
        self.drivers.insert(id, driver);
    }

    /// Get a driver by id
    pub fn get(&self, id: &str) -> Option<Arc<dyn Driver>> {
        let driver = self.drivers.get(id).cloned();
        if driver.is_none() {
            tracing::warn!(driver = %id, "driver not found in registry");
        }
        driver
    }

    /// List all registered driver ids
    pub fn list(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.drivers.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    /// Check if a driver is registered
    pub fn has(&self, id: &str) -> bool {
        self.drivers.contains_key(id)
    }

    /// Construct an unopened connection with the driver named by `config`
    pub fn create_connection(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn DriverConnection>> {
        let driver = self.get(&config.driver).ok_or_else(|| {
            SprocketError::Configuration(format!("unknown driver '{}'", config.driver))
        })?;
        driver.create_connection(config)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
