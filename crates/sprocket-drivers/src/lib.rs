//! Sprocket Drivers - database driver implementations
//!
//! This crate bundles the concrete drivers behind the seams defined in
//! `sprocket-core` and a registry that resolves them by id.

#[cfg(feature = "mssql")]
pub use sprocket_driver_mssql as mssql;

mod registry;

pub use registry::DriverRegistry;

/// Re-export commonly used types from sprocket-core
pub use sprocket_core::{
    ConnectionConfig, ConnectionState, Driver, DriverConnection, DriverTransaction, Result,
    SprocketError,
};
