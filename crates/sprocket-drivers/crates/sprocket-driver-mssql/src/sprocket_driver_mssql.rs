//! MS SQL Server driver for Sprocket
//!
//! Implements the blocking driver seams of `sprocket-core` on top of
//! tiberius. Calls are bridged onto a shared tokio runtime, stored
//! procedures are invoked through generated T-SQL batches so that output
//! parameters and return values can be read back, and bulk loads use the
//! TDS bulk-insert protocol.

mod batch;
mod bulk;
mod connection;
mod dialect;
mod driver;
mod runtime;
mod values;

#[cfg(test)]
mod batch_tests;
#[cfg(test)]
mod bulk_tests;
#[cfg(test)]
mod connection_tests;
#[cfg(test)]
mod dialect_tests;
#[cfg(test)]
mod driver_tests;
#[cfg(test)]
mod values_tests;

pub use connection::{MssqlConnection, MssqlConnectionError, MssqlTransaction};
pub use dialect::MssqlDialect;
pub use driver::MssqlDriver;
