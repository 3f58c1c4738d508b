//! Sprocket Connection - transactional stored-procedure execution
//!
//! A [`ConnectionContext`] owns one driver connection for its lifetime and
//! runs every call inside its own transaction:
//!
//! - lifecycle: state validation before use, idempotent disposal
//! - `execute_transaction`: commit on success, rollback on failure
//! - stored-procedure calls: row count, cursor, data table, return value
//! - bulk loads with identity-aware column mapping
//!
//! # Example
//!
//! ```ignore
//! use sprocket_connection::ConnectionContext;
//! use sprocket_core::{ConnectionConfig, DbType, Parameter};
//!
//! let config = ConnectionConfig::load(&sprocket_core::default_config_path()?)?;
//! let mut context = ConnectionContext::connect(&config)?;
//!
//! let mut params = [
//!     Parameter::in_param("name", DbType::String, "Alice"),
//!     Parameter::out_param("id", DbType::Int),
//! ];
//! let affected = context.execute_non_query("dbo.sp_insert_customer", &mut params)?;
//! let id = params[1].value();
//! ```

mod bulk;
mod context;
mod engine;
mod procedures;

#[cfg(test)]
mod testing;

pub use context::ConnectionContext;
pub use engine::UnitOfWork;
