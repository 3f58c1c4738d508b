//! Sprocket Core - types and driver seams for stored-procedure execution
//!
//! This crate defines everything the execution layer and the drivers share:
//!
//! - `Parameter` - direction-tagged stored-procedure arguments
//! - `Command` - a prepared stored-procedure invocation
//! - `DriverConnection`, `DriverTransaction`, `RowCursor` - driver seams
//! - `Driver` - constructs connection handles from a `ConnectionConfig`
//! - `BulkCopy` - destination table and column mappings for bulk loads
//! - Common types like `Value`, `Row`, `ColumnMeta`, `DataTable`

mod bulk;
mod command;
mod config;
mod connection;
mod convert;
mod driver;
mod error;
mod parameter;
mod types;

pub use bulk::*;
pub use command::*;
pub use config::*;
pub use connection::*;
pub use convert::*;
pub use driver::*;
pub use error::*;
pub use parameter::*;
pub use types::*;
