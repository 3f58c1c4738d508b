//! Driver connection, transaction and cursor traits
//!
//! These are the seams a database driver implements. Every call blocks the
//! calling thread until the driver has finished; a connection is owned by a
//! single caller and is never shared across threads while in use.

use std::collections::VecDeque;

use crate::{BulkCopy, ColumnMeta, DriverParameter, Result, Row};

/// Observable state of a connection handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No handle at all. Drivers never report this; a context does once its
    /// handle has been released.
    Absent,
    Closed,
    Open,
    /// The handle was open but the link failed; it must be reopened.
    Broken,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Absent => "absent",
            ConnectionState::Closed => "closed",
            ConnectionState::Open => "open",
            ConnectionState::Broken => "broken",
        };
        f.write_str(name)
    }
}

/// A driver connection handle
pub trait DriverConnection: Send {
    /// Get the driver name (e.g., "mssql")
    fn driver_name(&self) -> &str;

    /// Current state of the handle
    fn state(&self) -> ConnectionState;

    /// Open (or reopen) the connection
    fn open(&mut self) -> Result<()>;

    /// Close the connection
    fn close(&mut self) -> Result<()>;

    /// Begin a transaction on this connection
    fn begin_transaction(&mut self) -> Result<Box<dyn DriverTransaction>>;
}

/// A driver transaction.
///
/// Commands bound to a transaction execute through it. Executing methods
/// overwrite the value of every parameter whose direction receives output.
pub trait DriverTransaction: Send {
    /// Execute a stored procedure and return the affected-row count.
    ///
    /// How the count is gathered is up to the driver. The SQL Server driver
    /// sums every statement's count, except when output parameters or a
    /// return value are requested: it then reports only the count of the
    /// procedure's last statement (`@@ROWCOUNT`).
    fn execute_non_query(
        &mut self,
        procedure: &str,
        parameters: &mut [DriverParameter],
    ) -> Result<u64>;

    /// Execute a stored procedure and return a forward-only cursor over its
    /// first result set
    fn execute_reader(
        &mut self,
        procedure: &str,
        parameters: &mut [DriverParameter],
    ) -> Result<Box<dyn RowCursor>>;

    /// Stream every row of `source` into the table described by `copy`
    fn bulk_copy(&mut self, copy: &BulkCopy, source: &mut dyn RowCursor) -> Result<u64>;

    /// Commit the transaction
    fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    fn rollback(self: Box<Self>) -> Result<()>;
}

/// Forward-only row stream
pub trait RowCursor: Send {
    /// Column metadata of the stream
    fn columns(&self) -> &[ColumnMeta];

    /// Number of fields in every row
    fn field_count(&self) -> usize {
        self.columns().len()
    }

    /// Advance to the next row, `None` once the stream is exhausted
    fn next_row(&mut self) -> Result<Option<Row>>;
}

/// A cursor over rows that are already in memory
#[derive(Debug, Clone, Default)]
pub struct BufferedCursor {
    columns: Vec<ColumnMeta>,
    rows: VecDeque<Row>,
}

impl BufferedCursor {
    pub fn new(columns: Vec<ColumnMeta>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows: rows.into(),
        }
    }

    /// A cursor with no columns and no rows
    pub fn empty() -> Self {
        Self::default()
    }

    /// Rows not yet read
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl RowCursor for BufferedCursor {
    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        Ok(self.rows.pop_front())
    }
}
