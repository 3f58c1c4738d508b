//! Bulk loading
//!
//! Runs its own transaction rather than going through
//! `execute_transaction`, since the driver's bulk copy takes the source
//! cursor directly instead of a command.

use sprocket_core::{BulkCopy, Result, RowCursor};

use crate::ConnectionContext;

impl ConnectionContext {
    /// Stream every row of `source` into `destination` and return the number
    /// of rows written.
    ///
    /// With `has_identity` the destination's leading identity column is
    /// skipped: source field `i` lands in column `i + 1`. Otherwise fields
    /// map by position.
    #[tracing::instrument(skip(self, source), fields(field_count = source.field_count()))]
    pub fn bulk_load(
        &mut self,
        destination: &str,
        source: &mut dyn RowCursor,
        has_identity: bool,
    ) -> Result<u64> {
        self.validate_connection_state()?;
        let mut transaction = self.connection_mut()?.begin_transaction()?;

        let field_count = source.field_count();
        let copy = if has_identity {
            BulkCopy::identity_shifted(destination, field_count)
        } else {
            BulkCopy::positional(destination, field_count)
        };

        match transaction.bulk_copy(&copy, source) {
            Ok(rows) => {
                transaction.commit().map_err(|e| {
                    tracing::error!(error = %e, "commit of bulk load failed");
                    e
                })?;
                tracing::info!(rows, "bulk load committed");
                Ok(rows)
            }
            Err(e) => {
                tracing::warn!(error = %e, "bulk load failed");
                self.rollback_after_failure(transaction);
                Err(e)
            }
        }
    }
}
