//! Transactional execution

use sprocket_core::{Command, ConnectionState, DriverTransaction, Result, SprocketError};

use crate::ConnectionContext;

/// Business logic run inside a transaction.
///
/// The engine supplies the transactional envelope; the unit of work only
/// sees the command, already bound to the open transaction.
pub trait UnitOfWork<T> {
    fn apply(self, command: &mut Command) -> Result<T>;
}

impl<T, F> UnitOfWork<T> for F
where
    F: FnOnce(&mut Command) -> Result<T>,
{
    fn apply(self, command: &mut Command) -> Result<T> {
        self(command)
    }
}

impl ConnectionContext {
    /// Run `work` against `command` inside a new transaction.
    ///
    /// The transaction commits once if `work` succeeds. If `work` fails it is
    /// rolled back (only while the connection is still open) and the error
    /// from `work` is returned unchanged. A failed commit is returned as the
    /// error of the call.
    #[tracing::instrument(skip(self, command, work), fields(procedure = command.name()))]
    pub fn execute_transaction<T, W>(&mut self, command: &mut Command, work: W) -> Result<T>
    where
        W: UnitOfWork<T>,
    {
        if command.has_transaction() {
            return Err(SprocketError::InvalidOperation(format!(
                "command '{}' is already bound to a transaction",
                command.name()
            )));
        }

        self.validate_connection_state()?;
        let transaction = self.connection_mut()?.begin_transaction()?;
        command.bind_transaction(transaction);
        tracing::debug!("transaction started");

        let outcome = work.apply(command);
        let transaction = command.take_transaction();

        match (outcome, transaction) {
            (Ok(value), Some(transaction)) => {
                transaction.commit().map_err(|e| {
                    tracing::error!(error = %e, "commit failed");
                    e
                })?;
                tracing::debug!("transaction committed");
                Ok(value)
            }
            (Ok(_), None) => Err(SprocketError::InvalidOperation(format!(
                "unit of work for '{}' detached the transaction",
                command.name()
            ))),
            (Err(e), Some(transaction)) => {
                tracing::error!(error = %e, "unit of work failed");
                self.rollback_after_failure(transaction);
                Err(e)
            }
            (Err(e), None) => {
                tracing::warn!(error = %e, "unit of work failed after detaching the transaction");
                Err(e)
            }
        }
    }

    /// Roll back after a failure if the connection can still take it.
    ///
    /// Rollback errors are logged; the failure that triggered the rollback is
    /// what the caller sees.
    pub(crate) fn rollback_after_failure(&self, transaction: Box<dyn DriverTransaction>) {
        let state = self.state();
        if state != ConnectionState::Open {
            tracing::warn!(%state, "connection is not open, skipping rollback");
            return;
        }
        match transaction.rollback() {
            Ok(()) => tracing::debug!("transaction rolled back"),
            Err(e) => tracing::error!(error = %e, "rollback failed"),
        }
    }
}
