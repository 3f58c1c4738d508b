//! Stored-procedure calls
//!
//! Every call builds a [`Command`] from the caller's parameters, runs one
//! driver operation through [`ConnectionContext::execute_transaction`], and
//! copies Output, InputOutput and ReturnValue values back into the caller's
//! slice once the transaction has committed.

use sprocket_core::{
    Command, DataTable, FromValue, Parameter, ParameterDirection, Result, RowCursor,
    SprocketError, Value,
};

use crate::ConnectionContext;

impl ConnectionContext {
    /// Execute `procedure` and return the affected-row count.
    ///
    /// The count is whatever the driver reports. On SQL Server a call that
    /// requests Output, InputOutput or ReturnValue parameters only reports
    /// the count of the procedure's last statement, while a call without
    /// them reports the total over all statements.
    #[tracing::instrument(skip(self, parameters), fields(param_count = parameters.len()))]
    pub fn execute_non_query(
        &mut self,
        procedure: &str,
        parameters: &mut [Parameter],
    ) -> Result<u64> {
        let mut command = Command::stored_procedure(procedure, parameters);
        let affected = self.execute_transaction(&mut command, |command: &mut Command| {
            command.execute_non_query()
        })?;
        command.copy_output_values(parameters);
        tracing::debug!(affected, "procedure executed");
        Ok(affected)
    }

    /// Execute `procedure` and return a forward-only cursor over its first
    /// result set. The caller consumes or drops the cursor.
    #[tracing::instrument(skip(self, parameters), fields(param_count = parameters.len()))]
    pub fn execute_reader(
        &mut self,
        procedure: &str,
        parameters: &mut [Parameter],
    ) -> Result<Box<dyn RowCursor>> {
        let mut command = Command::stored_procedure(procedure, parameters);
        let cursor = self.execute_transaction(&mut command, |command: &mut Command| {
            command.execute_reader()
        })?;
        command.copy_output_values(parameters);
        Ok(cursor)
    }

    /// Execute `procedure` and drain its first result set into memory
    #[tracing::instrument(skip(self, parameters), fields(param_count = parameters.len()))]
    pub fn execute_data_table(
        &mut self,
        procedure: &str,
        parameters: &mut [Parameter],
    ) -> Result<DataTable> {
        let mut command = Command::stored_procedure(procedure, parameters);
        let table = self.execute_transaction(&mut command, |command: &mut Command| {
            let mut cursor = command.execute_reader()?;
            DataTable::load(cursor.as_mut())
        })?;
        command.copy_output_values(parameters);
        Ok(table)
    }

    /// Execute `procedure` and return its ReturnValue parameter as `T`.
    ///
    /// `parameters` must contain exactly one ReturnValue parameter; anything
    /// else fails before the connection is touched.
    #[tracing::instrument(skip(self, parameters), fields(param_count = parameters.len()))]
    pub fn execute_with_return_value<T: FromValue>(
        &mut self,
        procedure: &str,
        parameters: &mut [Parameter],
    ) -> Result<T> {
        let slot = return_value_slot(procedure, parameters)?;

        let mut command = Command::stored_procedure(procedure, parameters);
        let value = self.execute_transaction(&mut command, |command: &mut Command| {
            command.execute_non_query()?;
            let value = command
                .parameters()
                .get(slot)
                .and_then(|p| p.value.clone())
                .unwrap_or(Value::Null);
            T::from_value(value)
        })?;
        command.copy_output_values(parameters);
        Ok(value)
    }
}

/// Position of the single ReturnValue parameter
fn return_value_slot(procedure: &str, parameters: &[Parameter]) -> Result<usize> {
    let mut slots = parameters
        .iter()
        .enumerate()
        .filter(|(_, p)| p.direction() == ParameterDirection::ReturnValue)
        .map(|(index, _)| index);

    match (slots.next(), slots.next()) {
        (Some(slot), None) => Ok(slot),
        (None, _) => Err(SprocketError::ParameterContract(format!(
            "'{}' needs a return value parameter",
            procedure
        ))),
        (Some(_), Some(_)) => Err(SprocketError::ParameterContract(format!(
            "'{}' has more than one return value parameter",
            procedure
        ))),
    }
}
