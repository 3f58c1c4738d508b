//! Stored-procedure commands

use crate::{DriverParameter, DriverTransaction, Parameter, Result, RowCursor, SprocketError};

/// Kind of command sent to the driver.
///
/// Only named stored-procedure invocation is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    StoredProcedure,
}

/// A prepared stored-procedure invocation.
///
/// Commands execute through the transaction bound to them; executing an
/// unbound command is an error.
pub struct Command {
    name: String,
    kind: CommandKind,
    parameters: Vec<DriverParameter>,
    transaction: Option<Box<dyn DriverTransaction>>,
}

impl Command {
    /// Build a command for `name`, converting each parameter to its
    /// driver-native form
    pub fn stored_procedure(name: impl Into<String>, parameters: &[Parameter]) -> Self {
        Self {
            name: name.into(),
            kind: CommandKind::StoredProcedure,
            parameters: parameters.iter().map(Parameter::to_driver_parameter).collect(),
            transaction: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn parameters(&self) -> &[DriverParameter] {
        &self.parameters
    }

    /// Look up a bound parameter by name, ignoring a leading `@`
    pub fn parameter(&self, name: &str) -> Option<&DriverParameter> {
        let name = name.trim_start_matches('@');
        self.parameters.iter().find(|p| p.bare_name() == name)
    }

    /// Attach a transaction; any previously bound transaction is returned
    pub fn bind_transaction(
        &mut self,
        transaction: Box<dyn DriverTransaction>,
    ) -> Option<Box<dyn DriverTransaction>> {
        self.transaction.replace(transaction)
    }

    /// Detach the bound transaction
    pub fn take_transaction(&mut self) -> Option<Box<dyn DriverTransaction>> {
        self.transaction.take()
    }

    pub fn has_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Execute and return the driver-reported affected-row count
    pub fn execute_non_query(&mut self) -> Result<u64> {
        let transaction = Self::bound(&mut self.transaction, &self.name)?;
        transaction.execute_non_query(&self.name, &mut self.parameters)
    }

    /// Execute and return a forward-only cursor over the first result set
    pub fn execute_reader(&mut self) -> Result<Box<dyn RowCursor>> {
        let transaction = Self::bound(&mut self.transaction, &self.name)?;
        transaction.execute_reader(&self.name, &mut self.parameters)
    }

    /// Copy driver-populated values back into the caller's parameters.
    ///
    /// Slots are matched by position; Input parameters are left untouched.
    pub fn copy_output_values(&self, parameters: &mut [Parameter]) {
        for (param, bound) in parameters.iter_mut().zip(&self.parameters) {
            if param.direction().receives_output() {
                param.set_output_value(bound.value.clone());
            }
        }
    }

    fn bound<'a>(
        transaction: &'a mut Option<Box<dyn DriverTransaction>>,
        name: &str,
    ) -> Result<&'a mut Box<dyn DriverTransaction>> {
        transaction.as_mut().ok_or_else(|| {
            SprocketError::InvalidOperation(format!(
                "command '{}' has no bound transaction",
                name
            ))
        })
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("parameters", &self.parameters)
            .field("bound", &self.transaction.is_some())
            .finish()
    }
}
