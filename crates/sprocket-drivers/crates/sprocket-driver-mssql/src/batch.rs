//! Stored-procedure invocation batches
//!
//! tiberius has no RPC output-parameter support, so a procedure call is sent
//! as a T-SQL batch. Output slots are declared as local variables, the
//! procedure is EXECuted with those variables bound OUTPUT, and a trailing
//! SELECT returns their values as a single row:
//!
//! ```sql
//! DECLARE @__o1 INT;
//! DECLARE @__return INT;
//! EXEC @__return = [dbo].[sp_insert_customer] @name = @P1, @id = @__o1 OUTPUT;
//! SELECT @@ROWCOUNT AS [__sprocket_rowcount], @__o1 AS [__o1], @__return AS [__return];
//! ```

use sprocket_core::{DriverParameter, ParameterDirection, Result, SprocketError, Value};
use tiberius::ToSql;

use crate::dialect::MssqlDialect;
use crate::values::{BoundValue, to_column_data};

/// First column of the trailing output row; marks that result set as ours
pub(crate) const ROWCOUNT_COLUMN: &str = "__sprocket_rowcount";

const RETURN_VARIABLE: &str = "@__return";

/// A procedure call rendered as a parameterized T-SQL batch
#[derive(Debug)]
pub(crate) struct ProcedureBatch {
    sql: String,
    inputs: Vec<BoundValue>,
    /// Indices of the parameters that receive the trailing row's values,
    /// in column order (after the row count)
    output_slots: Vec<usize>,
}

impl ProcedureBatch {
    /// Render a call of `procedure` with `parameters`
    pub(crate) fn build(procedure: &str, parameters: &[DriverParameter]) -> Result<Self> {
        let dialect = MssqlDialect::new();
        let target = dialect.quote_object_name(procedure)?;

        let mut declarations = String::new();
        let mut arguments = Vec::new();
        let mut inputs = Vec::new();
        let mut output_slots = Vec::new();
        let mut selected = Vec::new();
        let mut return_slot = None;

        for (index, param) in parameters.iter().enumerate() {
            if param.direction == ParameterDirection::ReturnValue {
                if return_slot.replace(index).is_some() {
                    return Err(SprocketError::ParameterContract(format!(
                        "procedure '{}' has more than one return value parameter",
                        procedure
                    )));
                }
                continue;
            }

            let name = param.bare_name();
            if !dialect.is_valid_parameter_name(name) {
                return Err(SprocketError::ParameterContract(format!(
                    "invalid parameter name '{}'",
                    param.name
                )));
            }

            match param.direction {
                ParameterDirection::Input => {
                    inputs.push(BoundValue(to_column_data(param.value.as_ref(), param.db_type)?));
                    arguments.push(format!("@{} = @P{}", name, inputs.len()));
                }
                _ => {
                    let variable = format!("@__o{}", index);
                    let sql_type = dialect.type_name(param.db_type);
                    if param.direction.carries_input() {
                        inputs.push(BoundValue(to_column_data(
                            param.value.as_ref(),
                            param.db_type,
                        )?));
                        declarations.push_str(&format!(
                            "DECLARE {} {} = @P{};\n",
                            variable,
                            sql_type,
                            inputs.len()
                        ));
                    } else {
                        declarations.push_str(&format!("DECLARE {} {};\n", variable, sql_type));
                    }
                    arguments.push(format!("@{} = {} OUTPUT", name, variable));
                    selected.push(format!("{} AS [__o{}]", variable, index));
                    output_slots.push(index);
                }
            }
        }

        // Procedure return values are always INT
        let exec_target = match return_slot {
            Some(index) => {
                declarations.push_str(&format!("DECLARE {} INT;\n", RETURN_VARIABLE));
                selected.push(format!("{} AS [__return]", RETURN_VARIABLE));
                output_slots.push(index);
                format!("{} = {}", RETURN_VARIABLE, target)
            }
            None => target,
        };

        let mut sql = declarations;
        sql.push_str("EXEC ");
        sql.push_str(&exec_target);
        if !arguments.is_empty() {
            sql.push(' ');
            sql.push_str(&arguments.join(", "));
        }
        sql.push(';');

        if !output_slots.is_empty() {
            sql.push_str(&format!("\nSELECT @@ROWCOUNT AS [{}]", ROWCOUNT_COLUMN));
            for column in &selected {
                sql.push_str(", ");
                sql.push_str(column);
            }
            sql.push(';');
        }

        Ok(Self {
            sql,
            inputs,
            output_slots,
        })
    }

    pub(crate) fn sql(&self) -> &str {
        &self.sql
    }

    /// Query parameters in `@P1..@Pn` order
    pub(crate) fn params(&self) -> Vec<&dyn ToSql> {
        self.inputs.iter().map(|v| v as &dyn ToSql).collect()
    }

    /// Whether the batch ends with an output row that must be read back
    pub(crate) fn has_outputs(&self) -> bool {
        !self.output_slots.is_empty()
    }

    /// Store the trailing row's values into the output parameters and
    /// return the row count the procedure reported
    pub(crate) fn apply_outputs(
        &self,
        row: Vec<Value>,
        parameters: &mut [DriverParameter],
    ) -> Result<u64> {
        if row.len() != self.output_slots.len() + 1 {
            return Err(SprocketError::Driver(format!(
                "expected {} output values, received {}",
                self.output_slots.len() + 1,
                row.len()
            )));
        }

        let mut values = row.into_iter();
        let affected = values
            .next()
            .and_then(|v| v.as_i64())
            .map(|n| n.max(0) as u64)
            .unwrap_or(0);

        for (&slot, value) in self.output_slots.iter().zip(values) {
            let param = parameters.get_mut(slot).ok_or_else(|| {
                SprocketError::Driver(format!("output slot {} has no parameter", slot))
            })?;
            param.value = Some(value);
        }
        Ok(affected)
    }
}
