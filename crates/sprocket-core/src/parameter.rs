//! Direction-tagged stored-procedure parameters
//!
//! A [`Parameter`] describes one argument of a stored-procedure call. It is
//! built with one of four factory constructors, handed to the invocation
//! methods, converted into a [`DriverParameter`] when the command is built,
//! and read back by the caller once the call completes.

use serde::{Deserialize, Serialize};

use crate::Value;

/// Database-portable scalar type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbType {
    Boolean,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Real,
    Float,
    Decimal,
    String,
    Binary,
    Guid,
    Date,
    Time,
    DateTime,
    DateTimeOffset,
}

/// Whether a parameter supplies a value, receives one, or both
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterDirection {
    Input,
    Output,
    InputOutput,
    /// The procedure's scalar return value
    ReturnValue,
}

impl ParameterDirection {
    /// Whether the caller's value is sent to the server
    pub fn carries_input(&self) -> bool {
        matches!(self, ParameterDirection::Input | ParameterDirection::InputOutput)
    }

    /// Whether the driver writes a value back after execution
    pub fn receives_output(&self) -> bool {
        !matches!(self, ParameterDirection::Input)
    }
}

impl std::fmt::Display for ParameterDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ParameterDirection::Input => "input",
            ParameterDirection::Output => "output",
            ParameterDirection::InputOutput => "input/output",
            ParameterDirection::ReturnValue => "return value",
        };
        f.write_str(name)
    }
}

/// One stored-procedure argument.
///
/// Input and InputOutput parameters are constructed with a value; Output and
/// ReturnValue parameters start unset and are populated by the driver. A
/// parameter belongs to exactly one call; build fresh ones for the next call.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    db_type: DbType,
    direction: ParameterDirection,
    value: Option<Value>,
}

impl Parameter {
    /// Input parameter carrying `value` into the procedure
    pub fn in_param(name: impl Into<String>, db_type: DbType, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            db_type,
            direction: ParameterDirection::Input,
            value: Some(value.into()),
        }
    }

    /// Output parameter, populated after execution
    pub fn out_param(name: impl Into<String>, db_type: DbType) -> Self {
        Self {
            name: name.into(),
            db_type,
            direction: ParameterDirection::Output,
            value: None,
        }
    }

    /// Parameter that sends `value` and receives the procedure's update of it
    pub fn in_out_param(name: impl Into<String>, db_type: DbType, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            db_type,
            direction: ParameterDirection::InputOutput,
            value: Some(value.into()),
        }
    }

    /// Slot for the procedure's return value
    pub fn return_value_param(name: impl Into<String>, db_type: DbType) -> Self {
        Self {
            name: name.into(),
            db_type,
            direction: ParameterDirection::ReturnValue,
            value: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn db_type(&self) -> DbType {
        self.db_type
    }

    pub fn direction(&self) -> ParameterDirection {
        self.direction
    }

    /// Current value. For Output/ReturnValue this is `None` until the call
    /// has completed.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Consume the parameter and return its value
    pub fn into_value(self) -> Option<Value> {
        self.value
    }

    /// Convert into the driver-native representation.
    ///
    /// Output and ReturnValue directions never send a value, whatever the
    /// parameter currently holds.
    pub fn to_driver_parameter(&self) -> DriverParameter {
        let value = if self.direction.carries_input() {
            self.value.clone()
        } else {
            None
        };
        DriverParameter {
            name: self.name.clone(),
            db_type: self.db_type,
            direction: self.direction,
            value,
        }
    }

    /// Post-execution assignment performed when output values are copied back
    pub(crate) fn set_output_value(&mut self, value: Option<Value>) {
        self.value = value;
    }
}

/// Driver-native parameter bound to a command.
///
/// Drivers read `value` for input directions and overwrite it in place for
/// every direction that receives output.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverParameter {
    pub name: String,
    pub db_type: DbType,
    pub direction: ParameterDirection,
    pub value: Option<Value>,
}

impl DriverParameter {
    /// Parameter name without a leading `@`
    pub fn bare_name(&self) -> &str {
        self.name.trim_start_matches('@')
    }
}

macro_rules! impl_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_value_from!(
    bool => Bool,
    u8 => UInt8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    String => String,
    Vec<u8> => Bytes,
    uuid::Uuid => Uuid,
    chrono::NaiveDate => Date,
    chrono::NaiveTime => Time,
    chrono::NaiveDateTime => DateTime,
    chrono::DateTime<chrono::Utc> => DateTimeUtc,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests;
