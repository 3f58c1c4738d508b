//! Typed extraction of driver values

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use uuid::Uuid;

use crate::{Result, SprocketError, Value};

/// Conversion from a driver value into a caller-requested type.
///
/// Integer widening is accepted; narrowing is checked. NULL only converts
/// into `Option<T>` or [`Value`].
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

fn cast_error(value: &Value, target: &str) -> SprocketError {
    SprocketError::TypeCast(format!(
        "cannot convert {} value '{}' to {}",
        value.kind(),
        value,
        target
    ))
}

macro_rules! impl_from_value_int {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self> {
                    let wide = value
                        .as_i64()
                        .ok_or_else(|| cast_error(&value, stringify!($ty)))?;
                    <$ty>::try_from(wide).map_err(|_| cast_error(&value, stringify!($ty)))
                }
            }
        )*
    };
}

impl_from_value_int!(u8, i16, i32, i64);

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match &value {
            Value::Float32(v) => Ok(*v as f64),
            Value::Float64(v) => Ok(*v),
            Value::UInt8(_) | Value::Int16(_) | Value::Int32(_) => {
                value.as_i64().map(|v| v as f64).ok_or_else(|| cast_error(&value, "f64"))
            }
            Value::Decimal(d) => d.parse::<f64>().map_err(|_| cast_error(&value, "f64")),
            _ => Err(cast_error(&value, "f64")),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float32(v) => Ok(v),
            other => Err(cast_error(&other, "f32")),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| cast_error(&value, "bool"))
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(s) | Value::Decimal(s) => Ok(s),
            other => Err(cast_error(&other, "String")),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bytes(b) => Ok(b),
            other => Err(cast_error(&other, "Vec<u8>")),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Uuid(u) => Ok(u),
            other => Err(cast_error(&other, "Uuid")),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Date(d) => Ok(d),
            other => Err(cast_error(&other, "NaiveDate")),
        }
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Time(t) => Ok(t),
            other => Err(cast_error(&other, "NaiveTime")),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::DateTime(dt) => Ok(dt),
            other => Err(cast_error(&other, "NaiveDateTime")),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::DateTimeUtc(dt) => Ok(dt),
            other => Err(cast_error(&other, "DateTime<Utc>")),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}
