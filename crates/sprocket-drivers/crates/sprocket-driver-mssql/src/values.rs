//! Conversions between Sprocket values and tiberius column data

use std::borrow::Cow;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use sprocket_core::{DbType, FromValue, Result, SprocketError, Value};
use tiberius::ColumnData;
use tiberius::numeric::Numeric;
use tiberius::time::{
    Date, DateTime as LegacyDateTime, DateTime2, DateTimeOffset, SmallDateTime, Time,
};
use uuid::Uuid;

/// Day number (from the common era) of 0001-01-01, the DATE/DATETIME2 epoch
const CE_DAY_0001: i32 = 1;
/// Day number of 1900-01-01, the DATETIME/SMALLDATETIME epoch
const CE_DAY_1900: i32 = 693_596;

/// Scale used for outgoing TIME/DATETIME2 values (100ns increments)
const TIME_SCALE: u8 = 7;
const NANOS_PER_SECOND: u64 = 1_000_000_000;
/// DATETIME stores time of day in 1/300 second ticks
const LEGACY_TICKS_PER_SECOND: u64 = 300;

/// Largest precision SQL Server accepts for DECIMAL
const MAX_NUMERIC_PRECISION: usize = 38;

/// A converted value bound to a tiberius query parameter
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BoundValue(pub(crate) ColumnData<'static>);

impl tiberius::ToSql for BoundValue {
    fn to_sql(&self) -> ColumnData<'_> {
        self.0.clone()
    }
}

/// Convert tiberius ColumnData to a Sprocket Value
pub(crate) fn column_data_to_value(col_data: ColumnData<'static>) -> Result<Value> {
    match col_data {
        ColumnData::Bit(None) => Ok(Value::Null),
        ColumnData::Bit(Some(v)) => Ok(Value::Bool(v)),
        ColumnData::U8(None) => Ok(Value::Null),
        ColumnData::U8(Some(v)) => Ok(Value::UInt8(v)),
        ColumnData::I16(None) => Ok(Value::Null),
        ColumnData::I16(Some(v)) => Ok(Value::Int16(v)),
        ColumnData::I32(None) => Ok(Value::Null),
        ColumnData::I32(Some(v)) => Ok(Value::Int32(v)),
        ColumnData::I64(None) => Ok(Value::Null),
        ColumnData::I64(Some(v)) => Ok(Value::Int64(v)),
        ColumnData::F32(None) => Ok(Value::Null),
        ColumnData::F32(Some(v)) => Ok(Value::Float32(v)),
        ColumnData::F64(None) => Ok(Value::Null),
        ColumnData::F64(Some(v)) => Ok(Value::Float64(v)),
        ColumnData::String(None) => Ok(Value::Null),
        ColumnData::String(Some(v)) => Ok(Value::String(v.into_owned())),
        ColumnData::Guid(None) => Ok(Value::Null),
        ColumnData::Guid(Some(v)) => Ok(Value::Uuid(v)),
        ColumnData::Binary(None) => Ok(Value::Null),
        ColumnData::Binary(Some(v)) => Ok(Value::Bytes(v.into_owned())),
        ColumnData::Numeric(None) => Ok(Value::Null),
        ColumnData::Numeric(Some(v)) => Ok(Value::Decimal(v.to_string())),
        ColumnData::DateTime(None) => Ok(Value::Null),
        ColumnData::DateTime(Some(v)) => {
            let date = date_from_ce(CE_DAY_1900 + v.days())?;
            let nanos = v.seconds_fragments() as u64 * NANOS_PER_SECOND / LEGACY_TICKS_PER_SECOND;
            Ok(Value::DateTime(date.and_time(time_from_nanos(nanos)?)))
        }
        ColumnData::SmallDateTime(None) => Ok(Value::Null),
        ColumnData::SmallDateTime(Some(v)) => {
            let date = date_from_ce(CE_DAY_1900 + v.days() as i32)?;
            let nanos = v.seconds_fragments() as u64 * 60 * NANOS_PER_SECOND;
            Ok(Value::DateTime(date.and_time(time_from_nanos(nanos)?)))
        }
        ColumnData::DateTime2(None) => Ok(Value::Null),
        ColumnData::DateTime2(Some(v)) => Ok(Value::DateTime(datetime2_to_naive(&v)?)),
        ColumnData::DateTimeOffset(None) => Ok(Value::Null),
        ColumnData::DateTimeOffset(Some(v)) => {
            // The datetime2 part of a DATETIMEOFFSET is stored in UTC
            let naive = datetime2_to_naive(&v.datetime2())?;
            Ok(Value::DateTimeUtc(DateTime::<Utc>::from_naive_utc_and_offset(
                naive, Utc,
            )))
        }
        ColumnData::Date(None) => Ok(Value::Null),
        ColumnData::Date(Some(v)) => Ok(Value::Date(date_from_tds(&v)?)),
        ColumnData::Time(None) => Ok(Value::Null),
        ColumnData::Time(Some(v)) => Ok(Value::Time(time_from_tds(&v)?)),
        ColumnData::Xml(None) => Ok(Value::Null),
        ColumnData::Xml(Some(v)) => Ok(Value::String(v.into_owned().into_string())),
    }
}

/// Convert an outgoing value into column data of the declared type.
///
/// `None` and NULL become a NULL of the declared type. Integer widths are
/// checked, so an out-of-range value is a `TypeCast` error rather than a
/// silently truncated one.
pub(crate) fn to_column_data(
    value: Option<&Value>,
    db_type: DbType,
) -> Result<ColumnData<'static>> {
    let value = match value {
        None | Some(Value::Null) => return Ok(typed_null(db_type)),
        Some(v) => v.clone(),
    };

    let data = match db_type {
        DbType::Boolean => ColumnData::Bit(Some(bool::from_value(value)?)),
        DbType::TinyInt => ColumnData::U8(Some(u8::from_value(value)?)),
        DbType::SmallInt => ColumnData::I16(Some(i16::from_value(value)?)),
        DbType::Int => ColumnData::I32(Some(i32::from_value(value)?)),
        DbType::BigInt => ColumnData::I64(Some(i64::from_value(value)?)),
        DbType::Real => ColumnData::F32(Some(match value {
            Value::Float32(v) => v,
            Value::Float64(v) => v as f32,
            other => f64::from_value(other)? as f32,
        })),
        DbType::Float => ColumnData::F64(Some(match value {
            Value::Int64(v) => v as f64,
            other => f64::from_value(other)?,
        })),
        DbType::Decimal => ColumnData::Numeric(Some(numeric_from_value(&value)?)),
        DbType::String => ColumnData::String(Some(Cow::Owned(match value {
            Value::String(s) => s,
            other => other.to_string(),
        }))),
        DbType::Binary => ColumnData::Binary(Some(Cow::Owned(Vec::<u8>::from_value(value)?))),
        DbType::Guid => ColumnData::Guid(Some(match value {
            Value::String(s) => Uuid::parse_str(&s)
                .map_err(|e| SprocketError::TypeCast(format!("invalid uuid '{}': {}", s, e)))?,
            other => Uuid::from_value(other)?,
        })),
        DbType::Date => ColumnData::Date(Some(date_to_tds(NaiveDate::from_value(value)?)?)),
        DbType::Time => ColumnData::Time(Some(time_to_tds(NaiveTime::from_value(value)?))),
        DbType::DateTime => {
            ColumnData::DateTime2(Some(datetime2_to_tds(NaiveDateTime::from_value(value)?)?))
        }
        DbType::DateTimeOffset => {
            let utc = DateTime::<Utc>::from_value(value)?;
            ColumnData::DateTimeOffset(Some(DateTimeOffset::new(
                datetime2_to_tds(utc.naive_utc())?,
                0,
            )))
        }
    };
    Ok(data)
}

/// A NULL carrying the wire type of `db_type`
pub(crate) fn typed_null(db_type: DbType) -> ColumnData<'static> {
    match db_type {
        DbType::Boolean => ColumnData::Bit(None),
        DbType::TinyInt => ColumnData::U8(None),
        DbType::SmallInt => ColumnData::I16(None),
        DbType::Int => ColumnData::I32(None),
        DbType::BigInt => ColumnData::I64(None),
        DbType::Real => ColumnData::F32(None),
        DbType::Float => ColumnData::F64(None),
        DbType::Decimal => ColumnData::Numeric(None),
        DbType::String => ColumnData::String(None),
        DbType::Binary => ColumnData::Binary(None),
        DbType::Guid => ColumnData::Guid(None),
        DbType::Date => ColumnData::Date(None),
        DbType::Time => ColumnData::Time(None),
        DbType::DateTime => ColumnData::DateTime2(None),
        DbType::DateTimeOffset => ColumnData::DateTimeOffset(None),
    }
}

fn numeric_from_value(value: &Value) -> Result<Numeric> {
    let cast_error = || {
        SprocketError::TypeCast(format!(
            "cannot convert {} value '{}' to DECIMAL",
            value.kind(),
            value
        ))
    };
    match value {
        Value::Decimal(s) | Value::String(s) => parse_numeric(s).ok_or_else(cast_error),
        Value::Float32(_) | Value::Float64(_) => value
            .as_f64()
            .and_then(|f| parse_numeric(&f.to_string()))
            .ok_or_else(cast_error),
        other => other
            .as_i64()
            .map(|v| Numeric::new_with_scale(v as i128, 0))
            .ok_or_else(cast_error),
    }
}

/// Parse a plain decimal literal such as `-12.50`
pub(crate) fn parse_numeric(literal: &str) -> Option<Numeric> {
    let literal = literal.trim();
    let (negative, digits) = match literal.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, literal.strip_prefix('+').unwrap_or(literal)),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));

    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if whole.len() + fraction.len() > MAX_NUMERIC_PRECISION {
        return None;
    }

    let mut value: i128 = 0;
    for c in whole.chars().chain(fraction.chars()) {
        let digit = c.to_digit(10)?;
        value = value.checked_mul(10)?.checked_add(digit as i128)?;
    }
    let scale = u8::try_from(fraction.len())
        .ok()
        .filter(|s| (*s as usize) < MAX_NUMERIC_PRECISION)?;

    Some(Numeric::new_with_scale(
        if negative { -value } else { value },
        scale,
    ))
}

/// Re-express `numeric` with `scale` digits after the point, truncating
/// any excess digits. tiberius cannot encode a scale of 38 or more.
pub(crate) fn rescale_numeric(numeric: Numeric, scale: u8) -> Option<Numeric> {
    if scale as usize >= MAX_NUMERIC_PRECISION {
        return None;
    }
    let current = numeric.scale();
    let value = if scale >= current {
        numeric
            .value()
            .checked_mul(10i128.checked_pow((scale - current) as u32)?)?
    } else {
        numeric.value() / 10i128.checked_pow((current - scale) as u32)?
    };
    Some(Numeric::new_with_scale(value, scale))
}

/// Encode a timestamp as a legacy DATETIME
pub(crate) fn legacy_datetime(dt: NaiveDateTime) -> LegacyDateTime {
    let days = dt.date().num_days_from_ce() - CE_DAY_1900;
    let ticks = nanos_of_day(dt.time()) * LEGACY_TICKS_PER_SECOND / NANOS_PER_SECOND;
    LegacyDateTime::new(days, ticks as u32)
}

/// Encode a timestamp as a SMALLDATETIME, truncating to the minute
pub(crate) fn small_datetime(dt: NaiveDateTime) -> Result<SmallDateTime> {
    let days = u16::try_from(dt.date().num_days_from_ce() - CE_DAY_1900)
        .map_err(|_| out_of_range("SMALLDATETIME", &dt))?;
    let minutes = dt.time().num_seconds_from_midnight() / 60;
    Ok(SmallDateTime::new(days, minutes as u16))
}

fn out_of_range(target: &str, value: &dyn std::fmt::Display) -> SprocketError {
    SprocketError::TypeCast(format!("'{}' is out of range for {}", value, target))
}

fn date_from_ce(days: i32) -> Result<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days)
        .ok_or_else(|| SprocketError::TypeCast(format!("day number {} is out of range", days)))
}

fn date_from_tds(date: &Date) -> Result<NaiveDate> {
    date_from_ce(CE_DAY_0001 + date.days() as i32)
}

fn time_from_tds(time: &Time) -> Result<NaiveTime> {
    let per_increment = 10u64.pow(9u32.saturating_sub(time.scale() as u32));
    time_from_nanos(time.increments() * per_increment)
}

fn time_from_nanos(nanos: u64) -> Result<NaiveTime> {
    NaiveTime::from_num_seconds_from_midnight_opt(
        (nanos / NANOS_PER_SECOND) as u32,
        (nanos % NANOS_PER_SECOND) as u32,
    )
    .ok_or_else(|| SprocketError::TypeCast(format!("{}ns is not a valid time of day", nanos)))
}

fn datetime2_to_naive(dt: &DateTime2) -> Result<NaiveDateTime> {
    Ok(date_from_tds(&dt.date())?.and_time(time_from_tds(&dt.time())?))
}

fn nanos_of_day(time: NaiveTime) -> u64 {
    // Leap seconds are folded into the last representable instant
    let subsec = (time.nanosecond() as u64).min(NANOS_PER_SECOND - 1);
    time.num_seconds_from_midnight() as u64 * NANOS_PER_SECOND + subsec
}

fn date_to_tds(date: NaiveDate) -> Result<Date> {
    u32::try_from(date.num_days_from_ce() - CE_DAY_0001)
        .map(Date::new)
        .map_err(|_| out_of_range("DATE", &date))
}

fn time_to_tds(time: NaiveTime) -> Time {
    let per_increment = 10u64.pow(9 - TIME_SCALE as u32);
    Time::new(nanos_of_day(time) / per_increment, TIME_SCALE)
}

fn datetime2_to_tds(dt: NaiveDateTime) -> Result<DateTime2> {
    Ok(DateTime2::new(date_to_tds(dt.date())?, time_to_tds(dt.time())))
}
