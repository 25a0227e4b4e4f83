// ABOUTME: Named pure transforms that coerce raw SAP values into destination values
// ABOUTME: Also decodes the UpdateDate/UpdateTS marker pair into a single timestamp

use super::value::Value;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::prelude::ToPrimitive;
use std::fmt;

/// A transform rejected a raw value. The row carrying it is dropped, the sync continues.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransformError {
    #[error("{transform}: '{value}' is not a number")]
    NotNumeric {
        transform: &'static str,
        value: String,
    },
    #[error("{transform}: '{value}' is not a valid timestamp")]
    InvalidTimestamp {
        transform: &'static str,
        value: String,
    },
    #[error("{transform}: {value} is out of range")]
    OutOfRange {
        transform: &'static str,
        value: String,
    },
    #[error("{transform}: cannot convert a {kind} value")]
    Unsupported {
        transform: &'static str,
        kind: &'static str,
    },
}

pub type TransformFn = fn(&Value) -> Result<Value, TransformError>;

/// A named transform function, bound to a destination column when a mapping is declared.
#[derive(Clone, Copy)]
pub struct Transform {
    name: &'static str,
    func: TransformFn,
}

impl Transform {
    /// Any value to its text form, null stays null.
    pub const TEXT: Transform = Transform::new("safe_string", to_text);
    /// Numbers and numeric strings to `Float`, blank strings to null.
    pub const FLOAT: Transform = Transform::new("safe_float", to_float);
    /// Numbers and numeric strings to `Int`, fractions truncated.
    pub const INTEGER: Transform = Transform::new("safe_int", to_integer);
    /// Datetimes, dates, ISO strings and SAP day serials to `DateTime`.
    pub const TIMESTAMP: Transform = Transform::new("safe_datetime", to_timestamp);

    pub const fn new(name: &'static str, func: TransformFn) -> Self {
        Self { name, func }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn apply(&self, value: &Value) -> Result<Value, TransformError> {
        (self.func)(value)
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Transform").field(&self.name).finish()
    }
}

impl PartialEq for Transform {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Text(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn to_text(value: &Value) -> Result<Value, TransformError> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Text(s) => Ok(Value::Text(s.clone())),
        Value::Bytes(_) => Err(TransformError::Unsupported {
            transform: "safe_string",
            kind: value.kind(),
        }),
        other => Ok(Value::Text(other.to_string())),
    }
}

fn to_float(value: &Value) -> Result<Value, TransformError> {
    if is_blank(value) {
        return Ok(Value::Null);
    }
    let not_numeric = || TransformError::NotNumeric {
        transform: "safe_float",
        value: value.to_string(),
    };
    match value {
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::Decimal(d) => d.to_f64().map(Value::Float).ok_or_else(not_numeric),
        Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        Value::Text(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| not_numeric()),
        other => Err(TransformError::Unsupported {
            transform: "safe_float",
            kind: other.kind(),
        }),
    }
}

fn float_to_int(f: f64, original: &Value) -> Result<Value, TransformError> {
    let truncated = f.trunc();
    if !truncated.is_finite() || truncated < i64::MIN as f64 || truncated > i64::MAX as f64 {
        return Err(TransformError::OutOfRange {
            transform: "safe_int",
            value: original.to_string(),
        });
    }
    Ok(Value::Int(truncated as i64))
}

fn to_integer(value: &Value) -> Result<Value, TransformError> {
    if is_blank(value) {
        return Ok(Value::Null);
    }
    match value {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Float(f) => float_to_int(*f, value),
        Value::Decimal(d) => d.trunc().to_i64().map(Value::Int).ok_or_else(|| {
            TransformError::OutOfRange {
                transform: "safe_int",
                value: d.to_string(),
            }
        }),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Text(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Ok(Value::Int(i));
            }
            match s.parse::<f64>() {
                Ok(f) => float_to_int(f, value),
                Err(_) => Err(TransformError::NotNumeric {
                    transform: "safe_int",
                    value: s.to_string(),
                }),
            }
        }
        other => Err(TransformError::Unsupported {
            transform: "safe_int",
            kind: other.kind(),
        }),
    }
}

/// SAP serial dates count days from this epoch.
fn sap_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

fn from_day_serial(days: i64, original: &Value) -> Result<Value, TransformError> {
    if days <= 0 {
        return Ok(Value::Null);
    }
    Duration::try_days(days)
        .and_then(|offset| sap_epoch().checked_add_signed(offset))
        .map(Value::DateTime)
        .ok_or_else(|| TransformError::OutOfRange {
            transform: "safe_datetime",
            value: original.to_string(),
        })
}

/// Parse the ISO-8601 shapes SAP exports and drivers hand back as text.
pub fn parse_iso_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn to_timestamp(value: &Value) -> Result<Value, TransformError> {
    if is_blank(value) {
        return Ok(Value::Null);
    }
    match value {
        Value::DateTime(dt) => Ok(Value::DateTime(*dt)),
        Value::Date(d) => Ok(d.and_hms_opt(0, 0, 0).map(Value::DateTime).unwrap_or(Value::Null)),
        Value::Text(s) => parse_iso_datetime(s).map(Value::DateTime).ok_or_else(|| {
            TransformError::InvalidTimestamp {
                transform: "safe_datetime",
                value: s.clone(),
            }
        }),
        Value::Int(days) => from_day_serial(*days, value),
        Value::Float(f) if !f.is_finite() => Err(TransformError::OutOfRange {
            transform: "safe_datetime",
            value: value.to_string(),
        }),
        Value::Float(f) => from_day_serial(f.trunc() as i64, value),
        Value::Decimal(d) => match d.trunc().to_i64() {
            Some(days) => from_day_serial(days, value),
            None => Err(TransformError::OutOfRange {
                transform: "safe_datetime",
                value: value.to_string(),
            }),
        },
        other => Err(TransformError::Unsupported {
            transform: "safe_datetime",
            kind: other.kind(),
        }),
    }
}

/// Decode an `HHMMSS` ticks value (leading zeros dropped, so 9:30:15 is 93015).
///
/// Returns `None` for negative values, values wider than six digits, or
/// components outside a valid time of day.
pub fn decode_ticks(ticks: i64) -> Option<NaiveTime> {
    if !(0..=999_999).contains(&ticks) {
        return None;
    }
    let padded = format!("{:06}", ticks);
    let hours: u32 = padded[0..2].parse().ok()?;
    let minutes: u32 = padded[2..4].parse().ok()?;
    let seconds: u32 = padded[4..6].parse().ok()?;
    NaiveTime::from_hms_opt(hours, minutes, seconds)
}

/// Encode the time of day of a timestamp as `HHMMSS` ticks.
pub fn encode_ticks(ts: &NaiveDateTime) -> i64 {
    i64::from(ts.hour()) * 10_000 + i64::from(ts.minute()) * 100 + i64::from(ts.second())
}

fn marker_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::DateTime(dt) => Some(dt.date()),
        Value::Date(d) => Some(*d),
        Value::Text(s) => parse_iso_datetime(s).map(|dt| dt.date()),
        _ => None,
    }
}

fn marker_ticks(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
        Value::Decimal(d) if d.fract().is_zero() => d.to_i64(),
        Value::Text(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Combine the date marker and the ticks marker into one timestamp.
///
/// The date supplies the calendar day; its time of day is replaced by the
/// decoded ticks. Any missing, non-numeric or out-of-range marker yields `None`
/// rather than a defaulted timestamp.
pub fn combine_markers(date: Option<&Value>, ticks: Option<&Value>) -> Option<NaiveDateTime> {
    let date = marker_date(date?)?;
    let time = decode_ticks(marker_ticks(ticks?)?)?;
    Some(date.and_time(time))
}
