#![forbid(unsafe_code)]

//! Conversion of loosely-typed filter payload values into the declared field type.
//!
//! Textual input is parsed strictly first (`"42"`, `"true"`, `"2024-05-01"`). When the strict
//! parse fails the decoder's native conversion runs, which trims and accepts the looser forms
//! the JSON decoder itself would produce (`"+42"`, `"42.0"`, `"1"` for booleans, dates carrying
//! a time).
//! Integer targets never truncate: fractional and out-of-range values fail.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use quarry_kernel_contracts::filter::FilterSet;
use quarry_kernel_contracts::value::{EnumDescriptor, EnumValue, FieldValue, ValueKind};
use rust_decimal::Decimal;
use serde_json::{Number, Value};

use crate::error::CoercionError;

const DESCRIBE_MAX_CHARS: usize = 64;

pub fn coerce(raw: Option<&Value>, kind: ValueKind) -> Result<FieldValue, CoercionError> {
    let raw = match raw {
        None | Some(Value::Null) => return Ok(FieldValue::Null),
        Some(raw) => raw,
    };
    match (raw, kind) {
        (Value::String(text), ValueKind::Text) => Ok(FieldValue::Text(text.clone())),
        (Value::String(text), ValueKind::Enum(descriptor)) => parse_enum(text, descriptor),
        (Value::String(text), _) => match parse_text(text, kind) {
            Some(value) => Ok(value),
            None => convert_native(raw, kind),
        },
        _ => convert_native(raw, kind),
    }
}

/// Reads the filter named `name` (case-insensitive) converted to `kind`. Absent reads as `Null`.
pub fn filter_value(
    filters: &FilterSet,
    name: &str,
    kind: ValueKind,
) -> Result<FieldValue, CoercionError> {
    coerce(filters.raw_value(name), kind)
}

fn parse_enum(
    text: &str,
    descriptor: &'static EnumDescriptor,
) -> Result<FieldValue, CoercionError> {
    descriptor
        .ordinal_of(text.trim())
        .map(|ordinal| FieldValue::Enum(EnumValue { descriptor, ordinal }))
        .ok_or_else(|| CoercionError::new(descriptor.name, format!("'{text}'")))
}

fn parse_text(text: &str, kind: ValueKind) -> Option<FieldValue> {
    match kind {
        ValueKind::Bool => {
            if text.eq_ignore_ascii_case("true") {
                Some(FieldValue::Bool(true))
            } else if text.eq_ignore_ascii_case("false") {
                Some(FieldValue::Bool(false))
            } else {
                None
            }
        }
        ValueKind::I8 => text.parse().ok().map(FieldValue::I8),
        ValueKind::I16 => text.parse().ok().map(FieldValue::I16),
        ValueKind::I32 => text.parse().ok().map(FieldValue::I32),
        ValueKind::I64 => text.parse().ok().map(FieldValue::I64),
        ValueKind::U8 => text.parse().ok().map(FieldValue::U8),
        ValueKind::U16 => text.parse().ok().map(FieldValue::U16),
        ValueKind::U32 => text.parse().ok().map(FieldValue::U32),
        ValueKind::U64 => text.parse().ok().map(FieldValue::U64),
        ValueKind::F32 => text
            .parse::<f32>()
            .ok()
            .filter(|f| f.is_finite())
            .map(FieldValue::F32),
        ValueKind::F64 => text
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(FieldValue::F64),
        ValueKind::Decimal => Decimal::from_str(text).ok().map(FieldValue::Decimal),
        ValueKind::Date => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .map(FieldValue::Date),
        ValueKind::DateTime => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|d| FieldValue::DateTime(d.with_timezone(&Utc))),
        ValueKind::Text => Some(FieldValue::Text(text.to_string())),
        ValueKind::Enum(_) => None,
    }
}

fn convert_native(raw: &Value, kind: ValueKind) -> Result<FieldValue, CoercionError> {
    let converted = match raw {
        Value::Bool(b) => from_bool(*b, kind),
        Value::Number(n) => from_number(n, kind),
        Value::String(s) => from_lenient_text(s.trim(), kind),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    };
    converted.ok_or_else(|| CoercionError::new(kind.name(), describe(raw)))
}

fn describe(raw: &Value) -> String {
    let text = raw.to_string();
    if text.chars().count() <= DESCRIBE_MAX_CHARS {
        return text;
    }
    let mut cut: String = text.chars().take(DESCRIBE_MAX_CHARS).collect();
    cut.push_str("...");
    cut
}

fn from_bool(b: bool, kind: ValueKind) -> Option<FieldValue> {
    match kind {
        ValueKind::Bool => Some(FieldValue::Bool(b)),
        ValueKind::Text => Some(FieldValue::Text(b.to_string())),
        _ => from_integral(i128::from(b), kind),
    }
}

fn from_number(n: &Number, kind: ValueKind) -> Option<FieldValue> {
    match kind {
        ValueKind::Bool => match integral(n)? {
            0 => Some(FieldValue::Bool(false)),
            1 => Some(FieldValue::Bool(true)),
            _ => None,
        },
        ValueKind::F32 | ValueKind::F64 => from_float(n.as_f64()?, kind),
        ValueKind::Decimal => decimal_from_text(&n.to_string()),
        ValueKind::Text => Some(FieldValue::Text(n.to_string())),
        ValueKind::Date | ValueKind::DateTime | ValueKind::Enum(_) => None,
        _ => from_integral(integral(n)?, kind),
    }
}

fn from_lenient_text(s: &str, kind: ValueKind) -> Option<FieldValue> {
    match kind {
        ValueKind::Bool => match s {
            "1" => Some(FieldValue::Bool(true)),
            "0" => Some(FieldValue::Bool(false)),
            _ => None,
        },
        ValueKind::F32 | ValueKind::F64 => from_float(s.parse::<f64>().ok()?, kind),
        ValueKind::Decimal => decimal_from_text(s),
        ValueKind::Date => DateTime::parse_from_rfc3339(s)
            .map(|d| d.date_naive())
            .or_else(|_| parse_naive_datetime(s).map(|d| d.date()))
            .ok()
            .map(FieldValue::Date),
        ValueKind::DateTime => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .or_else(|| parse_naive_datetime(s).ok())
            .map(|d| FieldValue::DateTime(d.and_utc())),
        ValueKind::Text | ValueKind::Enum(_) => None,
        _ => {
            let unsigned = s.strip_prefix('+').unwrap_or(s);
            let value = unsigned
                .parse::<i128>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral_f64))?;
            from_integral(value, kind)
        }
    }
}

fn parse_naive_datetime(s: &str) -> chrono::ParseResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
}

fn decimal_from_text(s: &str) -> Option<FieldValue> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
        .map(FieldValue::Decimal)
}

fn from_float(f: f64, kind: ValueKind) -> Option<FieldValue> {
    if !f.is_finite() {
        return None;
    }
    match kind {
        ValueKind::F32 if f.abs() <= f64::from(f32::MAX) => Some(FieldValue::F32(f as f32)),
        ValueKind::F64 => Some(FieldValue::F64(f)),
        _ => None,
    }
}

fn integral(n: &Number) -> Option<i128> {
    if let Some(i) = n.as_i64() {
        return Some(i128::from(i));
    }
    if let Some(u) = n.as_u64() {
        return Some(i128::from(u));
    }
    n.as_f64().and_then(integral_f64)
}

fn integral_f64(f: f64) -> Option<i128> {
    if !f.is_finite() || f.fract() != 0.0 {
        return None;
    }
    // Saturating cast; anything past the target width is rejected by `from_integral`.
    Some(f as i128)
}

fn from_integral(v: i128, kind: ValueKind) -> Option<FieldValue> {
    match kind {
        ValueKind::I8 => i8::try_from(v).ok().map(FieldValue::I8),
        ValueKind::I16 => i16::try_from(v).ok().map(FieldValue::I16),
        ValueKind::I32 => i32::try_from(v).ok().map(FieldValue::I32),
        ValueKind::I64 => i64::try_from(v).ok().map(FieldValue::I64),
        ValueKind::U8 => u8::try_from(v).ok().map(FieldValue::U8),
        ValueKind::U16 => u16::try_from(v).ok().map(FieldValue::U16),
        ValueKind::U32 => u32::try_from(v).ok().map(FieldValue::U32),
        ValueKind::U64 => u64::try_from(v).ok().map(FieldValue::U64),
        _ => None,
    }
}
