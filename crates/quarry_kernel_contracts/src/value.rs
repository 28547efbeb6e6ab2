#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

/// Declared member names of an enumeration field, in ordinal order.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct EnumDescriptor {
    pub name: &'static str,
    pub members: &'static [&'static str],
}

impl EnumDescriptor {
    pub fn ordinal_of(&self, member: &str) -> Option<usize> {
        self.members.iter().position(|m| *m == member)
    }
}

/// Statically declared type of a filterable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Decimal,
    Date,
    DateTime,
    Text,
    Enum(&'static EnumDescriptor),
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::I8 => "i8",
            ValueKind::I16 => "i16",
            ValueKind::I32 => "i32",
            ValueKind::I64 => "i64",
            ValueKind::U8 => "u8",
            ValueKind::U16 => "u16",
            ValueKind::U32 => "u32",
            ValueKind::U64 => "u64",
            ValueKind::F32 => "f32",
            ValueKind::F64 => "f64",
            ValueKind::Decimal => "decimal",
            ValueKind::Date => "date",
            ValueKind::DateTime => "datetime",
            ValueKind::Text => "text",
            ValueKind::Enum(descriptor) => descriptor.name,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ValueKind::I8
                | ValueKind::I16
                | ValueKind::I32
                | ValueKind::I64
                | ValueKind::U8
                | ValueKind::U16
                | ValueKind::U32
                | ValueKind::U64
                | ValueKind::F32
                | ValueKind::F64
                | ValueKind::Decimal
        )
    }

    /// Kinds with a total order usable by the relational comparators.
    pub fn is_ordered(self) -> bool {
        self.is_numeric()
            || matches!(
                self,
                ValueKind::Date | ValueKind::DateTime | ValueKind::Enum(_)
            )
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub descriptor: &'static EnumDescriptor,
    pub ordinal: usize,
}

impl EnumValue {
    pub fn name(&self) -> &'static str {
        self.descriptor.members.get(self.ordinal).copied().unwrap_or("")
    }
}

/// A field value typed by its declared [`ValueKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Text(String),
    Enum(EnumValue),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn kind(&self) -> Option<ValueKind> {
        Some(match self {
            FieldValue::Null => return None,
            FieldValue::Bool(_) => ValueKind::Bool,
            FieldValue::I8(_) => ValueKind::I8,
            FieldValue::I16(_) => ValueKind::I16,
            FieldValue::I32(_) => ValueKind::I32,
            FieldValue::I64(_) => ValueKind::I64,
            FieldValue::U8(_) => ValueKind::U8,
            FieldValue::U16(_) => ValueKind::U16,
            FieldValue::U32(_) => ValueKind::U32,
            FieldValue::U64(_) => ValueKind::U64,
            FieldValue::F32(_) => ValueKind::F32,
            FieldValue::F64(_) => ValueKind::F64,
            FieldValue::Decimal(_) => ValueKind::Decimal,
            FieldValue::Date(_) => ValueKind::Date,
            FieldValue::DateTime(_) => ValueKind::DateTime,
            FieldValue::Text(_) => ValueKind::Text,
            FieldValue::Enum(v) => ValueKind::Enum(v.descriptor),
        })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Orders two values of the same kind. Mixed kinds and nulls have no order.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Bool(a), FieldValue::Bool(b)) => Some(a.cmp(b)),
            (FieldValue::I8(a), FieldValue::I8(b)) => Some(a.cmp(b)),
            (FieldValue::I16(a), FieldValue::I16(b)) => Some(a.cmp(b)),
            (FieldValue::I32(a), FieldValue::I32(b)) => Some(a.cmp(b)),
            (FieldValue::I64(a), FieldValue::I64(b)) => Some(a.cmp(b)),
            (FieldValue::U8(a), FieldValue::U8(b)) => Some(a.cmp(b)),
            (FieldValue::U16(a), FieldValue::U16(b)) => Some(a.cmp(b)),
            (FieldValue::U32(a), FieldValue::U32(b)) => Some(a.cmp(b)),
            (FieldValue::U64(a), FieldValue::U64(b)) => Some(a.cmp(b)),
            (FieldValue::F32(a), FieldValue::F32(b)) => a.partial_cmp(b),
            (FieldValue::F64(a), FieldValue::F64(b)) => a.partial_cmp(b),
            (FieldValue::Decimal(a), FieldValue::Decimal(b)) => Some(a.cmp(b)),
            (FieldValue::Date(a), FieldValue::Date(b)) => Some(a.cmp(b)),
            (FieldValue::DateTime(a), FieldValue::DateTime(b)) => Some(a.cmp(b)),
            (FieldValue::Text(a), FieldValue::Text(b)) => Some(a.cmp(b)),
            (FieldValue::Enum(a), FieldValue::Enum(b)) if a.descriptor == b.descriptor => {
                Some(a.ordinal.cmp(&b.ordinal))
            }
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(v) => Value::from(*v),
            FieldValue::I8(v) => Value::from(*v),
            FieldValue::I16(v) => Value::from(*v),
            FieldValue::I32(v) => Value::from(*v),
            FieldValue::I64(v) => Value::from(*v),
            FieldValue::U8(v) => Value::from(*v),
            FieldValue::U16(v) => Value::from(*v),
            FieldValue::U32(v) => Value::from(*v),
            FieldValue::U64(v) => Value::from(*v),
            FieldValue::F32(v) => Value::from(f64::from(*v)),
            FieldValue::F64(v) => Value::from(*v),
            FieldValue::Decimal(v) => Value::String(v.to_string()),
            FieldValue::Date(v) => Value::String(v.format("%Y-%m-%d").to_string()),
            FieldValue::DateTime(v) => {
                Value::String(v.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            FieldValue::Text(v) => Value::String(v.clone()),
            FieldValue::Enum(v) => Value::String(v.name().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static COLOR: EnumDescriptor = EnumDescriptor {
        name: "Color",
        members: &["Red", "Green", "Blue"],
    };

    #[test]
    fn compare_requires_matching_kinds() {
        assert_eq!(
            FieldValue::I32(1).compare(&FieldValue::I32(2)),
            Some(Ordering::Less)
        );
        assert_eq!(FieldValue::I32(1).compare(&FieldValue::I64(2)), None);
        assert_eq!(FieldValue::Null.compare(&FieldValue::Null), None);
    }

    #[test]
    fn enum_values_order_by_ordinal_and_render_member_name() {
        let red = FieldValue::Enum(EnumValue {
            descriptor: &COLOR,
            ordinal: 0,
        });
        let blue = FieldValue::Enum(EnumValue {
            descriptor: &COLOR,
            ordinal: 2,
        });
        assert_eq!(red.compare(&blue), Some(Ordering::Less));
        assert_eq!(blue.to_json(), Value::String("Blue".to_string()));
        assert_eq!(COLOR.ordinal_of("Green"), Some(1));
        assert_eq!(COLOR.ordinal_of("green"), None);
    }

    #[test]
    fn kinds_report_ordering_support() {
        assert!(ValueKind::Decimal.is_ordered());
        assert!(ValueKind::Enum(&COLOR).is_ordered());
        assert!(!ValueKind::Text.is_ordered());
        assert!(!ValueKind::Bool.is_ordered());
    }
}
