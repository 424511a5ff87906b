use rust_decimal::{Decimal, prelude::ToPrimitive};
use std::fmt::Write;
use time::{Date, PrimitiveDateTime, Time};
use uuid::Uuid;

/// A typed field value. A variant carrying `None` is a typed NULL: declared
/// fields use it as the type template that drives literal quoting and
/// coercion of values read back from the engine.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Boolean(Option<bool>),
    Int8(Option<i8>),
    Int16(Option<i16>),
    Int32(Option<i32>),
    Int64(Option<i64>),
    Float32(Option<f32>),
    Float64(Option<f64>),
    Decimal(Option<Decimal>),
    Varchar(Option<String>),
    Blob(Option<Box<[u8]>>),
    Date(Option<Date>),
    Time(Option<Time>),
    Timestamp(Option<PrimitiveDateTime>),
    Uuid(Option<Uuid>),
    /// Engine-maintained per-row version marker, kept as the opaque text the
    /// engine reported (`xmin` transaction id, `0x...` rowversion bytes).
    Rowversion(Option<String>),
}

/// Portable logical type of a field, the granularity the metadata
/// normalization and quoting rules care about.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Boolean,
    #[default]
    Text,
    Numeric,
    Rowversion,
}

impl Value {
    pub fn kind(&self) -> FieldKind {
        match self {
            Value::Boolean(..) => FieldKind::Boolean,
            Value::Int8(..)
            | Value::Int16(..)
            | Value::Int32(..)
            | Value::Int64(..)
            | Value::Float32(..)
            | Value::Float64(..)
            | Value::Decimal(..) => FieldKind::Numeric,
            Value::Rowversion(..) => FieldKind::Rowversion,
            _ => FieldKind::Text,
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Value::Null
            | Value::Boolean(None)
            | Value::Int8(None)
            | Value::Int16(None)
            | Value::Int32(None)
            | Value::Int64(None)
            | Value::Float32(None)
            | Value::Float64(None)
            | Value::Decimal(None)
            | Value::Varchar(None)
            | Value::Blob(None)
            | Value::Date(None)
            | Value::Time(None)
            | Value::Timestamp(None)
            | Value::Uuid(None)
            | Value::Rowversion(None) => true,
            _ => false,
        }
    }

    /// Same variant with the payload removed, preserving the type template.
    pub fn cleared(&self) -> Value {
        match self {
            Value::Null => Value::Null,
            Value::Boolean(..) => Value::Boolean(None),
            Value::Int8(..) => Value::Int8(None),
            Value::Int16(..) => Value::Int16(None),
            Value::Int32(..) => Value::Int32(None),
            Value::Int64(..) => Value::Int64(None),
            Value::Float32(..) => Value::Float32(None),
            Value::Float64(..) => Value::Float64(None),
            Value::Decimal(..) => Value::Decimal(None),
            Value::Varchar(..) => Value::Varchar(None),
            Value::Blob(..) => Value::Blob(None),
            Value::Date(..) => Value::Date(None),
            Value::Time(..) => Value::Time(None),
            Value::Timestamp(..) => Value::Timestamp(None),
            Value::Uuid(..) => Value::Uuid(None),
            Value::Rowversion(..) => Value::Rowversion(None),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int8(Some(v)) => Some(*v as i64),
            Value::Int16(Some(v)) => Some(*v as i64),
            Value::Int32(Some(v)) => Some(*v as i64),
            Value::Int64(Some(v)) => Some(*v),
            Value::Float32(Some(v)) => Some(*v as i64),
            Value::Float64(Some(v)) => Some(*v as i64),
            Value::Decimal(Some(v)) => v.to_i64(),
            Value::Varchar(Some(v)) => v.trim().parse().ok(),
            _ => None,
        }
    }

    /// Unquoted textual form, used for LIKE patterns and metadata values.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Boolean(Some(v)) => Some(v.to_string()),
            Value::Int8(Some(v)) => Some(v.to_string()),
            Value::Int16(Some(v)) => Some(v.to_string()),
            Value::Int32(Some(v)) => Some(v.to_string()),
            Value::Int64(Some(v)) => Some(v.to_string()),
            Value::Float32(Some(v)) => Some(v.to_string()),
            Value::Float64(Some(v)) => Some(v.to_string()),
            Value::Decimal(Some(v)) => Some(v.to_string()),
            Value::Varchar(Some(v)) => Some(v.clone()),
            Value::Uuid(Some(v)) => Some(v.to_string()),
            Value::Rowversion(Some(v)) => Some(v.clone()),
            _ => None,
        }
    }
}

/// Reshapes `value` to the variant of `template`, so that server-reported
/// values land in a field under its declared logical type. Incompatible
/// pairs fall back to the incoming value unchanged.
pub fn conform(value: Value, template: &Value) -> Value {
    if value.is_null() {
        return template.cleared();
    }
    match template {
        Value::Boolean(..) => match &value {
            Value::Boolean(..) => value,
            Value::Int8(Some(v)) => Value::Boolean(Some(*v != 0)),
            Value::Int16(Some(v)) => Value::Boolean(Some(*v != 0)),
            Value::Int32(Some(v)) => Value::Boolean(Some(*v != 0)),
            Value::Int64(Some(v)) => Value::Boolean(Some(*v != 0)),
            Value::Varchar(Some(v)) => match v.as_str() {
                "t" | "true" | "TRUE" | "1" => Value::Boolean(Some(true)),
                "f" | "false" | "FALSE" | "0" => Value::Boolean(Some(false)),
                _ => value,
            },
            _ => value,
        },
        Value::Int8(..) => value.as_i64().map(|v| Value::Int8(Some(v as i8))).unwrap_or(value),
        Value::Int16(..) => value.as_i64().map(|v| Value::Int16(Some(v as i16))).unwrap_or(value),
        Value::Int32(..) => value.as_i64().map(|v| Value::Int32(Some(v as i32))).unwrap_or(value),
        Value::Int64(..) => value.as_i64().map(|v| Value::Int64(Some(v))).unwrap_or(value),
        Value::Float32(..) => match &value {
            Value::Float32(..) => value,
            Value::Float64(Some(v)) => Value::Float32(Some(*v as f32)),
            Value::Varchar(Some(v)) => v
                .trim()
                .parse()
                .map(|v| Value::Float32(Some(v)))
                .unwrap_or(value),
            _ => value,
        },
        Value::Float64(..) => match &value {
            Value::Float64(..) => value,
            Value::Float32(Some(v)) => Value::Float64(Some(*v as f64)),
            Value::Varchar(Some(v)) => v
                .trim()
                .parse()
                .map(|v| Value::Float64(Some(v)))
                .unwrap_or(value),
            _ => value,
        },
        Value::Decimal(..) => match &value {
            Value::Decimal(..) => value,
            Value::Int8(Some(v)) => Value::Decimal(Some((*v).into())),
            Value::Int16(Some(v)) => Value::Decimal(Some((*v).into())),
            Value::Int32(Some(v)) => Value::Decimal(Some((*v).into())),
            Value::Int64(Some(v)) => Value::Decimal(Some((*v).into())),
            Value::Varchar(Some(v)) => v
                .trim()
                .parse()
                .map(|v| Value::Decimal(Some(v)))
                .unwrap_or(value),
            _ => value,
        },
        Value::Varchar(..) => match &value {
            Value::Varchar(..) => value,
            _ => value
                .as_text()
                .map(|v| Value::Varchar(Some(v)))
                .unwrap_or(value),
        },
        Value::Rowversion(..) => match &value {
            Value::Rowversion(..) => value,
            Value::Varchar(Some(v)) => Value::Rowversion(Some(v.clone())),
            Value::Int32(Some(v)) => Value::Rowversion(Some(v.to_string())),
            Value::Int64(Some(v)) => Value::Rowversion(Some(v.to_string())),
            Value::Blob(Some(bytes)) => {
                let mut hex = String::with_capacity(2 + bytes.len() * 2);
                hex.push_str("0x");
                for b in bytes.iter() {
                    let _ = write!(hex, "{:02X}", b);
                }
                Value::Rowversion(Some(hex))
            }
            _ => value,
        },
        _ => value,
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(Some(v))
    }
}
impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Int8(Some(v))
    }
}
impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Int16(Some(v))
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(Some(v))
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(Some(v))
    }
}
impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float32(Some(v))
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(Some(v))
    }
}
impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(Some(v))
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Varchar(Some(v.to_owned()))
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Varchar(Some(v))
    }
}
impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(Some(v.into()))
    }
}
impl From<Date> for Value {
    fn from(v: Date) -> Self {
        Value::Date(Some(v))
    }
}
impl From<Time> for Value {
    fn from(v: Time) -> Self {
        Value::Time(Some(v))
    }
}
impl From<PrimitiveDateTime> for Value {
    fn from(v: PrimitiveDateTime) -> Self {
        Value::Timestamp(Some(v))
    }
}
impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(Some(v))
    }
}
