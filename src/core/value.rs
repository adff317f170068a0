use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical column type of a core or extended field.
///
/// `Guid` is representable in a primary table but has no slot in the
/// extended value table, so the flat-table provider rejects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DbType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    Decimal,
    DateTime,
    Char,
    String,
    Binary,
    Guid,
}

impl DbType {
    /// Types stored through the `Int64` column of the extended value table.
    pub fn is_integer_family(self) -> bool {
        matches!(
            self,
            Self::Boolean | Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64
        )
    }

    pub fn is_decimal_family(self) -> bool {
        matches!(self, Self::Float | Self::Double | Self::Decimal)
    }

    pub fn is_string_family(self) -> bool {
        matches!(self, Self::Char | Self::String)
    }

    pub fn is_compatible(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (t, Value::Bool(_)) if t.is_integer_family() => true,
            (t, Value::Int(_)) if t.is_integer_family() => true,
            (t, Value::Decimal(_)) if t.is_decimal_family() => true,
            // Integers widen into the decimal family
            (t, Value::Int(_)) if t.is_decimal_family() => true,
            (Self::DateTime, Value::DateTime(_)) => true,
            (t, Value::Text(_)) if t.is_string_family() => true,
            (Self::Binary | Self::Guid, Value::Binary(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Boolean => "BOOLEAN",
            Self::Int8 => "INT8",
            Self::Int16 => "INT16",
            Self::Int32 => "INT32",
            Self::Int64 => "INT64",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::Decimal => "DECIMAL",
            Self::DateTime => "DATETIME",
            Self::Char => "CHAR",
            Self::String => "STRING",
            Self::Binary => "BINARY",
            Self::Guid => "GUID",
        };
        write!(f, "{}", name)
    }
}

/// A runtime field value. `Null` means "no value": for an extended property
/// it requests removal of the backing side-table row rather than storing a
/// database NULL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(f64),
    DateTime(NaiveDateTime),
    Text(String),
    Binary(Vec<u8>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Bool(_) => "BOOLEAN",
            Self::Int(_) => "INT64",
            Self::Decimal(_) => "DECIMAL",
            Self::DateTime(_) => "DATETIME",
            Self::Text(_) => "STRING",
            Self::Binary(_) => "BINARY",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Decimal(d) => Some(*d),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Decimal(a), Self::Decimal(b)) => {
                if a.is_nan() && b.is_nan() {
                    return true;
                }
                (a - b).abs() < f64::EPSILON
            }
            (Self::DateTime(a), Self::DateTime(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Binary(a), Self::Binary(b)) => a == b,
            (Self::Int(i), Self::Decimal(d)) | (Self::Decimal(d), Self::Int(i)) => {
                (*i as f64 - d).abs() < f64::EPSILON
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Decimal(d) => write!(f, "{}", d),
            Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            Self::Text(s) => write!(f, "{}", s),
            Self::Binary(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Self::Decimal(d)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Self::DateTime(dt)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Binary(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_equality() {
        assert_eq!(Value::Int(42), Value::Int(42));
        assert_eq!(Value::Text("a".into()), Value::Text("a".into()));
        assert_eq!(Value::Int(3), Value::Decimal(3.0));
        assert_ne!(Value::Int(1), Value::Int(2));
        assert_ne!(Value::Null, Value::Int(0));
    }

    #[test]
    fn test_type_compatibility() {
        assert!(DbType::Int64.is_compatible(&Value::Int(1)));
        assert!(DbType::Int64.is_compatible(&Value::Null));
        assert!(DbType::Boolean.is_compatible(&Value::Bool(true)));
        assert!(DbType::Decimal.is_compatible(&Value::Int(1)));
        assert!(!DbType::Int64.is_compatible(&Value::Text("x".into())));
        assert!(!DbType::DateTime.is_compatible(&Value::Int(0)));
    }

    #[test]
    fn test_type_families() {
        assert!(DbType::Boolean.is_integer_family());
        assert!(DbType::Int8.is_integer_family());
        assert!(DbType::Double.is_decimal_family());
        assert!(DbType::Char.is_string_family());
        assert!(!DbType::Guid.is_integer_family());
        assert!(!DbType::Guid.is_string_family());
    }
}
