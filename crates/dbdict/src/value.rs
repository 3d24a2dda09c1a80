use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::TableError;

/// A single SQL value, independent of the driver that produced it.
///
/// Keys, column values and bound parameters all travel as `Value`s. The
/// variants mirror SQLite's storage classes:
/// - `Null` -> NULL
/// - `Integer` -> INTEGER
/// - `Real` -> REAL
/// - `Text` -> TEXT
/// - `Blob` -> BLOB
///
/// Serialized untagged: numbers, strings and `null` map directly, blobs
/// become arrays of bytes and non-finite reals become `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    #[serde(serialize_with = "serialize_real")]
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// A row as a column name -> value mapping.
pub type Row = BTreeMap<String, Value>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Integers are widened so that REAL columns holding whole numbers still read back.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(f) => Some(*f),
            Value::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// A hashable stand-in with the same equality as `Value` for every key
    /// SQLite can store.
    pub(crate) fn key_form(&self) -> KeyForm<'_> {
        match self {
            Value::Null => KeyForm::Null,
            Value::Integer(n) => KeyForm::Integer(*n),
            // -0.0 == 0.0, so both hash as 0.0
            Value::Real(f) if *f == 0.0 => KeyForm::Real(0),
            Value::Real(f) => KeyForm::Real(f.to_bits()),
            Value::Text(s) => KeyForm::Text(s),
            Value::Blob(b) => KeyForm::Blob(b),
        }
    }
}

fn serialize_real<S: Serializer>(f: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if f.is_finite() {
        serializer.serialize_f64(*f)
    } else {
        serializer.serialize_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum KeyForm<'a> {
    Null,
    Integer(i64),
    Real(u64),
    Text(&'a str),
    Blob(&'a [u8]),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Real(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
            Value::Blob(b) => write!(f, "<blob {} bytes>", b.len()),
        }
    }
}

macro_rules! from_integer {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::Integer(i64::from(n))
                }
            }
        )*
    };
}

from_integer!(i8, i16, i32, i64, u8, u16, u32, bool);

impl TryFrom<u64> for Value {
    type Error = TableError;

    fn try_from(n: u64) -> Result<Self, Self::Error> {
        i64::try_from(n)
            .map(Value::Integer)
            .map_err(|_| TableError::IntegerOverflow(n))
    }
}

impl TryFrom<usize> for Value {
    type Error = TableError;

    fn try_from(n: usize) -> Result<Self, Self::Error> {
        Value::try_from(n as u64)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Real(f64::from(f))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Real(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Text(s.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Blob(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Blob(b.to_vec())
    }
}

impl From<&Value> for Value {
    fn from(v: &Value) -> Self {
        v.clone()
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}
