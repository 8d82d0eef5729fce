//! Host values and engine type tags.

use indexmap::IndexMap;

/// Largest integer magnitude a [`Value::Number`] holds exactly (2^53).
pub const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_992;

/// The engine's storage class of a column or function argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum SqlType {
    /// 64-bit signed integer.
    Integer = 1,
    /// 64-bit float.
    Float = 2,
    /// UTF-8 text.
    Text = 3,
    /// Raw bytes.
    Blob = 4,
    /// SQL NULL.
    Null = 5,
}

impl SqlType {
    /// Maps an engine type code; unknown codes read as `Null`.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Integer,
            2 => Self::Float,
            3 => Self::Text,
            4 => Self::Blob,
            _ => Self::Null,
        }
    }
}

/// A host value crossing the engine boundary.
///
/// Every variant can be bound to a statement parameter and returned from a
/// host function. Reads produce `Null`, `Number`, `BigInt`, `Text` or `Blob`;
/// `Bool` only exists on the bind side, where it becomes integer 0 or 1.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean, stored as integer 0 or 1.
    Bool(bool),
    /// A double-precision number.
    Number(f64),
    /// An exact 64-bit integer.
    BigInt(i64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
}

impl Value {
    /// Returns true for `Null`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the value as a float if it is numeric.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::BigInt(n) => Some(*n as f64),
            Self::Bool(b) => Some(f64::from(u8::from(*b))),
            _ => None,
        }
    }

    /// Returns the value as an integer if it is an integral number.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::BigInt(n) => Some(*n),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Number(n) if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER as f64 => {
                Some(*n as i64)
            }
            _ => None,
        }
    }

    /// Returns the text if this is a `Text` value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the bytes if this is a `Blob` value.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the storage class this value is bound as.
    #[must_use]
    pub const fn sql_type(&self) -> SqlType {
        match self {
            Self::Null => SqlType::Null,
            Self::Bool(_) | Self::BigInt(_) => SqlType::Integer,
            Self::Number(_) => SqlType::Float,
            Self::Text(_) => SqlType::Text,
            Self::Blob(_) => SqlType::Blob,
        }
    }
}

/// Returns `n` if it is an integer that fits in an `i32`.
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
pub(crate) fn exact_i32(n: f64) -> Option<i32> {
    if n.fract() == 0.0 && n >= f64::from(i32::MIN) && n <= f64::from(i32::MAX) {
        Some(n as i32)
    } else {
        None
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    #[allow(clippy::cast_precision_loss)]
    fn from(n: i64) -> Self {
        if n.unsigned_abs() <= MAX_SAFE_INTEGER.unsigned_abs() {
            Self::Number(n as f64)
        } else {
            Self::BigInt(n)
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Blob(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Self::Blob(b.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// One result row keyed by column name, in column order.
pub type Row = IndexMap<String, Value>;

/// Parameters bound to a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    /// Values bound to placeholders 1, 2, 3, ...
    Positional(Vec<Value>),
    /// Values bound by placeholder name, prefix included (`:a`, `$a`, `@a`).
    Named(Vec<(String, Value)>),
}

impl Params {
    /// Builds named parameters from `(name, value)` pairs.
    pub fn named<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Returns true if there is nothing to bind.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Positional(values) => values.is_empty(),
            Self::Named(pairs) => pairs.is_empty(),
        }
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Self::Positional(values)
    }
}

impl<const N: usize> From<[Value; N]> for Params {
    fn from(values: [Value; N]) -> Self {
        Self::Positional(values.into())
    }
}
