//! Dynamic document value type.

use chrono::{DateTime, FixedOffset};
use std::collections::BTreeMap;
use std::fmt;

/// A dynamic document value.
///
/// This is the value domain documents are made of: JSON-like scalars and
/// containers plus the `BINARY` and `TIME` pseudo-types. Pseudo-typed values
/// the tool does not understand are carried as [`Value::Opaque`] so they can
/// still be copied, but they never order against anything.
#[derive(Debug, Clone)]
pub enum Value {
    /// Ordered sequence of values.
    Array(Vec<Value>),
    /// Boolean value.
    Bool(bool),
    /// Null value.
    Null,
    /// Double precision number. Non-finite numbers are indeterminate.
    Number(f64),
    /// Field name to value mapping, kept sorted by field name.
    Object(BTreeMap<String, Value>),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// Timezone-aware instant.
    Time(DateTime<FixedOffset>),
    /// UTF-8 string.
    String(String),
    /// Pseudo-typed value with an unknown type tag.
    Opaque {
        /// The pseudo-type tag (for example `GEOMETRY`).
        reql_type: String,
        /// Remaining fields of the pseudo-type object.
        fields: BTreeMap<String, Value>,
    },
}

/// The fixed type classes values are ranked by.
///
/// Declaration order is the ranking order: every array sorts before every
/// boolean, every boolean before null, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Class {
    /// `ARRAY`
    Array,
    /// `BOOL`
    Boolean,
    /// `NULL`
    Null,
    /// `NUMBER`
    Number,
    /// `OBJECT`
    Object,
    /// `PTYPE<BINARY>`
    Binary,
    /// `PTYPE<TIME>`
    Time,
    /// `STRING`
    String,
}

impl Class {
    /// All classes in ascending rank order.
    pub const ALL: [Class; 8] = [
        Class::Array,
        Class::Boolean,
        Class::Null,
        Class::Number,
        Class::Object,
        Class::Binary,
        Class::Time,
        Class::String,
    ];

    /// Position of this class in the ranking.
    pub fn rank(self) -> u8 {
        self as u8
    }

    /// The database's name for this class.
    pub fn name(self) -> &'static str {
        match self {
            Class::Array => "ARRAY",
            Class::Boolean => "BOOL",
            Class::Null => "NULL",
            Class::Number => "NUMBER",
            Class::Object => "OBJECT",
            Class::Binary => "PTYPE<BINARY>",
            Class::Time => "PTYPE<TIME>",
            Class::String => "STRING",
        }
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Value {
    /// Builds an object from field/value pairs.
    pub fn object<K, V, I>(fields: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Object(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Builds a binary value.
    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Value::Binary(bytes.into())
    }

    /// Returns the type class, or `None` for opaque pseudo-types.
    pub fn class(&self) -> Option<Class> {
        match self {
            Value::Array(_) => Some(Class::Array),
            Value::Bool(_) => Some(Class::Boolean),
            Value::Null => Some(Class::Null),
            Value::Number(_) => Some(Class::Number),
            Value::Object(_) => Some(Class::Object),
            Value::Binary(_) => Some(Class::Binary),
            Value::Time(_) => Some(Class::Time),
            Value::String(_) => Some(Class::String),
            Value::Opaque { .. } => None,
        }
    }

    /// Returns true for numbers that are not finite.
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, Value::Number(n) if !n.is_finite())
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as a number, if it is one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a string slice, if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as bytes, if it is binary.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Get this value as a time, if it is one.
    pub fn as_time(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            Value::Time(t) => Some(t),
            _ => None,
        }
    }

    /// Get this value as an array, if it is one.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get this value as an object, if it is one.
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Look up a field of an object value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        match self {
            Value::Object(fields) => fields.get(field),
            _ => None,
        }
    }
}

/// Structural equality.
///
/// Stricter than comparator equality for times: the offset must match as
/// well as the instant, so a document whose only change is a timezone is
/// still detected as changed. `NaN` equals `NaN` so a document always equals
/// itself.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b && a.offset() == b.offset(),
            (Value::String(a), Value::String(b)) => a == b,
            (
                Value::Opaque {
                    reql_type: ta,
                    fields: fa,
                },
                Value::Opaque {
                    reql_type: tb,
                    fields: fb,
                },
            ) => ta == tb && fa == fb,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => f.write_str("null"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Object(fields) => {
                f.write_str("{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k:?}: {v}")?;
                }
                f.write_str("}")
            }
            Value::Binary(bytes) => write!(f, "<binary, {} bytes>", bytes.len()),
            Value::Time(t) => write!(f, "{}", t.to_rfc3339()),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Opaque { reql_type, .. } => write!(f, "<{reql_type}>"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    #[allow(clippy::cast_precision_loss)]
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(t: DateTime<FixedOffset>) -> Self {
        Value::Time(t)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Null
    }
}
