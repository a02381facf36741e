//! Runtime values.
//!
//! Values are immutable once built. Arrays and maps sit behind an [`Arc`], so
//! cloning a value out of an environment is cheap and two lookups of the same
//! binding share one allocation (which is what `==` on arrays and maps tests).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, SecondsFormat, TimeZone};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Array(Arc<Vec<Value>>),
    Map(Arc<BTreeMap<String, Value>>),
    Time(DateTime<FixedOffset>),
    /// A present or absent host value. May nest.
    Optional(Option<Box<Value>>),
}

static NULL: Value = Value::Null;

impl Value {
    pub fn array<I>(items: I) -> Value
    where
        I: IntoIterator,
        I::Item: IntoValue,
    {
        Value::Array(Arc::new(items.into_iter().map(IntoValue::into_value).collect()))
    }

    pub fn map<K, I, V>(entries: I) -> Value
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        V: IntoValue,
    {
        Value::Map(Arc::new(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into_value()))
                .collect(),
        ))
    }

    /// Wraps a host value that may be absent. A present Null counts as absent.
    pub fn optional(value: Option<Value>) -> Value {
        match value {
            None | Some(Value::Null) => Value::Optional(None),
            Some(inner) => Value::Optional(Some(Box::new(inner))),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Time(_) => "time",
            Value::Optional(_) => "optional",
        }
    }

    /// Strips every Optional layer. Absent becomes Null.
    pub fn unwrapped(&self) -> &Value {
        match self {
            Value::Optional(Some(inner)) => inner.unwrapped(),
            Value::Optional(None) => &NULL,
            other => other,
        }
    }

    /// Owning form of [`Value::unwrapped`].
    pub fn into_unwrapped(self) -> Value {
        match self {
            Value::Optional(Some(inner)) => inner.into_unwrapped(),
            Value::Optional(None) => Value::Null,
            other => other,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.unwrapped(), Value::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Map(m) => !m.is_empty(),
            Value::Time(t) => t.timestamp() != 0 || t.timestamp_subsec_nanos() != 0,
            Value::Optional(inner) => inner.as_deref().is_some_and(Value::is_truthy),
        }
    }

    /// Template `==`: operands must have the same type after unwrapping.
    /// Scalars compare by value, arrays and maps by identity.
    pub fn template_eq(&self, other: &Value) -> bool {
        match (self.unwrapped(), other.unwrapped()) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
            (Value::Time(a), Value::Time(b)) => a == b,
            _ => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self.unwrapped() {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.unwrapped() {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
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
            Value::Map(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}:{value}")?;
                }
                f.write_str("}")
            }
            Value::Time(t) => f.write_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Optional(Some(inner)) => write!(f, "{inner}"),
            Value::Optional(None) => f.write_str("null"),
        }
    }
}

/// Infallible conversion of typed host values.
pub trait IntoValue {
    fn into_value(self) -> Value;
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::String(self)
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::String(self.to_owned())
    }
}

impl IntoValue for &String {
    fn into_value(self) -> Value {
        Value::String(self.clone())
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Boolean(self)
    }
}

macro_rules! number_into_value {
    ($($t:ty),*) => {
        $(
            impl IntoValue for $t {
                fn into_value(self) -> Value {
                    Value::Number(self as f64)
                }
            }
        )*
    };
}

number_into_value!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        Value::optional(self.map(IntoValue::into_value))
    }
}

impl<T: IntoValue> IntoValue for Vec<T> {
    fn into_value(self) -> Value {
        Value::array(self)
    }
}

impl<T: IntoValue + Clone> IntoValue for &[T] {
    fn into_value(self) -> Value {
        Value::array(self.iter().cloned())
    }
}

impl<T: IntoValue, const N: usize> IntoValue for [T; N] {
    fn into_value(self) -> Value {
        Value::array(self)
    }
}

impl<K: Into<String>, V: IntoValue> IntoValue for HashMap<K, V> {
    fn into_value(self) -> Value {
        Value::map(self)
    }
}

impl<K: Into<String>, V: IntoValue> IntoValue for BTreeMap<K, V> {
    fn into_value(self) -> Value {
        Value::map(self)
    }
}

impl<Tz: TimeZone> IntoValue for DateTime<Tz> {
    fn into_value(self) -> Value {
        Value::Time(self.fixed_offset())
    }
}
