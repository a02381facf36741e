//! Serde bridge from host records to [`Value`].
//!
//! Unlike a detour through a JSON tree, this keeps `Option` as
//! [`Value::Optional`] and turns fields marked with [`time`] into
//! [`Value::Time`].
//!
//! ```
//! use chrono::{DateTime, TimeZone, Utc};
//! use serde::Serialize;
//! use shimmysmarty::{to_value, Value};
//!
//! #[derive(Serialize)]
//! struct Post {
//!     title: String,
//!     #[serde(with = "shimmysmarty::ser::time")]
//!     created_at: DateTime<Utc>,
//!     subtitle: Option<String>,
//! }
//!
//! let post = Post {
//!     title: "Hello".into(),
//!     created_at: Utc.with_ymd_and_hms(2024, 1, 3, 15, 4, 6).unwrap(),
//!     subtitle: None,
//! };
//! let Value::Map(fields) = to_value(&post).unwrap() else { unreachable!() };
//! assert!(matches!(fields["created_at"], Value::Time(_)));
//! assert_eq!(fields["subtitle"], Value::Optional(None));
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::DateTime;
use serde::ser::{self, Error as _, Serialize};

use crate::error::SerializeError;
use crate::value::Value;

/// Newtype-struct name the [`time`] helpers serialize under. Any other
/// serializer sees a plain RFC 3339 string.
const TIME_MARKER: &str = "$shimmysmarty::Time";

/// Converts any serde-serializable host value.
///
/// Structs and string-keyed maps become maps, sequences and tuples become
/// arrays, `Option` becomes Optional, unit becomes Null. Map keys must be
/// strings, numbers or booleans.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, SerializeError> {
    value.serialize(ValueSerializer)
}

/// `#[serde(with = "shimmysmarty::ser::time")]` for `DateTime` fields.
pub mod time {
    use chrono::{DateTime, TimeZone};
    use serde::{Serialize, Serializer};

    use super::TIME_MARKER;

    pub fn serialize<S, Tz>(value: &DateTime<Tz>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        Tz: TimeZone,
        DateTime<Tz>: Serialize,
    {
        serializer.serialize_newtype_struct(TIME_MARKER, value)
    }

    /// The same for `Option<DateTime>` fields.
    pub mod optional {
        use chrono::{DateTime, TimeZone};
        use serde::{Serialize, Serializer};

        pub fn serialize<S, Tz>(
            value: &Option<DateTime<Tz>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
            Tz: TimeZone,
            DateTime<Tz>: Serialize,
        {
            struct Marked<'a, Tz: TimeZone>(&'a DateTime<Tz>);

            impl<Tz: TimeZone> Serialize for Marked<'_, Tz>
            where
                DateTime<Tz>: Serialize,
            {
                fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                    super::serialize(self.0, serializer)
                }
            }

            match value {
                Some(time) => serializer.serialize_some(&Marked(time)),
                None => serializer.serialize_none(),
            }
        }
    }
}

struct ValueSerializer;

impl ser::Serializer for ValueSerializer {
    type Ok = Value;
    type Error = SerializeError;

    type SerializeSeq = SerializeArray;
    type SerializeTuple = SerializeArray;
    type SerializeTupleStruct = SerializeArray;
    type SerializeTupleVariant = SerializeVariant<SerializeArray>;
    type SerializeMap = SerializeMap;
    type SerializeStruct = SerializeMap;
    type SerializeStructVariant = SerializeVariant<SerializeMap>;

    fn serialize_bool(self, v: bool) -> Result<Value, SerializeError> {
        Ok(Value::Boolean(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, SerializeError> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_i16(self, v: i16) -> Result<Value, SerializeError> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_i32(self, v: i32) -> Result<Value, SerializeError> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_i64(self, v: i64) -> Result<Value, SerializeError> {
        Ok(Value::Number(v as f64))
    }

    fn serialize_i128(self, v: i128) -> Result<Value, SerializeError> {
        Ok(Value::Number(v as f64))
    }

    fn serialize_u8(self, v: u8) -> Result<Value, SerializeError> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_u16(self, v: u16) -> Result<Value, SerializeError> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_u32(self, v: u32) -> Result<Value, SerializeError> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_u64(self, v: u64) -> Result<Value, SerializeError> {
        Ok(Value::Number(v as f64))
    }

    fn serialize_u128(self, v: u128) -> Result<Value, SerializeError> {
        Ok(Value::Number(v as f64))
    }

    fn serialize_f32(self, v: f32) -> Result<Value, SerializeError> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_f64(self, v: f64) -> Result<Value, SerializeError> {
        Ok(Value::Number(v))
    }

    fn serialize_char(self, v: char) -> Result<Value, SerializeError> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value, SerializeError> {
        Ok(Value::String(v.to_owned()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value, SerializeError> {
        Ok(Value::array(v.iter().copied()))
    }

    fn serialize_none(self) -> Result<Value, SerializeError> {
        Ok(Value::Optional(None))
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Value, SerializeError> {
        Ok(Value::optional(Some(value.serialize(self)?)))
    }

    fn serialize_unit(self) -> Result<Value, SerializeError> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value, SerializeError> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Value, SerializeError> {
        Ok(Value::String(variant.to_owned()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        value: &T,
    ) -> Result<Value, SerializeError> {
        if name != TIME_MARKER {
            return value.serialize(self);
        }
        match value.serialize(self)? {
            Value::String(s) => DateTime::parse_from_rfc3339(&s)
                .map(Value::Time)
                .map_err(SerializeError::custom),
            other => Err(SerializeError::custom(format!(
                "expected an RFC 3339 timestamp, got {}",
                other.type_name()
            ))),
        }
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, SerializeError> {
        Ok(Value::map([(variant, value.serialize(self)?)]))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SerializeArray, SerializeError> {
        Ok(SerializeArray {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SerializeArray, SerializeError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SerializeArray, SerializeError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleVariant, SerializeError> {
        Ok(SerializeVariant {
            variant,
            inner: self.serialize_seq(Some(len))?,
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<SerializeMap, SerializeError> {
        Ok(SerializeMap::default())
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<SerializeMap, SerializeError> {
        Ok(SerializeMap::default())
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, SerializeError> {
        Ok(SerializeVariant {
            variant,
            inner: SerializeMap::default(),
        })
    }
}

struct SerializeArray {
    items: Vec<Value>,
}

impl ser::SerializeSeq for SerializeArray {
    type Ok = Value;
    type Error = SerializeError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), SerializeError> {
        self.items.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, SerializeError> {
        Ok(Value::Array(Arc::new(self.items)))
    }
}

impl ser::SerializeTuple for SerializeArray {
    type Ok = Value;
    type Error = SerializeError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), SerializeError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, SerializeError> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SerializeArray {
    type Ok = Value;
    type Error = SerializeError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), SerializeError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, SerializeError> {
        ser::SerializeSeq::end(self)
    }
}

#[derive(Default)]
struct SerializeMap {
    entries: BTreeMap<String, Value>,
    pending_key: Option<String>,
}

impl ser::SerializeMap for SerializeMap {
    type Ok = Value;
    type Error = SerializeError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), SerializeError> {
        let key = match key.serialize(ValueSerializer)?.into_unwrapped() {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Boolean(b) => b.to_string(),
            other => {
                return Err(SerializeError::custom(format!(
                    "map key must be a string, got {}",
                    other.type_name()
                )))
            }
        };
        self.pending_key = Some(key);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), SerializeError> {
        let Some(key) = self.pending_key.take() else {
            return Err(SerializeError::custom("map value without a key"));
        };
        self.entries.insert(key, value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, SerializeError> {
        Ok(Value::Map(Arc::new(self.entries)))
    }
}

impl ser::SerializeStruct for SerializeMap {
    type Ok = Value;
    type Error = SerializeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), SerializeError> {
        self.entries
            .insert(key.to_owned(), value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, SerializeError> {
        ser::SerializeMap::end(self)
    }
}

/// An enum variant with a payload, serialized as `{variant: payload}`.
struct SerializeVariant<S> {
    variant: &'static str,
    inner: S,
}

impl SerializeVariant<SerializeArray> {
    fn finish(self) -> Result<Value, SerializeError> {
        let payload = ser::SerializeSeq::end(self.inner)?;
        Ok(Value::map([(self.variant, payload)]))
    }
}

impl ser::SerializeTupleVariant for SerializeVariant<SerializeArray> {
    type Ok = Value;
    type Error = SerializeError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), SerializeError> {
        ser::SerializeSeq::serialize_element(&mut self.inner, value)
    }

    fn end(self) -> Result<Value, SerializeError> {
        self.finish()
    }
}

impl ser::SerializeStructVariant for SerializeVariant<SerializeMap> {
    type Ok = Value;
    type Error = SerializeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), SerializeError> {
        ser::SerializeStruct::serialize_field(&mut self.inner, key, value)
    }

    fn end(self) -> Result<Value, SerializeError> {
        let payload = ser::SerializeMap::end(self.inner)?;
        Ok(Value::map([(self.variant, payload)]))
    }
}
