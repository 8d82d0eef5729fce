//! Conversions between host values and loosely typed wire values.
//!
//! Requests arriving over a transport carry parameters as generic CBOR (or
//! JSON) items. Only scalars, byte strings and arrays of bytes map onto a
//! [`Value`]; anything else is an unsupported bind type.

use crate::error::{Error, Result};
use crate::value::{Params, Value, MAX_SAFE_INTEGER};
use ciborium::Value as WireValue;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

impl TryFrom<WireValue> for Value {
    type Error = Error;

    #[allow(clippy::cast_precision_loss)]
    fn try_from(wire: WireValue) -> Result<Self> {
        match wire {
            WireValue::Null => Ok(Self::Null),
            WireValue::Bool(b) => Ok(Self::Bool(b)),
            WireValue::Float(f) => Ok(Self::Number(f)),
            WireValue::Text(s) => Ok(Self::Text(s)),
            WireValue::Bytes(b) => Ok(Self::Blob(b)),
            WireValue::Integer(i) => {
                let n = i128::from(i);
                match i64::try_from(n) {
                    Ok(n) if n.unsigned_abs() <= MAX_SAFE_INTEGER.unsigned_abs() => {
                        Ok(Self::Number(n as f64))
                    }
                    Ok(n) => Ok(Self::BigInt(n)),
                    Err(_) => Err(Error::unsupported_bind_type(n)),
                }
            }
            WireValue::Array(items) => byte_array(&items)
                .map(Self::Blob)
                .ok_or_else(|| Error::unsupported_bind_type(WireValue::Array(items))),
            other => Err(Error::unsupported_bind_type(other)),
        }
    }
}

/// Reads an array whose items are all integers in `0..=255` as bytes.
fn byte_array(items: &[WireValue]) -> Option<Vec<u8>> {
    items
        .iter()
        .map(|item| match item {
            WireValue::Integer(i) => u8::try_from(i128::from(*i)).ok(),
            _ => None,
        })
        .collect()
}

impl Params {
    /// Converts a wire item into parameters.
    ///
    /// An array binds positionally, a map with text keys binds by name and
    /// null means no parameters.
    pub fn from_wire(wire: WireValue) -> Result<Option<Self>> {
        match wire {
            WireValue::Null => Ok(None),
            WireValue::Array(items) => items
                .into_iter()
                .map(Value::try_from)
                .collect::<Result<Vec<_>>>()
                .map(|values| Some(Self::Positional(values))),
            WireValue::Map(entries) => {
                let mut named = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let WireValue::Text(name) = key else {
                        return Err(Error::unsupported_bind_type(key));
                    };
                    named.push((name, Value::try_from(value)?));
                }
                Ok(Some(Self::Named(named)))
            }
            other => Err(Error::unsupported_bind_type(other)),
        }
    }
}

impl Serialize for Value {
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER as f64 => {
                serializer.serialize_i64(*n as i64)
            }
            Self::Number(n) => serializer.serialize_f64(*n),
            Self::BigInt(n) => serializer.serialize_i64(*n),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Blob(b) => serializer.serialize_bytes(b),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let wire = WireValue::deserialize(deserializer)?;
        Self::try_from(wire).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(n: i64) -> WireValue {
        WireValue::Integer(n.into())
    }

    #[test]
    fn scalars_convert() {
        assert_eq!(Value::try_from(WireValue::Null).unwrap(), Value::Null);
        assert_eq!(
            Value::try_from(WireValue::Bool(true)).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(Value::try_from(int(5)).unwrap(), Value::Number(5.0));
        assert_eq!(
            Value::try_from(WireValue::Float(1.5)).unwrap(),
            Value::Number(1.5)
        );
        assert_eq!(
            Value::try_from(WireValue::Text("hi".into())).unwrap(),
            Value::Text("hi".into())
        );
    }

    #[test]
    fn large_integers_stay_exact() {
        let big = MAX_SAFE_INTEGER + 10;
        assert_eq!(Value::try_from(int(big)).unwrap(), Value::BigInt(big));
    }

    #[test]
    fn byte_arrays_become_blobs() {
        let wire = WireValue::Array(vec![int(1), int(2), int(255)]);
        assert_eq!(Value::try_from(wire).unwrap(), Value::Blob(vec![1, 2, 255]));
        assert_eq!(
            Value::try_from(WireValue::Bytes(vec![9])).unwrap(),
            Value::Blob(vec![9])
        );
    }

    #[test]
    fn nested_values_are_rejected() {
        let map = WireValue::Map(vec![(WireValue::Text("a".into()), int(1))]);
        let err = Value::try_from(map).unwrap_err();
        assert!(matches!(err, Error::UnsupportedBindType(_)));

        let mixed = WireValue::Array(vec![int(1), WireValue::Text("x".into())]);
        assert!(Value::try_from(mixed).is_err());

        let out_of_byte_range = WireValue::Array(vec![int(256)]);
        assert!(Value::try_from(out_of_byte_range).is_err());
    }

    #[test]
    fn params_from_wire() {
        assert_eq!(Params::from_wire(WireValue::Null).unwrap(), None);

        let positional = WireValue::Array(vec![int(1), WireValue::Text("a".into())]);
        assert_eq!(
            Params::from_wire(positional).unwrap(),
            Some(Params::Positional(vec![
                Value::Number(1.0),
                Value::Text("a".into())
            ]))
        );

        let named = WireValue::Map(vec![(WireValue::Text(":x".into()), int(3))]);
        assert_eq!(
            Params::from_wire(named).unwrap(),
            Some(Params::named([(":x", 3)]))
        );
    }

    #[test]
    fn params_reject_non_text_keys_and_scalars() {
        let bad_key = WireValue::Map(vec![(int(1), int(3))]);
        assert!(Params::from_wire(bad_key).is_err());
        assert!(Params::from_wire(int(3)).is_err());
    }

    #[test]
    fn json_shapes() {
        let values = vec![
            Value::Number(42.0),
            Value::Number(0.5),
            Value::Text("x".into()),
            Value::Null,
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"[42,0.5,"x",null]"#);
    }

    #[test]
    fn cbor_keeps_blobs_as_bytes() {
        let mut buf = Vec::new();
        ciborium::into_writer(&Value::Blob(vec![1, 2, 3]), &mut buf).unwrap();
        let back: Value = ciborium::from_reader(buf.as_slice()).unwrap();
        assert_eq!(back, Value::Blob(vec![1, 2, 3]));
    }
}
