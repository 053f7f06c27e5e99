//! Entry serialization.
//!
//! Entries are stored as CBOR maps `{key, value}`. Encoding is
//! deterministic: `Value` maps iterate in key order, so equal logical
//! values produce equal bytes. Decoding is strict; anything that does
//! not decode as an entry is surfaced as [`StoreError::Corrupt`].

use crate::error::{StoreError, StoreResult};
use crate::value::Value;
use ciborium::value::Value as Cbor;
use std::collections::BTreeMap;

/// One stored log entry: a key and its full row/value payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LogEntry {
    /// The logical key this entry is the live value for.
    pub key: String,
    /// The full row or value, replaced wholesale on every write.
    pub value: Value,
}

pub(crate) fn encode_entry(entry: &LogEntry) -> StoreResult<Vec<u8>> {
    let cbor = Cbor::Map(vec![
        (Cbor::Text("key".into()), Cbor::Text(entry.key.clone())),
        (Cbor::Text("value".into()), to_cbor(&entry.value)),
    ]);

    let mut buf = Vec::new();
    ciborium::ser::into_writer(&cbor, &mut buf).map_err(|e| StoreError::codec(e.to_string()))?;
    Ok(buf)
}

pub(crate) fn decode_entry(bytes: &[u8]) -> StoreResult<LogEntry> {
    let cbor: Cbor = ciborium::de::from_reader(bytes)
        .map_err(|e| StoreError::corrupt(format!("entry does not decode: {e}")))?;

    let Cbor::Map(pairs) = cbor else {
        return Err(StoreError::corrupt("entry is not a map"));
    };

    let mut key = None;
    let mut value = None;
    for (k, v) in pairs {
        match k {
            Cbor::Text(name) if name == "key" => match v {
                Cbor::Text(text) => key = Some(text),
                _ => return Err(StoreError::corrupt("entry key is not text")),
            },
            Cbor::Text(name) if name == "value" => value = Some(from_cbor(v)?),
            _ => return Err(StoreError::corrupt("unexpected entry field")),
        }
    }

    match (key, value) {
        (Some(key), Some(value)) => Ok(LogEntry { key, value }),
        _ => Err(StoreError::corrupt("entry is missing key or value")),
    }
}

fn to_cbor(value: &Value) -> Cbor {
    match value {
        Value::Null => Cbor::Null,
        Value::Bool(b) => Cbor::Bool(*b),
        Value::Integer(i) => Cbor::Integer((*i).into()),
        Value::Text(s) => Cbor::Text(s.clone()),
        Value::Bytes(b) => Cbor::Bytes(b.clone()),
        Value::Array(items) => Cbor::Array(items.iter().map(to_cbor).collect()),
        Value::Map(map) => Cbor::Map(
            map.iter()
                .map(|(k, v)| (Cbor::Text(k.clone()), to_cbor(v)))
                .collect(),
        ),
    }
}

fn from_cbor(cbor: Cbor) -> StoreResult<Value> {
    match cbor {
        Cbor::Null => Ok(Value::Null),
        Cbor::Bool(b) => Ok(Value::Bool(b)),
        Cbor::Integer(i) => i64::try_from(i)
            .map(Value::Integer)
            .map_err(|_| StoreError::corrupt("integer out of i64 range")),
        Cbor::Text(s) => Ok(Value::Text(s)),
        Cbor::Bytes(b) => Ok(Value::Bytes(b)),
        Cbor::Array(items) => items
            .into_iter()
            .map(from_cbor)
            .collect::<StoreResult<Vec<_>>>()
            .map(Value::Array),
        Cbor::Map(pairs) => {
            let mut map = BTreeMap::new();
            for (k, v) in pairs {
                let Cbor::Text(key) = k else {
                    return Err(StoreError::corrupt("map key is not text"));
                };
                map.insert(key, from_cbor(v)?);
            }
            Ok(Value::Map(map))
        }
        Cbor::Float(_) => Err(StoreError::corrupt("floats are not supported")),
        _ => Err(StoreError::corrupt("unsupported cbor item")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, value: Value) -> LogEntry {
        LogEntry {
            key: key.to_string(),
            value,
        }
    }

    #[test]
    fn entry_roundtrip() {
        let original = entry(
            "post-1",
            Value::object([
                ("id", Value::from("post-1")),
                ("title", Value::from("Hello")),
                ("tags", Value::Array(vec![Value::from("a"), Value::from("b")])),
                ("raw", Value::Bytes(vec![0, 255, 7])),
                ("draft", Value::from(true)),
                ("views", Value::from(-3i64)),
                ("extra", Value::Null),
            ]),
        );

        let bytes = encode_entry(&original).unwrap();
        let decoded = decode_entry(&bytes).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn equal_values_encode_identically() {
        let a = entry(
            "k",
            Value::object([("x", Value::from(1i64)), ("y", Value::from(2i64))]),
        );
        let b = entry(
            "k",
            Value::object([("y", Value::from(2i64)), ("x", Value::from(1i64))]),
        );

        assert_eq!(encode_entry(&a).unwrap(), encode_entry(&b).unwrap());
    }

    #[test]
    fn garbage_bytes_are_corrupt() {
        let err = decode_entry(&[0x9f, 0x01, 0x02]).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn non_entry_map_is_corrupt() {
        let cbor = Cbor::Map(vec![(Cbor::Text("other".into()), Cbor::Null)]);
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&cbor, &mut bytes).unwrap();

        assert!(decode_entry(&bytes).is_err());
    }
}
