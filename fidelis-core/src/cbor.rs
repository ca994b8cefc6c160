//! Value-level CBOR helpers shared by the binary decoders.
//!
//! The wire formats handled here are attacker-controlled, so decoding is
//! explicit: each caller walks a [`Value`] tree and checks every type
//! itself rather than relying on derived deserialization.

use std::io::Cursor;

use ciborium::value::Value;

use crate::error::{DecodeError, DecodeResult};

/// Parse exactly one CBOR item from the cursor, leaving the cursor
/// positioned at the first byte after it.
///
/// Authenticator data is not length-prefixed at the top level: the only way
/// to find where the extension block begins is to parse the COSE key and
/// observe how many bytes it consumed. This function is what makes that
/// possible.
pub(crate) fn parse_one(cursor: &mut Cursor<&[u8]>, context: &'static str) -> DecodeResult<Value> {
    ciborium::de::from_reader(&mut *cursor)
        .map_err(|e| DecodeError::Cbor(format!("{context}: {e}")))
}

/// Parse a byte slice that must contain exactly one CBOR item.
pub(crate) fn parse(bytes: &[u8], context: &'static str) -> DecodeResult<Value> {
    let mut cursor = Cursor::new(bytes);
    let value = parse_one(&mut cursor, context)?;
    let consumed = cursor.position() as usize;
    if consumed < bytes.len() {
        return Err(DecodeError::SurplusBytes(context, bytes.len() - consumed));
    }
    Ok(value)
}

/// Encode a value back to CBOR bytes.
pub(crate) fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    // Writing to a Vec cannot fail.
    ciborium::ser::into_writer(value, &mut out).expect("CBOR encoding to Vec failed");
    out
}

/// Look up a text key in a CBOR map.
pub(crate) fn text_entry<'a>(entries: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    entries.iter().find_map(|(k, v)| match k {
        Value::Text(t) if t == key => Some(v),
        _ => None,
    })
}

/// Look up an integer key in a CBOR map (COSE maps use integer labels).
pub(crate) fn int_entry(entries: &[(Value, Value)], key: i64) -> Option<&Value> {
    entries.iter().find_map(|(k, v)| match k {
        Value::Integer(i) if i128::from(*i) == i128::from(key) => Some(v),
        _ => None,
    })
}

pub(crate) fn as_map<'a>(
    value: &'a Value,
    field: &'static str,
) -> DecodeResult<&'a Vec<(Value, Value)>> {
    match value {
        Value::Map(entries) => Ok(entries),
        _ => Err(DecodeError::UnexpectedType(field)),
    }
}

pub(crate) fn as_bytes<'a>(value: &'a Value, field: &'static str) -> DecodeResult<&'a [u8]> {
    match value {
        Value::Bytes(b) => Ok(b),
        _ => Err(DecodeError::UnexpectedType(field)),
    }
}

pub(crate) fn as_text<'a>(value: &'a Value, field: &'static str) -> DecodeResult<&'a str> {
    match value {
        Value::Text(t) => Ok(t),
        _ => Err(DecodeError::UnexpectedType(field)),
    }
}

pub(crate) fn as_i64(value: &Value, field: &'static str) -> DecodeResult<i64> {
    match value {
        Value::Integer(i) => {
            i64::try_from(i128::from(*i)).map_err(|_| DecodeError::UnexpectedType(field))
        }
        _ => Err(DecodeError::UnexpectedType(field)),
    }
}

pub(crate) fn as_array<'a>(value: &'a Value, field: &'static str) -> DecodeResult<&'a [Value]> {
    match value {
        Value::Array(items) => Ok(items),
        _ => Err(DecodeError::UnexpectedType(field)),
    }
}
