//! Canonical CBOR encoding for signed records.
//!
//! Records are encoded as RFC 8949 Core Deterministic CBOR:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)
//!
//! Every record is a map with small integer field tags. The tag tables in
//! [`keys`] are frozen per [`RECORD_SCHEMA_VERSION`]: two nodes that disagree
//! on them cannot verify each other's signatures.

use ciborium::value::{Integer, Value};
use std::collections::BTreeMap;

use crate::error::{CoreError, Result};

/// Schema version written into every record's canonical map.
pub const RECORD_SCHEMA_VERSION: u64 = 1;

/// Field tags. Keys 0-23 encode as single bytes in CBOR.
pub mod keys {
    /// Tags shared by every record type.
    pub const SCHEMA_VERSION: u64 = 0;
    pub const KIND: u64 = 1;
    pub const ID: u64 = 2;

    pub mod product {
        pub const CATEGORY: u64 = 3;
        pub const DATA: u64 = 4;
        pub const RESOURCES: u64 = 5;
        pub const CRDT_META: u64 = 6;

        /// Inside `DATA`.
        pub const NAME: u64 = 0;
        pub const MANUFACTURER: u64 = 1;
        pub const SPECS: u64 = 2;
    }

    pub mod tutorial {
        pub const TARGET_PRODUCT: u64 = 3;
        pub const TITLE: u64 = 4;
        pub const TOOLS: u64 = 5;
        pub const STEPS: u64 = 6;
        pub const GENERATION: u64 = 7;
        pub const PARENT_HASH: u64 = 8;
        pub const CRDT_META: u64 = 9;
        /// Present in the signed bytes, absent from the content hash input.
        pub const HASH: u64 = 10;

        /// Inside each `TOOLS` entry.
        pub const TOOL_PRODUCT: u64 = 0;
        pub const TOOL_QUANTITY: u64 = 1;

        /// Inside each `STEPS` entry.
        pub const STEP_INDEX: u64 = 0;
        pub const STEP_IMAGE: u64 = 1;
        pub const STEP_TEXT: u64 = 2;
    }

    pub mod crdt_meta {
        pub const UPDATED_AT: u64 = 0;
        pub const AUTHOR: u64 = 1;
    }
}

/// Encode a CBOR value to canonical bytes.
///
/// Fails on floats, tags and other values outside the record vocabulary.
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value)?;
    Ok(buf)
}

/// Integer field tag.
pub fn tag(key: u64) -> Value {
    Value::Integer(key.into())
}

pub fn uint(n: u64) -> Value {
    Value::Integer(n.into())
}

pub fn int(n: i64) -> Value {
    Value::Integer(n.into())
}

pub fn bytes(b: &[u8]) -> Value {
    Value::Bytes(b.to_vec())
}

pub fn text(s: &str) -> Value {
    Value::Text(s.to_owned())
}

/// A `lang -> text` style map with text keys.
pub fn text_map(map: &BTreeMap<String, String>) -> Value {
    Value::Map(map.iter().map(|(k, v)| (text(k), text(v))).collect())
}

/// Map with integer tags.
pub fn tagged(entries: Vec<(u64, Value)>) -> Value {
    Value::Map(entries.into_iter().map(|(k, v)| (tag(k), v)).collect())
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) -> Result<()> {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::Text(s) => encode_text(buf, s),
        Value::Array(arr) => encode_array(buf, arr)?,
        Value::Map(entries) => encode_map_canonical(buf, entries)?,
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        Value::Float(_) => {
            return Err(CoreError::Encoding(
                "floats not supported in canonical encoding".into(),
            ))
        }
        _ => return Err(CoreError::Encoding("unsupported CBOR value type".into())),
    }
    Ok(())
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        encode_uint(buf, 1, (-1 - n) as u64);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

fn encode_array(buf: &mut Vec<u8>, arr: &[Value]) -> Result<()> {
    encode_uint(buf, 4, arr.len() as u64);
    for item in arr {
        encode_value_to(buf, item)?;
    }
    Ok(())
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded bytes; duplicate keys are rejected.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) -> Result<()> {
    let mut pairs = Vec::with_capacity(entries.len());
    for (k, v) in entries {
        let mut key_buf = Vec::new();
        encode_value_to(&mut key_buf, k)?;
        pairs.push((key_buf, v));
    }

    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    if pairs.windows(2).any(|w| w[0].0 == w[1].0) {
        return Err(CoreError::Encoding("duplicate map key".into()));
    }

    encode_uint(buf, 5, pairs.len() as u64);
    for (key_bytes, value) in pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value)?;
    }
    Ok(())
}
