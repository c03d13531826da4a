//! Compact-pack codec: the typed binary format inside Companion payloads.
//!
//! Tag assignment:
//! - null 0x04, true 0x01, false 0x02
//! - small integers 0..=39 inline as 0x08+v
//! - int8/16/32/64 as 0x30..0x33, little-endian
//! - float64 as 0x36, little-endian
//! - strings: 0x40+len inline for len <= 32, else 0x61/0x62/0x63/0x64 with
//!   u8/u16/u24/u32 little-endian length prefixes
//! - byte sequences: 0x70+len inline for len <= 32, else 0x91/0x92/0x93
//! - arrays: 0xD0+count for count < 15, else 0xDF ... 0x03
//! - maps: 0xE0+(2*count) for count < 15, else 0xEF ... 0x03
//!
//! Maps preserve insertion order. Unknown tags are rejected on decode.

use mediaremote_core::error::ProtocolError;

/// End marker for the open-ended array/map forms.
const TERMINATOR: u8 = 0x03;

/// A compact-pack value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    /// Ordered key-value pairs.
    Dict(Vec<(Value, Value)>),
}

impl Value {
    /// Build a dictionary from string keys.
    pub fn dict(entries: impl IntoIterator<Item = (&'static str, Value)>) -> Self {
        Value::Dict(
            entries
                .into_iter()
                .map(|(k, v)| (Value::String(k.to_string()), v))
                .collect(),
        )
    }

    /// Look up a string key in a dictionary value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Dict(entries) => entries.iter().find_map(|(k, v)| match k {
                Value::String(s) if s == key => Some(v),
                _ => None,
            }),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

/// Encode a value to bytes.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.push(0x04),
        Value::Bool(true) => out.push(0x01),
        Value::Bool(false) => out.push(0x02),
        Value::Int(v) => encode_int(*v, out),
        Value::Float(v) => {
            out.push(0x36);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::String(s) => {
            let bytes = s.as_bytes();
            match bytes.len() {
                len @ 0..=32 => out.push(0x40 + len as u8),
                len if len <= 0xFF => {
                    out.push(0x61);
                    out.push(len as u8);
                }
                len if len <= 0xFFFF => {
                    out.push(0x62);
                    out.extend_from_slice(&(len as u16).to_le_bytes());
                }
                len if len <= 0xFF_FFFF => {
                    out.push(0x63);
                    out.extend_from_slice(&(len as u32).to_le_bytes()[..3]);
                }
                len => {
                    out.push(0x64);
                    out.extend_from_slice(&(len as u32).to_le_bytes());
                }
            }
            out.extend_from_slice(bytes);
        }
        Value::Bytes(bytes) => {
            match bytes.len() {
                len @ 0..=32 => out.push(0x70 + len as u8),
                len if len <= 0xFF => {
                    out.push(0x91);
                    out.push(len as u8);
                }
                len if len <= 0xFFFF => {
                    out.push(0x92);
                    out.extend_from_slice(&(len as u16).to_le_bytes());
                }
                len => {
                    out.push(0x93);
                    out.extend_from_slice(&(len as u32).to_le_bytes());
                }
            }
            out.extend_from_slice(bytes);
        }
        Value::Array(items) => {
            if items.len() < 15 {
                out.push(0xD0 + items.len() as u8);
                for item in items {
                    encode_into(item, out);
                }
            } else {
                out.push(0xDF);
                for item in items {
                    encode_into(item, out);
                }
                out.push(TERMINATOR);
            }
        }
        Value::Dict(entries) => {
            if entries.len() < 15 {
                out.push(0xE0 + (entries.len() as u8) * 2);
                for (key, value) in entries {
                    encode_into(key, out);
                    encode_into(value, out);
                }
            } else {
                out.push(0xEF);
                for (key, value) in entries {
                    encode_into(key, out);
                    encode_into(value, out);
                }
                out.push(TERMINATOR);
            }
        }
    }
}

fn encode_int(v: i64, out: &mut Vec<u8>) {
    if (0..=39).contains(&v) {
        out.push(0x08 + v as u8);
    } else if let Ok(v) = i8::try_from(v) {
        out.push(0x30);
        out.extend_from_slice(&v.to_le_bytes());
    } else if let Ok(v) = i16::try_from(v) {
        out.push(0x31);
        out.extend_from_slice(&v.to_le_bytes());
    } else if let Ok(v) = i32::try_from(v) {
        out.push(0x32);
        out.extend_from_slice(&v.to_le_bytes());
    } else {
        out.push(0x33);
        out.extend_from_slice(&v.to_le_bytes());
    }
}

/// Decode a single value; trailing bytes are an error.
pub fn decode(data: &[u8]) -> Result<Value, ProtocolError> {
    let (value, consumed) = decode_one(data)?;
    if consumed != data.len() {
        return Err(ProtocolError::InvalidFormat(format!(
            "{} trailing bytes after value",
            data.len() - consumed
        )));
    }
    Ok(value)
}

/// Decode one value from the front of `data`, returning bytes consumed.
pub fn decode_one(data: &[u8]) -> Result<(Value, usize), ProtocolError> {
    let tag = *data
        .first()
        .ok_or_else(|| ProtocolError::InvalidFormat("empty input".to_string()))?;

    match tag {
        0x01 => Ok((Value::Bool(true), 1)),
        0x02 => Ok((Value::Bool(false), 1)),
        0x04 => Ok((Value::Null, 1)),
        0x08..=0x2F => Ok((Value::Int((tag - 0x08) as i64), 1)),
        0x30 => {
            let bytes = take(data, 1, 1)?;
            Ok((Value::Int(i8::from_le_bytes([bytes[0]]) as i64), 2))
        }
        0x31 => {
            let bytes = take(data, 1, 2)?;
            Ok((
                Value::Int(i16::from_le_bytes([bytes[0], bytes[1]]) as i64),
                3,
            ))
        }
        0x32 => {
            let bytes = take(data, 1, 4)?;
            Ok((
                Value::Int(i32::from_le_bytes(bytes.try_into().expect("4 bytes")) as i64),
                5,
            ))
        }
        0x33 => {
            let bytes = take(data, 1, 8)?;
            Ok((
                Value::Int(i64::from_le_bytes(bytes.try_into().expect("8 bytes"))),
                9,
            ))
        }
        0x36 => {
            let bytes = take(data, 1, 8)?;
            Ok((
                Value::Float(f64::from_le_bytes(bytes.try_into().expect("8 bytes"))),
                9,
            ))
        }
        0x40..=0x60 => {
            let len = (tag - 0x40) as usize;
            let bytes = take(data, 1, len)?;
            Ok((Value::String(utf8(bytes)?), 1 + len))
        }
        0x61..=0x64 => {
            let prefix_len = match tag {
                0x61 => 1,
                0x62 => 2,
                0x63 => 3,
                _ => 4,
            };
            let prefix = take(data, 1, prefix_len)?;
            let mut len = 0usize;
            for (i, &b) in prefix.iter().enumerate() {
                len |= (b as usize) << (8 * i);
            }
            let bytes = take(data, 1 + prefix_len, len)?;
            Ok((Value::String(utf8(bytes)?), 1 + prefix_len + len))
        }
        0x70..=0x90 => {
            let len = (tag - 0x70) as usize;
            let bytes = take(data, 1, len)?;
            Ok((Value::Bytes(bytes.to_vec()), 1 + len))
        }
        0x91..=0x93 => {
            let prefix_len = match tag {
                0x91 => 1,
                0x92 => 2,
                _ => 4,
            };
            let prefix = take(data, 1, prefix_len)?;
            let mut len = 0usize;
            for (i, &b) in prefix.iter().enumerate() {
                len |= (b as usize) << (8 * i);
            }
            let bytes = take(data, 1 + prefix_len, len)?;
            Ok((Value::Bytes(bytes.to_vec()), 1 + prefix_len + len))
        }
        0xD0..=0xDE => {
            let count = (tag - 0xD0) as usize;
            let mut items = Vec::with_capacity(count);
            let mut offset = 1;
            for _ in 0..count {
                let (item, used) = decode_one(&data[offset..])?;
                items.push(item);
                offset += used;
            }
            Ok((Value::Array(items), offset))
        }
        0xDF => {
            let mut items = Vec::new();
            let mut offset = 1;
            loop {
                if data.get(offset) == Some(&TERMINATOR) {
                    return Ok((Value::Array(items), offset + 1));
                }
                let (item, used) = decode_one(&data[offset..])?;
                items.push(item);
                offset += used;
            }
        }
        0xEF => {
            let mut entries = Vec::new();
            let mut offset = 1;
            loop {
                if data.get(offset) == Some(&TERMINATOR) {
                    return Ok((Value::Dict(entries), offset + 1));
                }
                let (key, used) = decode_one(&data[offset..])?;
                offset += used;
                let (value, used) = decode_one(&data[offset..])?;
                offset += used;
                entries.push((key, value));
            }
        }
        0xE0..=0xFC if (tag - 0xE0) % 2 == 0 => {
            let count = ((tag - 0xE0) / 2) as usize;
            let mut entries = Vec::with_capacity(count);
            let mut offset = 1;
            for _ in 0..count {
                let (key, used) = decode_one(&data[offset..])?;
                offset += used;
                let (value, used) = decode_one(&data[offset..])?;
                offset += used;
                entries.push((key, value));
            }
            Ok((Value::Dict(entries), offset))
        }
        other => Err(ProtocolError::UnknownTag(other)),
    }
}

fn take(data: &[u8], offset: usize, len: usize) -> Result<&[u8], ProtocolError> {
    data.get(offset..offset + len).ok_or_else(|| {
        ProtocolError::InvalidFormat(format!(
            "truncated value: wanted {} bytes at offset {}",
            len, offset
        ))
    })
}

fn utf8(bytes: &[u8]) -> Result<String, ProtocolError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| ProtocolError::InvalidFormat("invalid UTF-8 in string".to_string()))
}
