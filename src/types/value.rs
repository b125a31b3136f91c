use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::types::NodeId;

/// Wire-level property type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PropertyType {
    Null,
    Int16,
    Int32,
    Float,
    Double,
    Currency,
    AppTime,
    ErrorCode,
    Bool,
    Int64,
    String8,
    Unicode,
    Time,
    Guid,
    Binary,
    Other(u16),
}

impl PropertyType {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x0001 => PropertyType::Null,
            0x0002 => PropertyType::Int16,
            0x0003 => PropertyType::Int32,
            0x0004 => PropertyType::Float,
            0x0005 => PropertyType::Double,
            0x0006 => PropertyType::Currency,
            0x0007 => PropertyType::AppTime,
            0x000A => PropertyType::ErrorCode,
            0x000B => PropertyType::Bool,
            0x0014 => PropertyType::Int64,
            0x001E => PropertyType::String8,
            0x001F => PropertyType::Unicode,
            0x0040 => PropertyType::Time,
            0x0048 => PropertyType::Guid,
            0x0102 => PropertyType::Binary,
            other => PropertyType::Other(other),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            PropertyType::Null => 0x0001,
            PropertyType::Int16 => 0x0002,
            PropertyType::Int32 => 0x0003,
            PropertyType::Float => 0x0004,
            PropertyType::Double => 0x0005,
            PropertyType::Currency => 0x0006,
            PropertyType::AppTime => 0x0007,
            PropertyType::ErrorCode => 0x000A,
            PropertyType::Bool => 0x000B,
            PropertyType::Int64 => 0x0014,
            PropertyType::String8 => 0x001E,
            PropertyType::Unicode => 0x001F,
            PropertyType::Time => 0x0040,
            PropertyType::Guid => 0x0048,
            PropertyType::Binary => 0x0102,
            PropertyType::Other(other) => *other,
        }
    }

    /// True scalars that fit the 4-byte value slot and are stored inline.
    pub fn is_inline(&self) -> bool {
        matches!(
            self,
            PropertyType::Null
                | PropertyType::Int16
                | PropertyType::Int32
                | PropertyType::Float
                | PropertyType::ErrorCode
                | PropertyType::Bool
        )
    }
}

/// A decoded property value.
///
/// `External` carries a node id into the owning node's subnode tree plus
/// the wire type to decode its bytes with; the container resolves it, so
/// consumers normally only observe it when the referenced subnode is
/// absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PropertyValue {
    Null,
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Currency(i64),
    ErrorCode(u32),
    Bool(bool),
    Time(DateTime<Utc>),
    Guid([u8; 16]),
    String(String),
    String8(String),
    Binary(Vec<u8>),
    External { node: NodeId, kind: PropertyType },
}

impl PropertyValue {
    /// Decode a fixed-width cell (1, 2, 4 or 8 bytes) by its declared type.
    /// Narrow cells arrive already masked to their width.
    pub fn decode_fixed(kind: PropertyType, bytes: &[u8]) -> PropertyValue {
        match bytes.len() {
            1 => match kind {
                PropertyType::Bool => PropertyValue::Bool(bytes[0] != 0),
                _ => PropertyValue::Int16(i16::from(bytes[0])),
            },
            2 => {
                let raw = u16::from_le_bytes([bytes[0], bytes[1]]);
                match kind {
                    PropertyType::Bool => PropertyValue::Bool(raw != 0),
                    _ => PropertyValue::Int16(raw as i16),
                }
            }
            4 => {
                let raw = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                Self::decode_inline(kind, raw)
            }
            8 => {
                let raw = u64::from_le_bytes([
                    bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
                ]);
                match kind {
                    PropertyType::Double | PropertyType::AppTime => {
                        PropertyValue::Double(f64::from_bits(raw))
                    }
                    PropertyType::Currency => PropertyValue::Currency(raw as i64),
                    PropertyType::Time => PropertyValue::Time(filetime_to_utc(raw)),
                    _ => PropertyValue::Int64(raw as i64),
                }
            }
            _ => PropertyValue::Null,
        }
    }

    /// Decode the 4-byte inline slot for a true fixed scalar type.
    pub fn decode_inline(kind: PropertyType, raw: u32) -> PropertyValue {
        match kind {
            PropertyType::Null => PropertyValue::Null,
            PropertyType::Int16 => PropertyValue::Int16(raw as u16 as i16),
            PropertyType::Float => PropertyValue::Float(f32::from_bits(raw)),
            PropertyType::ErrorCode => PropertyValue::ErrorCode(raw),
            PropertyType::Bool => PropertyValue::Bool(raw & 0xFF != 0),
            _ => PropertyValue::Int32(raw as i32),
        }
    }

    /// Decode a variable-length payload pulled out of the heap or a subnode
    /// stream. Unknown and multi-valued types are kept as raw bytes.
    pub fn decode_buffer(kind: PropertyType, bytes: Vec<u8>) -> PropertyValue {
        match kind {
            PropertyType::Int64
            | PropertyType::Double
            | PropertyType::Currency
            | PropertyType::AppTime
            | PropertyType::Time => {
                if bytes.len() < 8 {
                    return PropertyValue::Null;
                }
                Self::decode_fixed(kind, &bytes[..8])
            }
            PropertyType::Guid => {
                if bytes.len() < 16 {
                    return PropertyValue::Null;
                }
                let mut guid = [0u8; 16];
                guid.copy_from_slice(&bytes[..16]);
                PropertyValue::Guid(guid)
            }
            PropertyType::Unicode => PropertyValue::String(utf16le_to_string(&bytes)),
            PropertyType::String8 => {
                PropertyValue::String8(String::from_utf8_lossy(&bytes).into_owned())
            }
            _ => PropertyValue::Binary(bytes),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int16(v) => Some(i64::from(*v)),
            PropertyValue::Int32(v) => Some(i64::from(*v)),
            PropertyValue::Int64(v) => Some(*v),
            PropertyValue::Currency(v) => Some(*v),
            PropertyValue::ErrorCode(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) | PropertyValue::String8(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PropertyValue::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            PropertyValue::Time(t) => Some(*t),
            _ => None,
        }
    }
}

/// 100ns ticks since 1601-01-01 UTC.
pub fn filetime_to_utc(ticks: u64) -> DateTime<Utc> {
    const EPOCH_DELTA_SECS: i64 = 11_644_473_600;
    let secs = (ticks / 10_000_000) as i64 - EPOCH_DELTA_SECS;
    let nanos = (ticks % 10_000_000) as u32 * 100;
    Utc.timestamp_opt(secs, nanos).single().unwrap_or_default()
}

pub fn utf16le_to_string(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}
