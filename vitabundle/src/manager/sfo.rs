//! Reader for `param.sfo` descriptor records.
//!
//! A bundle carries its display name in `<title id>/sce_sys/param.sfo`, a
//! small little-endian key/value table:
//!
//! ```text
//! header (20 bytes)   magic "\0PSF", version, key table offset,
//!                     data table offset, entry count
//! index  (16 bytes)   key offset (u16), format (u16), data length,
//!                     data capacity, data offset   (× entry count)
//! key table           NUL-terminated ASCII keys
//! data table          values
//! ```
//!
//! Only reading is supported.

use std::collections::HashMap;

use thiserror::Error;

const MAGIC: [u8; 4] = *b"\0PSF";
const HEADER_LEN: usize = 20;
const INDEX_ENTRY_LEN: usize = 16;

/// UTF-8 string without terminator.
const FMT_UTF8_SPECIAL: u16 = 0x0004;
/// NUL-terminated UTF-8 string.
const FMT_UTF8: u16 = 0x0204;
/// Little-endian 32-bit integer.
const FMT_INT32: u16 = 0x0404;

/// Errors while parsing a descriptor record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SfoError {
    #[error("descriptor too short ({0} bytes)")]
    Truncated(usize),
    #[error("bad descriptor magic")]
    BadMagic,
    #[error("descriptor entry {0} points outside the record")]
    OutOfBounds(usize),
}

/// A single descriptor value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SfoValue {
    Text(String),
    Int(u32),
}

/// Parsed descriptor record.
#[derive(Debug, Clone, Default)]
pub struct SfoReader {
    values: HashMap<String, SfoValue>,
}

fn read_u16(data: &[u8], at: usize) -> Option<u16> {
    data.get(at..at + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32(data: &[u8], at: usize) -> Option<u32> {
    data.get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

impl SfoReader {
    /// Parse a descriptor record.
    pub fn load(data: &[u8]) -> Result<Self, SfoError> {
        if data.len() < HEADER_LEN {
            return Err(SfoError::Truncated(data.len()));
        }
        if data[0..4] != MAGIC {
            return Err(SfoError::BadMagic);
        }

        let truncated = || SfoError::Truncated(data.len());
        let key_table = read_u32(data, 8).ok_or_else(truncated)? as usize;
        let data_table = read_u32(data, 12).ok_or_else(truncated)? as usize;
        let count = read_u32(data, 16).ok_or_else(truncated)? as usize;

        let mut values = HashMap::with_capacity(count);
        for i in 0..count {
            let base = HEADER_LEN + i * INDEX_ENTRY_LEN;
            let bad = || SfoError::OutOfBounds(i);

            let key_offset = read_u16(data, base).ok_or_else(bad)? as usize;
            let format = read_u16(data, base + 2).ok_or_else(bad)?;
            let len = read_u32(data, base + 4).ok_or_else(bad)? as usize;
            let data_offset = read_u32(data, base + 12).ok_or_else(bad)? as usize;

            let key_start = key_table + key_offset;
            let key_bytes = data.get(key_start..).ok_or_else(bad)?;
            let key_end = key_bytes.iter().position(|&b| b == 0).ok_or_else(bad)?;
            let key = String::from_utf8_lossy(&key_bytes[..key_end]).into_owned();

            let value_start = data_table + data_offset;
            let raw = data
                .get(value_start..value_start + len)
                .ok_or_else(bad)?;

            let value = match format {
                FMT_INT32 => SfoValue::Int(read_u32(raw, 0).ok_or_else(bad)?),
                FMT_UTF8 | FMT_UTF8_SPECIAL => {
                    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                    SfoValue::Text(String::from_utf8_lossy(&raw[..end]).into_owned())
                }
                // Unknown formats are skipped rather than rejected
                _ => continue,
            };
            values.insert(key, value);
        }

        Ok(Self { values })
    }

    /// Text value for `key`, or `default` when absent or not text.
    pub fn value(&self, key: &str, default: &str) -> String {
        match self.values.get(key) {
            Some(SfoValue::Text(text)) => text.clone(),
            _ => default.to_string(),
        }
    }

    /// Raw value for `key`.
    pub fn get(&self, key: &str) -> Option<&SfoValue> {
        self.values.get(key)
    }

    /// Number of entries that were read.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the record had no readable entries.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Build a descriptor record from text entries.
#[cfg(test)]
pub(crate) fn build_sfo(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut keys = Vec::new();
    let mut values = Vec::new();
    let mut index = Vec::new();

    for (key, value) in entries {
        let key_offset = keys.len() as u16;
        keys.extend_from_slice(key.as_bytes());
        keys.push(0);

        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        let capacity = bytes.len().next_multiple_of(4);
        let data_offset = values.len() as u32;

        index.extend_from_slice(&key_offset.to_le_bytes());
        index.extend_from_slice(&FMT_UTF8.to_le_bytes());
        index.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        index.extend_from_slice(&(capacity as u32).to_le_bytes());
        index.extend_from_slice(&data_offset.to_le_bytes());

        bytes.resize(capacity, 0);
        values.extend_from_slice(&bytes);
    }
    while keys.len() % 4 != 0 {
        keys.push(0);
    }

    let key_table = (HEADER_LEN + index.len()) as u32;
    let data_table = key_table + keys.len() as u32;

    let mut out = Vec::with_capacity(data_table as usize + values.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&0x0101u32.to_le_bytes());
    out.extend_from_slice(&key_table.to_le_bytes());
    out.extend_from_slice(&data_table.to_le_bytes());
    out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    out.extend_from_slice(&index);
    out.extend_from_slice(&keys);
    out.extend_from_slice(&values);
    out
}
