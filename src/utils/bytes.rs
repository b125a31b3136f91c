//! Bounds-checked little-endian reads over raw byte slices.

use crate::types::error::{PstError, Result};

pub fn slice_at(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    if offset + len > bytes.len() {
        return Err(PstError::Truncated {
            offset,
            needed: len,
            have: bytes.len().saturating_sub(offset),
        });
    }
    Ok(&bytes[offset..offset + len])
}

pub fn u8_at(bytes: &[u8], offset: usize) -> Result<u8> {
    Ok(slice_at(bytes, offset, 1)?[0])
}

pub fn u16_at(bytes: &[u8], offset: usize) -> Result<u16> {
    let s = slice_at(bytes, offset, 2)?;
    Ok(u16::from_le_bytes([s[0], s[1]]))
}

pub fn u32_at(bytes: &[u8], offset: usize) -> Result<u32> {
    let s = slice_at(bytes, offset, 4)?;
    Ok(u32::from_le_bytes([s[0], s[1], s[2], s[3]]))
}

pub fn u64_at(bytes: &[u8], offset: usize) -> Result<u64> {
    let s = slice_at(bytes, offset, 8)?;
    Ok(u64::from_le_bytes([
        s[0], s[1], s[2], s[3], s[4], s[5], s[6], s[7],
    ]))
}
