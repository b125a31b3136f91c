//! Decompressor for compressed rich-text bodies: a byte-oriented LZ77
//! variant over a 4096-byte sliding dictionary pre-seeded with common RTF
//! boilerplate.

use crate::{
    types::error::{PstError, Result},
    utils::bytes::{u32_at, slice_at},
};

pub const MODE_COMPRESSED: u32 = 0x75465A4C;
pub const MODE_LITERAL: u32 = 0x414C454D;

const DICT_SIZE: usize = 4096;

/// The fixed dictionary seed; 207 bytes of RTF preamble most documents
/// start with, so early back-references can point into it.
pub const DICT_SEED: &[u8] =
    b"{\\rtf1\\ansi\\mac\\deff0\\deftab720{\\fonttbl;}{\\f0\\fnil \\froman \\fswiss \
\\fmodern \\fscript \\fdecor MS Sans SerifSymbolArialTimes New RomanCourier\
{\\colortbl\\red0\\green0\\blue0\r\n\\par \\pard\\plain\\f0\\fs20\\b\\i\\u\\tab\
\\tx";

/// Decode one compressed-RTF blob to text.
///
/// Header: compressed size (of everything after the field), raw size, mode
/// magic, CRC (never checked). Literal mode returns the remaining bytes
/// verbatim; compressed mode runs the dictionary decoder until exactly
/// `raw size` bytes are produced.
pub fn decode(bytes: &[u8]) -> Result<String> {
    let _comp_size = u32_at(bytes, 0)?;
    let raw_size = u32_at(bytes, 4)? as usize;
    let mode = u32_at(bytes, 8)?;
    let _crc = u32_at(bytes, 12)?;
    let body = slice_at(bytes, 16, bytes.len() - 16)?;

    match mode {
        MODE_LITERAL => Ok(String::from_utf8_lossy(body).into_owned()),
        MODE_COMPRESSED => {
            let out = decompress(body, raw_size)?;
            Ok(String::from_utf8_lossy(&out).into_owned())
        }
        other => Err(PstError::RtfMalformed {
            reason: format!("unknown mode 0x{other:08X}"),
        }),
    }
}

fn decompress(body: &[u8], raw_size: usize) -> Result<Vec<u8>> {
    let mut dict = [0u8; DICT_SIZE];
    dict[..DICT_SEED.len()].copy_from_slice(DICT_SEED);
    let mut write = DICT_SEED.len();

    let mut out = Vec::with_capacity(raw_size);
    let mut pos = 0usize;

    'outer: while out.len() < raw_size {
        if pos >= body.len() {
            break;
        }
        let control = body[pos];
        pos += 1;
        // Each control byte governs 8 tokens, LSB first: 0 = literal byte,
        // 1 = 12-bit offset / 4-bit length back-reference.
        for bit in 0..8 {
            if out.len() >= raw_size {
                break 'outer;
            }
            if control & (1 << bit) == 0 {
                let Some(&byte) = body.get(pos) else {
                    break 'outer;
                };
                pos += 1;
                out.push(byte);
                dict[write] = byte;
                write = (write + 1) % DICT_SIZE;
            } else {
                let Ok(reference) = slice_at(body, pos, 2) else {
                    break 'outer;
                };
                pos += 2;
                let packed = u16::from_be_bytes([reference[0], reference[1]]);
                let offset = usize::from(packed >> 4);
                let length = usize::from(packed & 0x0F) + 2;
                // A reference at the write cursor is the end marker.
                if offset == write {
                    break 'outer;
                }
                for i in 0..length {
                    if out.len() >= raw_size {
                        break 'outer;
                    }
                    let byte = dict[(offset + i) % DICT_SIZE];
                    out.push(byte);
                    dict[write] = byte;
                    write = (write + 1) % DICT_SIZE;
                }
            }
        }
    }

    if out.len() != raw_size {
        return Err(PstError::RtfLengthMismatch {
            expected: raw_size,
            actual: out.len(),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dictionary_seed_length() {
        assert_eq!(DICT_SEED.len(), 207);
    }

    #[test]
    fn test_header_too_short() {
        assert!(decode(&[0u8; 8]).is_err());
    }
}
