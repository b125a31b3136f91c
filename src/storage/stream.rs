use std::io::{Read, Seek, SeekFrom};

use flate2::read::ZlibDecoder;
use log::debug;

use crate::{
    storage::{
        BLOCK_STRUCTURAL_BIT, BLOCK_TYPE_FANOUT, ZLIB_SIGNATURE,
        btree::{BTree, BlockDirEntry},
        cipher,
        header::{CryptMethod, FileHeader, FormatVariant},
    },
    types::{
        BlockId,
        error::{PstError, Result},
    },
    utils::bytes::{u8_at, u16_at, u32_at, u64_at},
};

pub fn is_structural(block: BlockId) -> bool {
    block & BLOCK_STRUCTURAL_BIT != 0
}

/// One physical block's contribution to the logical stream. `start` is the
/// skip-point: the logical offset its first byte maps to.
#[derive(Debug)]
pub struct Segment {
    pub start: u64,
    pub data: Vec<u8>,
}

/// A node's data viewed as one contiguous byte-addressable stream.
///
/// Assembly resolves fan-out (XBLOCK/XXBLOCK) structures into an ordered
/// leaf-block list whose concatenation is the stream, undoes the
/// compressible cipher, and inflates zlib payloads. Skip-points strictly
/// increase and partition the stream with no gaps or overlaps.
#[derive(Debug)]
pub struct NodeStream {
    segments: Vec<Segment>,
    len: u64,
    pos: u64,
}

impl NodeStream {
    /// Build the logical stream for a data block id, chasing fan-out blocks
    /// through the block directory.
    pub fn assemble<S: Read + Seek>(
        src: &mut S,
        header: &FileHeader,
        blocks: &BTree,
        block: BlockId,
    ) -> Result<NodeStream> {
        let entry = lookup_entry(src, header.variant, blocks, block)?;
        let raw = read_block(src, &entry)?;

        let mut payloads = Vec::new();
        if is_structural(block) && !raw.is_empty() && raw[0] == BLOCK_TYPE_FANOUT {
            let leaves = resolve_fanout(src, header.variant, blocks, &raw, entry.block)?;
            for leaf in leaves {
                let leaf_entry = lookup_entry(src, header.variant, blocks, leaf)?;
                let data = read_block(src, &leaf_entry)?;
                payloads.push(decode_payload(data, leaf, header.crypt));
            }
        } else {
            payloads.push(decode_payload(raw, block, header.crypt));
        }

        let payloads = undo_compression(payloads)?;
        Ok(Self::from_parts(payloads))
    }

    /// Assemble directly from ordered block payloads. Used by in-memory
    /// callers and fixtures; applies the same zlib handling as `assemble`.
    pub fn from_blocks(payloads: Vec<Vec<u8>>) -> Result<NodeStream> {
        Ok(Self::from_parts(undo_compression(payloads)?))
    }

    fn from_parts(payloads: Vec<Vec<u8>>) -> NodeStream {
        let mut segments = Vec::with_capacity(payloads.len());
        let mut start = 0u64;
        for data in payloads {
            // Zero-length blocks contribute nothing and would break the
            // strictly-increasing skip-point invariant.
            if data.is_empty() {
                continue;
            }
            let next = start + data.len() as u64;
            segments.push(Segment { start, data });
            start = next;
        }
        NodeStream {
            segments,
            len: start,
            pos: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn page_count(&self) -> usize {
        self.segments.len()
    }

    /// Logical [start, end) extent of one backing block.
    pub fn page_extent(&self, index: usize) -> Option<(u64, u64)> {
        let segment = self.segments.get(index)?;
        Some((segment.start, segment.start + segment.data.len() as u64))
    }

    pub fn seek(&mut self, pos: u64) -> Result<()> {
        if pos > self.len {
            return Err(PstError::SeekPastEnd {
                offset: pos,
                len: self.len,
            });
        }
        self.pos = pos;
        Ok(())
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Fill `buf` completely from the cursor or fail; partial fills never
    /// escape.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        self.read_into(self.pos, buf)?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    /// The one logical-to-physical mapping primitive; every other read is
    /// built on it.
    pub fn read_into(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        if offset + buf.len() as u64 > self.len {
            return Err(PstError::UnexpectedEof {
                offset,
                requested: buf.len(),
                len: self.len,
            });
        }
        // Last segment whose skip-point is <= offset.
        let mut index = self
            .segments
            .partition_point(|segment| segment.start <= offset)
            - 1;
        let mut logical = offset;
        let mut filled = 0usize;
        while filled < buf.len() {
            let segment = &self.segments[index];
            let within = (logical - segment.start) as usize;
            let available = segment.data.len() - within;
            let take = available.min(buf.len() - filled);
            buf[filled..filled + take].copy_from_slice(&segment.data[within..within + take]);
            filled += take;
            logical += take as u64;
            index += 1;
        }
        Ok(())
    }

    pub fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_into(offset, &mut buf)?;
        Ok(buf)
    }

    pub fn read_all(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len as usize);
        for segment in &self.segments {
            out.extend_from_slice(&segment.data);
        }
        out
    }

    pub fn u8_at(&self, offset: u64) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_into(offset, &mut buf)?;
        Ok(buf[0])
    }

    pub fn u16_at(&self, offset: u64) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_into(offset, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn u32_at(&self, offset: u64) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_into(offset, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn u64_at(&self, offset: u64) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_into(offset, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }
}

fn lookup_entry<S: Read + Seek>(
    src: &mut S,
    variant: FormatVariant,
    blocks: &BTree,
    block: BlockId,
) -> Result<BlockDirEntry> {
    blocks
        .lookup_block(src, variant, block)?
        .ok_or(PstError::MissingBlock { block })
}

fn read_block<S: Read + Seek>(src: &mut S, entry: &BlockDirEntry) -> Result<Vec<u8>> {
    let mut data = vec![0u8; entry.size as usize];
    src.seek(SeekFrom::Start(entry.offset))?;
    src.read_exact(&mut data)?;
    Ok(data)
}

fn decode_payload(mut data: Vec<u8>, block: BlockId, crypt: CryptMethod) -> Vec<u8> {
    if crypt == CryptMethod::Compressible && !is_structural(block) {
        cipher::decode_in_place(&mut data);
    }
    data
}

/// Flatten an XBLOCK (flat child list) or XXBLOCK (list of XBLOCKs) into
/// its ordered leaf data-block ids.
fn resolve_fanout<S: Read + Seek>(
    src: &mut S,
    variant: FormatVariant,
    blocks: &BTree,
    raw: &[u8],
    block: BlockId,
) -> Result<Vec<BlockId>> {
    let level = u8_at(raw, 1)?;
    let count = u16_at(raw, 2)? as usize;
    let id_width = if variant.is_wide() { 8 } else { 4 };

    let mut children = Vec::with_capacity(count);
    for i in 0..count {
        let offset = 8 + i * id_width;
        let child = if variant.is_wide() {
            u64_at(raw, offset)?
        } else {
            u64::from(u32_at(raw, offset)?)
        };
        children.push(child);
    }

    match level {
        1 => Ok(children),
        2 => {
            let mut leaves = Vec::new();
            for child in children {
                let entry = lookup_entry(src, variant, blocks, child)?;
                let child_raw = read_block(src, &entry)?;
                if child_raw.is_empty() || child_raw[0] != BLOCK_TYPE_FANOUT {
                    return Err(PstError::CorruptedBlock {
                        block: child,
                        reason: "expected a fan-out child".to_string(),
                    });
                }
                if u8_at(&child_raw, 1)? != 1 {
                    return Err(PstError::CorruptedBlock {
                        block: child,
                        reason: "fan-out nesting deeper than two levels".to_string(),
                    });
                }
                leaves.extend(resolve_fanout(src, variant, blocks, &child_raw, child)?);
            }
            Ok(leaves)
        }
        other => Err(PstError::CorruptedBlock {
            block,
            reason: format!("unknown fan-out level {other}"),
        }),
    }
}

/// Detect and undo zlib compression over the ordered block payloads.
///
/// One compressed stream may span the whole concatenation, or each block
/// may carry an independent stream; the second block's signature decides.
fn undo_compression(payloads: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>> {
    let compressed = payloads
        .first()
        .is_some_and(|data| data.starts_with(&ZLIB_SIGNATURE));
    if !compressed {
        return Ok(payloads);
    }

    let multi_stream = payloads
        .get(1)
        .is_some_and(|data| data.starts_with(&ZLIB_SIGNATURE));
    if multi_stream {
        debug!("inflating {} independent zlib streams", payloads.len());
        payloads.into_iter().map(|data| inflate(&data)).collect()
    } else {
        debug!("inflating one zlib stream over {} blocks", payloads.len());
        let mut whole = Vec::new();
        for data in &payloads {
            whole.extend_from_slice(data);
        }
        Ok(vec![inflate(&whole)?])
    }
}

fn inflate(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(bytes)
        .read_to_end(&mut out)
        .map_err(|err| PstError::Decompression {
            details: err.to_string(),
        })?;
    Ok(out)
}
