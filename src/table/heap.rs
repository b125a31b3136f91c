use crate::{
    storage::stream::NodeStream,
    table::HEAP_SIGNATURE,
    types::{
        NodeId,
        error::{PstError, Result},
    },
};

/// Heap id: page index in the high word, 1-based slot index in bits 5..16,
/// type tag zero in the low 5 bits.
pub type Hid = u32;

/// A 4-byte value slot is either empty, a heap id, or a node id into the
/// owning node's subnode tree — told apart by the low 5 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hnid {
    Empty,
    Heap(Hid),
    Node(NodeId),
}

pub fn classify(raw: u32) -> Hnid {
    if raw == 0 {
        Hnid::Empty
    } else if raw & 0x1F == 0 {
        Hnid::Heap(raw)
    } else {
        Hnid::Node(raw)
    }
}

/// Paged allocator layered over one node's logical stream. Each backing
/// block is one page; a small allocation table near the end of every page
/// maps slot indices to [start, end) byte ranges.
#[derive(Debug)]
pub struct Heap {
    stream: NodeStream,
    pub client_sig: u8,
    pub user_root: Hid,
}

impl Heap {
    pub fn parse(stream: NodeStream) -> Result<Heap> {
        let sig = stream.u8_at(2)?;
        if sig != HEAP_SIGNATURE {
            return Err(PstError::SignatureMismatch {
                expected: HEAP_SIGNATURE,
                actual: sig,
            });
        }
        let client_sig = stream.u8_at(3)?;
        let user_root = stream.u32_at(4)?;
        Ok(Heap {
            stream,
            client_sig,
            user_root,
        })
    }

    pub fn stream(&self) -> &NodeStream {
        &self.stream
    }

    /// Resolve a heap id to its bytes. Id 0 is the empty range; a slot or
    /// page index past the allocation table is a corrupt file.
    pub fn resolve(&self, hid: Hid) -> Result<Vec<u8>> {
        if hid == 0 {
            return Ok(Vec::new());
        }
        if hid & 0x1F != 0 {
            return Err(PstError::InvalidHeapRef {
                hid,
                reason: "not a heap reference".to_string(),
            });
        }
        let page = (hid >> 16) as usize;
        let slot = ((hid >> 5) & 0x7FF) as usize;

        let (page_start, page_end) =
            self.stream
                .page_extent(page)
                .ok_or_else(|| PstError::InvalidHeapRef {
                    hid,
                    reason: format!("page {page} of {}", self.stream.page_count()),
                })?;

        // Every page header starts with the u16 offset of its allocation
        // table: cAlloc, cFree, then cAlloc+1 range boundaries.
        let map_offset = page_start + u64::from(self.stream.u16_at(page_start)?);
        let alloc_count = self.stream.u16_at(map_offset)? as usize;
        if slot == 0 || slot > alloc_count {
            return Err(PstError::InvalidHeapRef {
                hid,
                reason: format!("slot {slot} of {alloc_count}"),
            });
        }

        let start = page_start + u64::from(self.stream.u16_at(map_offset + 4 + 2 * (slot as u64 - 1))?);
        let end = page_start + u64::from(self.stream.u16_at(map_offset + 4 + 2 * slot as u64)?);
        if end < start || end > page_end {
            return Err(PstError::InvalidHeapRef {
                hid,
                reason: format!("range {start}..{end} escapes page {page}"),
            });
        }
        self.stream.read_at(start, (end - start) as usize)
    }
}
