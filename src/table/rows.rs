use std::collections::BTreeMap;

use crate::{
    storage::stream::NodeStream,
    table::{
        CLIENT_SIG_ROWS,
        heap::{self, Heap, Hid, Hnid},
    },
    types::{
        NodeId, PropertyId, TAG_ROW_ID,
        error::{PstError, Result},
        value::{PropertyType, PropertyValue},
    },
    utils::bytes::{u8_at, u16_at, u32_at},
};

/// One column of a row table: tag, wire type, byte range within a row, and
/// the existence bit guarding it.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub id: PropertyId,
    pub kind: PropertyType,
    pub offset: u16,
    pub width: u8,
    pub bit: u8,
}

/// One decoded row. The leading dword of every row is surfaced both as
/// `row_id` and as the 0x67F2 pseudo-column.
#[derive(Debug, Clone)]
pub struct TableRow {
    pub row_id: u32,
    pub values: BTreeMap<PropertyId, PropertyValue>,
}

/// Where the row matrix lives: inline in the heap, or in a subnode stream
/// once it outgrows a single heap allocation.
#[derive(Debug)]
pub enum RowStore {
    Empty,
    Inline(Vec<u8>),
    Stream(NodeStream),
}

impl RowStore {
    pub fn len(&self) -> u64 {
        match self {
            RowStore::Empty => 0,
            RowStore::Inline(bytes) => bytes.len() as u64,
            RowStore::Stream(stream) => stream.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        match self {
            RowStore::Empty => Err(PstError::UnexpectedEof {
                offset,
                requested: len,
                len: 0,
            }),
            RowStore::Inline(bytes) => {
                let end = offset as usize + len;
                if end > bytes.len() {
                    return Err(PstError::UnexpectedEof {
                        offset,
                        requested: len,
                        len: bytes.len() as u64,
                    });
                }
                Ok(bytes[offset as usize..end].to_vec())
            }
            RowStore::Stream(stream) => stream.read_at(offset, len),
        }
    }
}

/// Row/column reader for a node's repeating children (folder listings,
/// recipients, attachments).
#[derive(Debug)]
pub struct TableContext {
    pub columns: Vec<Column>,
    /// Ending offsets of the 4-, 2- and 1-byte column groups; the last is
    /// also the total row width.
    pub group_ends: [u16; 4],
    pub row_index: Hid,
    /// Raw hnid of the row matrix; classify to locate it.
    pub rows_source: u32,
}

impl TableContext {
    pub fn parse(heap: &Heap) -> Result<TableContext> {
        if heap.client_sig != CLIENT_SIG_ROWS {
            return Err(PstError::SignatureMismatch {
                expected: CLIENT_SIG_ROWS,
                actual: heap.client_sig,
            });
        }
        let info = heap.resolve(heap.user_root)?;
        let sig = u8_at(&info, 0)?;
        if sig != CLIENT_SIG_ROWS {
            return Err(PstError::SignatureMismatch {
                expected: CLIENT_SIG_ROWS,
                actual: sig,
            });
        }
        let column_count = u8_at(&info, 1)? as usize;
        let group_ends = [
            u16_at(&info, 2)?,
            u16_at(&info, 4)?,
            u16_at(&info, 6)?,
            u16_at(&info, 8)?,
        ];
        let row_index = u32_at(&info, 10)?;
        let rows_source = u32_at(&info, 14)?;

        // Column descriptors follow the deprecated index hid at offset 18.
        let mut columns = Vec::with_capacity(column_count);
        for i in 0..column_count {
            let offset = 22 + i * 8;
            let tag = u32_at(&info, offset)?;
            let column = Column {
                id: (tag >> 16) as PropertyId,
                kind: PropertyType::from_u16(tag as u16),
                offset: u16_at(&info, offset + 4)?,
                width: u8_at(&info, offset + 6)?,
                bit: u8_at(&info, offset + 7)?,
            };
            if !matches!(column.width, 1 | 2 | 4 | 8) {
                return Err(PstError::TableDecode {
                    reason: format!("column 0x{:04X} has width {}", column.id, column.width),
                });
            }
            columns.push(column);
        }

        let tc = TableContext {
            columns,
            group_ends,
            row_index,
            rows_source,
        };
        if tc.row_width() == 0 || tc.bitmap_offset() > tc.row_width() {
            return Err(PstError::TableDecode {
                reason: "row layout offsets out of order".to_string(),
            });
        }
        Ok(tc)
    }

    pub fn row_width(&self) -> usize {
        self.group_ends[3] as usize
    }

    pub fn bitmap_offset(&self) -> usize {
        self.group_ends[2] as usize
    }

    /// Logical row count of a matrix of `store_len` bytes packed into pages
    /// of `page_capacity` bytes with per-page padding.
    pub fn row_count(&self, store_len: u64, page_capacity: usize) -> usize {
        let width = self.row_width() as u64;
        let capacity = page_capacity as u64;
        let rows_per_page = capacity / width;
        let full_pages = store_len / capacity;
        let remainder = store_len % capacity;
        (full_pages * rows_per_page + remainder / width) as usize
    }

    /// Decode rows [start, start+count). Ranges past the logical end clamp
    /// to empty. `only` restricts extraction to a single column.
    pub fn read_rows(
        &self,
        heap: &Heap,
        store: &RowStore,
        page_capacity: usize,
        start: usize,
        count: usize,
        only: Option<PropertyId>,
    ) -> Result<Vec<TableRow>> {
        let width = self.row_width();
        let rows_per_page = page_capacity / width;
        if rows_per_page == 0 {
            return Err(PstError::TableDecode {
                reason: format!("row width {width} exceeds page capacity {page_capacity}"),
            });
        }
        let total = self.row_count(store.len(), page_capacity);
        if start >= total {
            return Ok(Vec::new());
        }
        let end = total.min(start.saturating_add(count));

        let mut rows = Vec::with_capacity(end - start);
        for index in start..end {
            let page = index / rows_per_page;
            let slot = index % rows_per_page;
            let offset = (page * page_capacity + slot * width) as u64;
            rows.push(self.decode_row(heap, &store.read(offset, width)?, only)?);
        }
        Ok(rows)
    }

    fn decode_row(&self, heap: &Heap, row: &[u8], only: Option<PropertyId>) -> Result<TableRow> {
        let row_id = u32_at(row, 0)?;
        let mut values = BTreeMap::new();
        values.insert(TAG_ROW_ID, PropertyValue::Int32(row_id as i32));

        let bitmap = &row[self.bitmap_offset()..];
        for column in &self.columns {
            if let Some(only_id) = only {
                if column.id != only_id {
                    continue;
                }
            }
            let byte = usize::from(column.bit / 8);
            if byte >= bitmap.len() {
                return Err(PstError::TableDecode {
                    reason: format!("existence bit {} outside the bitmap", column.bit),
                });
            }
            // A clear existence bit hides the column no matter what the
            // underlying bytes hold.
            if bitmap[byte] & (1 << (7 - column.bit % 8)) == 0 {
                continue;
            }

            let cell_start = column.offset as usize;
            let cell_end = cell_start + column.width as usize;
            if cell_end > self.bitmap_offset() {
                return Err(PstError::TableDecode {
                    reason: format!("column 0x{:04X} escapes its row", column.id),
                });
            }
            let cell = &row[cell_start..cell_end];
            let value = match column.width {
                4 if !column.kind.is_inline() => match heap::classify(u32_at(cell, 0)?) {
                    Hnid::Empty => PropertyValue::Null,
                    Hnid::Heap(hid) => {
                        PropertyValue::decode_buffer(column.kind, heap.resolve(hid)?)
                    }
                    Hnid::Node(node) => PropertyValue::External {
                        node,
                        kind: column.kind,
                    },
                },
                _ => PropertyValue::decode_fixed(column.kind, cell),
            };
            values.insert(column.id, value);

            if only.is_some() {
                break;
            }
        }
        Ok(TableRow { row_id, values })
    }

    /// Locate the row matrix from the raw hnid stored in the table header.
    pub fn row_store_inline(&self, heap: &Heap) -> Result<Option<RowStore>> {
        match heap::classify(self.rows_source) {
            Hnid::Empty => Ok(Some(RowStore::Empty)),
            Hnid::Heap(hid) => Ok(Some(RowStore::Inline(heap.resolve(hid)?))),
            Hnid::Node(_) => Ok(None),
        }
    }

    /// The subnode holding the row matrix, when it is not heap-resident.
    pub fn row_store_subnode(&self) -> Option<NodeId> {
        match heap::classify(self.rows_source) {
            Hnid::Node(node) => Some(node),
            _ => None,
        }
    }
}
