//! Builders for synthetic container images, shared by tests and benches.
//!
//! Everything is assembled in memory against the Unicode layout: a fixed
//! header, a run of blocks, then the two directory trees built bottom-up
//! from their leaves.

use std::io::Write;

use tempfile::NamedTempFile;

use crate::{
    storage::cipher,
    table::{BTH_SIGNATURE, CLIENT_SIG_PROPERTY, CLIENT_SIG_ROWS, HEAP_SIGNATURE, heap::Hid},
    types::{
        BlockId, NID_MESSAGE_STORE, NID_NAME_TO_ID_MAP, NID_ROOT_FOLDER, NodeId, TAG_DISPLAY_NAME,
        TAG_NAMEID_ENTRIES, TAG_NAMEID_STRINGS,
    },
};

const PAGE_SIZE: usize = 512;
const PAGE_META: usize = 488;
const PAGE_TRAILER: usize = 496;
const LEAF_AREA: usize = PAGE_META;

pub const FIXTURE_SUBFOLDERS: [(NodeId, &str); 3] =
    [(322, "Inbox"), (354, "Sent Items"), (386, "Drafts")];
pub const FIXTURE_MESSAGES: [NodeId; 2] = [356, 388];

struct NodeSpec {
    node: NodeId,
    data_block: BlockId,
    subnode_block: BlockId,
    parent: NodeId,
}

/// Assembles a Unicode-format container image from explicit blocks and
/// node-directory entries.
pub struct PstFixture {
    crypt: bool,
    blocks: Vec<(BlockId, Vec<u8>)>,
    nodes: Vec<NodeSpec>,
}

impl PstFixture {
    pub fn new(crypt: bool) -> Self {
        Self {
            crypt,
            blocks: Vec::new(),
            nodes: Vec::new(),
        }
    }

    /// Payload of a data block; ciphered at build time when the image is
    /// marked compressible. Data block ids must keep the low bit clear.
    pub fn add_data_block(&mut self, block: BlockId, payload: Vec<u8>) {
        assert_eq!(block & 1, 0, "data block ids have the low bit clear");
        self.blocks.push((block, payload));
    }

    /// Fan-out or subnode metadata; stored verbatim. Structural ids carry
    /// the low bit.
    pub fn add_structural_block(&mut self, block: BlockId, payload: Vec<u8>) {
        assert_eq!(block & 1, 1, "structural block ids carry the low bit");
        self.blocks.push((block, payload));
    }

    pub fn add_node(
        &mut self,
        node: NodeId,
        data_block: BlockId,
        subnode_block: BlockId,
        parent: NodeId,
    ) {
        self.nodes.push(NodeSpec {
            node,
            data_block,
            subnode_block,
            parent,
        });
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = vec![0u8; 1024];
        out[..4].copy_from_slice(b"!BDN");
        out[10] = 23;
        out[513] = u8::from(self.crypt);

        // Blocks first, recording directory entries as they land.
        let mut block_entries = Vec::new();
        for (block, payload) in &self.blocks {
            let offset = out.len() as u64;
            let mut data = payload.clone();
            if self.crypt && block & 1 == 0 {
                cipher::encode_in_place(&mut data);
            }
            block_entries.push((*block, offset, payload.len() as u16));
            out.extend_from_slice(&data);
        }
        block_entries.sort_by_key(|entry| entry.0);

        let mut node_entries: Vec<&NodeSpec> = self.nodes.iter().collect();
        node_entries.sort_by_key(|spec| spec.node);

        let block_leaves: Vec<(u64, Vec<u8>)> = block_entries
            .iter()
            .map(|(block, offset, size)| {
                let mut item = Vec::with_capacity(24);
                item.extend_from_slice(&block.to_le_bytes());
                item.extend_from_slice(&offset.to_le_bytes());
                item.extend_from_slice(&size.to_le_bytes());
                item.extend_from_slice(&[0u8; 6]);
                (*block, item)
            })
            .collect();
        let node_leaves: Vec<(u64, Vec<u8>)> = node_entries
            .iter()
            .map(|spec| {
                let mut item = Vec::with_capacity(32);
                item.extend_from_slice(&u64::from(spec.node).to_le_bytes());
                item.extend_from_slice(&spec.data_block.to_le_bytes());
                item.extend_from_slice(&spec.subnode_block.to_le_bytes());
                item.extend_from_slice(&spec.parent.to_le_bytes());
                item.extend_from_slice(&[0u8; 4]);
                (u64::from(spec.node), item)
            })
            .collect();

        let node_root = write_tree(&mut out, &node_leaves, 0x81);
        let block_root = write_tree(&mut out, &block_leaves, 0x80);

        out[224..232].copy_from_slice(&node_root.0.to_le_bytes());
        out[232..240].copy_from_slice(&node_root.1.to_le_bytes());
        out[240..248].copy_from_slice(&block_root.0.to_le_bytes());
        out[248..256].copy_from_slice(&block_root.1.to_le_bytes());
        out
    }
}

/// Write one directory level after another until a single root page
/// remains; returns (bid, offset) of the root.
fn write_tree(out: &mut Vec<u8>, leaves: &[(u64, Vec<u8>)], ptype: u8) -> (u64, u64) {
    let mut page_bid = 0x8001u64 + out.len() as u64;
    let width = leaves.first().map_or(24, |leaf| leaf.1.len());
    let per_page = LEAF_AREA / width;

    let mut level = 0u8;
    let mut refs: Vec<(u64, u64, u64)> = Vec::new();
    if leaves.is_empty() {
        let at = write_page(out, &[], width, 0, ptype, page_bid);
        return (page_bid, at);
    }
    for chunk in leaves.chunks(per_page) {
        let items: Vec<&[u8]> = chunk.iter().map(|(_, bytes)| bytes.as_slice()).collect();
        let at = write_page_refs(out, &items, width, level, ptype, page_bid);
        refs.push((chunk[0].0, page_bid, at));
        page_bid += 2;
    }

    while refs.len() > 1 {
        level += 1;
        let per_branch = LEAF_AREA / 24;
        let mut next = Vec::new();
        for chunk in refs.chunks(per_branch) {
            let items: Vec<Vec<u8>> = chunk
                .iter()
                .map(|(key, bid, ib)| {
                    let mut item = Vec::with_capacity(24);
                    item.extend_from_slice(&key.to_le_bytes());
                    item.extend_from_slice(&bid.to_le_bytes());
                    item.extend_from_slice(&ib.to_le_bytes());
                    item
                })
                .collect();
            let slices: Vec<&[u8]> = items.iter().map(|item| item.as_slice()).collect();
            let at = write_page_refs(out, &slices, 24, level, ptype, page_bid);
            next.push((chunk[0].0, page_bid, at));
            page_bid += 2;
        }
        refs = next;
    }
    (refs[0].1, refs[0].2)
}

fn write_page(out: &mut Vec<u8>, items: &[Vec<u8>], width: usize, level: u8, ptype: u8, bid: u64) -> u64 {
    let slices: Vec<&[u8]> = items.iter().map(|item| item.as_slice()).collect();
    write_page_refs(out, &slices, width, level, ptype, bid)
}

fn write_page_refs(
    out: &mut Vec<u8>,
    items: &[&[u8]],
    width: usize,
    level: u8,
    ptype: u8,
    bid: u64,
) -> u64 {
    let offset = out.len() as u64;
    let mut page = vec![0u8; PAGE_SIZE];
    for (i, item) in items.iter().enumerate() {
        page[i * width..i * width + item.len()].copy_from_slice(item);
    }
    page[PAGE_META] = items.len() as u8;
    page[PAGE_META + 1] = (LEAF_AREA / width) as u8;
    page[PAGE_META + 2] = width as u8;
    page[PAGE_META + 3] = level;
    page[PAGE_TRAILER] = ptype;
    page[PAGE_TRAILER + 1] = ptype;
    page[PAGE_TRAILER + 8..PAGE_TRAILER + 16].copy_from_slice(&bid.to_le_bytes());
    out.extend_from_slice(&page);
    offset
}

/// Heap id for page 0, 1-based slot `slot`.
pub fn hid(slot: u32) -> Hid {
    slot << 5
}

/// One heap page with its allocation table; the first page of a heap node.
pub fn build_heap_block(client_sig: u8, user_root: Hid, allocs: &[Vec<u8>]) -> Vec<u8> {
    let mut page = Vec::new();
    page.extend_from_slice(&[0u8, 0]); // allocation-table offset, patched below
    page.push(HEAP_SIGNATURE);
    page.push(client_sig);
    page.extend_from_slice(&user_root.to_le_bytes());
    page.extend_from_slice(&[0u8; 4]); // fill levels

    let mut boundaries = vec![page.len() as u16];
    for alloc in allocs {
        page.extend_from_slice(alloc);
        boundaries.push(page.len() as u16);
    }

    let map_offset = page.len() as u16;
    page[0..2].copy_from_slice(&map_offset.to_le_bytes());
    page.extend_from_slice(&(allocs.len() as u16).to_le_bytes());
    page.extend_from_slice(&0u16.to_le_bytes());
    for boundary in boundaries {
        page.extend_from_slice(&boundary.to_le_bytes());
    }
    page
}

/// A follow-on heap page: bare allocation-table offset header.
pub fn build_heap_follow_block(allocs: &[Vec<u8>]) -> Vec<u8> {
    let mut page = vec![0u8, 0];
    let mut boundaries = vec![page.len() as u16];
    for alloc in allocs {
        page.extend_from_slice(alloc);
        boundaries.push(page.len() as u16);
    }
    let map_offset = page.len() as u16;
    page[0..2].copy_from_slice(&map_offset.to_le_bytes());
    page.extend_from_slice(&(allocs.len() as u16).to_le_bytes());
    page.extend_from_slice(&0u16.to_le_bytes());
    for boundary in boundaries {
        page.extend_from_slice(&boundary.to_le_bytes());
    }
    page
}

pub fn build_bth_header(key_size: u8, value_size: u8, levels: u8, root: Hid) -> Vec<u8> {
    let mut bytes = vec![BTH_SIGNATURE, key_size, value_size, levels];
    bytes.extend_from_slice(&root.to_le_bytes());
    bytes
}

/// A property value as it should land in the fixture.
pub enum PcVal {
    Inline(u32),
    HeapVal(Vec<u8>),
    Subnode(NodeId),
}

/// Whole heap block for a flat property table: header index at slot 1,
/// records at slot 2, out-of-line values following.
pub fn build_pc_block(props: &[(u16, u16, PcVal)]) -> Vec<u8> {
    let mut sorted: Vec<&(u16, u16, PcVal)> = props.iter().collect();
    sorted.sort_by_key(|(id, _, _)| *id);

    let mut records = Vec::new();
    let mut values = Vec::new();
    for (id, ptype, value) in sorted {
        let raw = match value {
            PcVal::Inline(raw) => *raw,
            PcVal::HeapVal(bytes) => {
                values.push(bytes.clone());
                hid(2 + values.len() as u32)
            }
            PcVal::Subnode(node) => *node,
        };
        records.extend_from_slice(&id.to_le_bytes());
        records.extend_from_slice(&ptype.to_le_bytes());
        records.extend_from_slice(&raw.to_le_bytes());
    }

    let root = if props.is_empty() { 0 } else { hid(2) };
    let mut allocs = vec![build_bth_header(2, 6, 0, root), records];
    allocs.extend(values);
    build_heap_block(CLIENT_SIG_PROPERTY, hid(1), &allocs)
}

pub struct FixtureColumn {
    pub id: u16,
    pub ptype: u16,
    pub offset: u16,
    pub width: u8,
    pub bit: u8,
}

/// Whole heap block for a row table. `rows_hnid` is stored verbatim; pass
/// `hid(2)` for a heap-resident matrix (supplied via `matrix`), or a
/// subnode id with `matrix` set to `None`. Extra heap values land after the
/// matrix slot.
pub fn build_tc_block(
    client_sig: u8,
    columns: &[FixtureColumn],
    group_ends: [u16; 4],
    rows_hnid: u32,
    matrix: Option<Vec<u8>>,
    extra: &[Vec<u8>],
) -> Vec<u8> {
    let mut info = vec![CLIENT_SIG_ROWS, columns.len() as u8];
    for end in group_ends {
        info.extend_from_slice(&end.to_le_bytes());
    }
    info.extend_from_slice(&0u32.to_le_bytes()); // row-index hid
    info.extend_from_slice(&rows_hnid.to_le_bytes());
    info.extend_from_slice(&0u32.to_le_bytes()); // deprecated index hid
    for column in columns {
        let tag = (u32::from(column.id) << 16) | u32::from(column.ptype);
        info.extend_from_slice(&tag.to_le_bytes());
        info.extend_from_slice(&column.offset.to_le_bytes());
        info.push(column.width);
        info.push(column.bit);
    }

    let mut allocs = vec![info];
    if let Some(matrix) = matrix {
        allocs.push(matrix);
    }
    allocs.extend_from_slice(extra);
    build_heap_block(client_sig, hid(1), &allocs)
}

/// XBLOCK (level 1) or XXBLOCK (level 2): ordered child block ids.
pub fn build_fanout_block(level: u8, total: u32, children: &[BlockId]) -> Vec<u8> {
    let mut block = vec![0x01, level];
    block.extend_from_slice(&(children.len() as u16).to_le_bytes());
    block.extend_from_slice(&total.to_le_bytes());
    for child in children {
        block.extend_from_slice(&child.to_le_bytes());
    }
    block
}

/// Leaf subnode block: (descriptor id, data block, nested subnode root).
pub fn build_subnode_block(entries: &[(NodeId, BlockId, BlockId)]) -> Vec<u8> {
    let mut block = vec![0x02, 0];
    block.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    block.extend_from_slice(&[0u8; 4]);
    for (node, data_block, subnode_block) in entries {
        block.extend_from_slice(&u64::from(*node).to_le_bytes());
        block.extend_from_slice(&data_block.to_le_bytes());
        block.extend_from_slice(&subnode_block.to_le_bytes());
    }
    block
}

pub fn utf16(text: &str) -> Vec<u8> {
    text.encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect()
}

/// Park an image in a temporary file for path-based open tests; the file
/// is removed when the handle drops.
pub fn write_temp_image(image: &[u8]) -> std::io::Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(image)?;
    file.flush()?;
    Ok(file)
}

/// One name-table row: row id, a display-name reference and its existence
/// bit.
fn name_row(node: NodeId, name_hid: Hid) -> Vec<u8> {
    let mut row = Vec::with_capacity(9);
    row.extend_from_slice(&node.to_le_bytes());
    row.extend_from_slice(&name_hid.to_le_bytes());
    row.push(0x80);
    row
}

fn name_table_block(entries: &[(NodeId, &str)], corrupt: bool) -> Vec<u8> {
    let columns = [FixtureColumn {
        id: TAG_DISPLAY_NAME,
        ptype: 0x001F,
        offset: 4,
        width: 4,
        bit: 0,
    }];
    let mut matrix = Vec::new();
    let extra: Vec<Vec<u8>> = entries.iter().map(|(_, name)| utf16(name)).collect();
    for (i, (node, _)) in entries.iter().enumerate() {
        matrix.extend_from_slice(&name_row(*node, hid(3 + i as u32)));
    }
    let client_sig = if corrupt { 0xAA } else { CLIENT_SIG_ROWS };
    build_tc_block(client_sig, &columns, [8, 8, 8, 9], hid(2), Some(matrix), &extra)
}

/// The standard scenario image: a compressible-ciphered Unicode store named
/// "Personal folders", a root folder with three named subfolders and two
/// messages, and a name-to-id registry.
pub fn sample_file(corrupt_contents: bool) -> Vec<u8> {
    let mut fixture = PstFixture::new(true);

    // Message store
    fixture.add_data_block(
        0x100,
        build_pc_block(&[(
            TAG_DISPLAY_NAME,
            0x001F,
            PcVal::HeapVal(utf16("Personal folders")),
        )]),
    );
    fixture.add_node(NID_MESSAGE_STORE, 0x100, 0, 0);

    // Name-to-id registry: one numeric key and one string key.
    let mut entries = Vec::new();
    entries.extend_from_slice(&0x8233u32.to_le_bytes());
    entries.extend_from_slice(&(3u16 << 1).to_le_bytes());
    entries.extend_from_slice(&0u16.to_le_bytes());
    entries.extend_from_slice(&0u32.to_le_bytes()); // offset of "Keywords"
    entries.extend_from_slice(&((5u16 << 1) | 1).to_le_bytes());
    entries.extend_from_slice(&1u16.to_le_bytes());
    let keywords = utf16("Keywords");
    let mut strings = Vec::new();
    strings.extend_from_slice(&(keywords.len() as u32).to_le_bytes());
    strings.extend_from_slice(&keywords);
    fixture.add_data_block(
        0x102,
        build_pc_block(&[
            (TAG_NAMEID_ENTRIES, 0x0102, PcVal::HeapVal(entries)),
            (TAG_NAMEID_STRINGS, 0x0102, PcVal::HeapVal(strings)),
        ]),
    );
    fixture.add_node(NID_NAME_TO_ID_MAP, 0x102, 0, 0);

    // Root folder and its companion tables.
    fixture.add_data_block(
        0x104,
        build_pc_block(&[(
            TAG_DISPLAY_NAME,
            0x001F,
            PcVal::HeapVal(utf16("Top of Personal Folders")),
        )]),
    );
    fixture.add_node(NID_ROOT_FOLDER, 0x104, 0, 0);

    fixture.add_data_block(0x106, name_table_block(&FIXTURE_SUBFOLDERS, false));
    fixture.add_node(NID_ROOT_FOLDER + 11, 0x106, 0, NID_ROOT_FOLDER);

    let message_rows: Vec<(NodeId, &str)> = FIXTURE_MESSAGES
        .iter()
        .map(|node| (*node, "A message"))
        .collect();
    fixture.add_data_block(0x108, name_table_block(&message_rows, corrupt_contents));
    fixture.add_node(NID_ROOT_FOLDER + 12, 0x108, 0, NID_ROOT_FOLDER);

    // Subfolders and messages as real directory entries under the root.
    let mut next_block = 0x10A;
    for (node, name) in FIXTURE_SUBFOLDERS {
        fixture.add_data_block(
            next_block,
            build_pc_block(&[(TAG_DISPLAY_NAME, 0x001F, PcVal::HeapVal(utf16(name)))]),
        );
        fixture.add_node(node, next_block, 0, NID_ROOT_FOLDER);
        next_block += 2;
    }
    for node in FIXTURE_MESSAGES {
        fixture.add_data_block(
            next_block,
            build_pc_block(&[(TAG_DISPLAY_NAME, 0x001F, PcVal::HeapVal(utf16("A message")))]),
        );
        fixture.add_node(node, next_block, 0, NID_ROOT_FOLDER);
        next_block += 2;
    }

    fixture.build()
}
