pub mod name_map;

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::{
    container::name_map::{NameKey, NameToIdMap},
    storage::{
        HEADER_LEN,
        btree::{BTree, BlockDirEntry, NodeDirEntry},
        header::FileHeader,
        stream::NodeStream,
        subnode::SubnodeTree,
    },
    table::{
        heap::Heap,
        property::PropertyContext,
        rows::{RowStore, TableContext, TableRow},
    },
    types::{
        BlockId, CONTENTS_TABLE_OFFSET, HIERARCHY_TABLE_OFFSET, NodeId, PropertyId,
        error::{PstError, Result},
        node::NodeKind,
        value::{PropertyType, PropertyValue},
    },
};

/// Backing bytes of an open container: a file on disk or an in-memory
/// buffer.
#[derive(Debug)]
pub enum PstSource {
    File(File),
    Memory(Cursor<Vec<u8>>),
}

impl Read for PstSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            PstSource::File(file) => file.read(buf),
            PstSource::Memory(cursor) => cursor.read(buf),
        }
    }
}

impl Seek for PstSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            PstSource::File(file) => file.seek(pos),
            PstSource::Memory(cursor) => cursor.seek(pos),
        }
    }
}

/// Which of a folder's companion tables to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Subfolder listing, at folder id + 11.
    Hierarchy,
    /// Message listing, at folder id + 12.
    Contents,
    /// The node itself already is a table.
    Raw,
}

/// Decoded flat properties of one node, with typed accessors.
#[derive(Debug)]
pub struct NodeProperties {
    node: NodeId,
    props: PropertyContext,
}

impl NodeProperties {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn get(&self, id: PropertyId) -> Option<&PropertyValue> {
        self.props.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PropertyId, &PropertyValue)> {
        self.props.iter()
    }

    pub fn get_int(&self, id: PropertyId, default: i64) -> i64 {
        self.props.get(id).and_then(|v| v.as_i64()).unwrap_or(default)
    }

    pub fn get_bool(&self, id: PropertyId, default: bool) -> bool {
        self.props
            .get(id)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }

    pub fn get_string(&self, id: PropertyId, default: &str) -> String {
        self.props
            .get(id)
            .and_then(|v| v.as_str())
            .unwrap_or(default)
            .to_string()
    }

    pub fn get_date(
        &self,
        id: PropertyId,
        default: Option<DateTime<Utc>>,
    ) -> Option<DateTime<Utc>> {
        self.props.get(id).and_then(|v| v.as_time()).or(default)
    }

    pub fn get_binary(&self, id: PropertyId, default: &[u8]) -> Vec<u8> {
        self.props
            .get(id)
            .and_then(|v| v.as_bytes())
            .unwrap_or(default)
            .to_vec()
    }
}

/// An open PST/OST container.
///
/// All decode state is re-derived from raw bytes per access; the only
/// instance-level caches are the name-to-id registry built at open and the
/// directory-walk child map built on the first fallback. Methods touching
/// the shared file cursor take `&mut self`; callers sharing one container
/// across threads must serialize access.
pub struct PstFile {
    source: PstSource,
    header: FileHeader,
    nodes: BTree,
    blocks: BTree,
    name_map: Option<NameToIdMap>,
    children: Option<HashMap<NodeId, Vec<NodeId>>>,
}

impl PstFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<PstFile> {
        let file = File::open(path.as_ref())?;
        Self::from_source(PstSource::File(file))
    }

    pub fn open_bytes(bytes: Vec<u8>) -> Result<PstFile> {
        Self::from_source(PstSource::Memory(Cursor::new(bytes)))
    }

    fn from_source(mut source: PstSource) -> Result<PstFile> {
        let mut header_bytes = vec![0u8; HEADER_LEN];
        source.seek(SeekFrom::Start(0))?;
        source.read_exact(&mut header_bytes).map_err(|_| {
            PstError::InvalidHeader {
                reason: "file shorter than the fixed header".to_string(),
            }
        })?;
        let header = FileHeader::parse(&header_bytes)?;
        debug!(
            "opened {:?} container, crypt {:?}",
            header.variant, header.crypt
        );

        let mut pst = PstFile {
            source,
            header,
            nodes: BTree::new(header.node_root),
            blocks: BTree::new(header.block_root),
            name_map: None,
            children: None,
        };
        pst.name_map = match NameToIdMap::build(&mut pst) {
            Ok(map) => map,
            Err(err) => {
                warn!("name-to-id map unavailable: {err}");
                None
            }
        };
        Ok(pst)
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn node_entry(&mut self, node: NodeId) -> Result<Option<NodeDirEntry>> {
        self.nodes
            .lookup_node(&mut self.source, self.header.variant, node)
    }

    pub fn block_entry(&mut self, block: BlockId) -> Result<Option<BlockDirEntry>> {
        self.blocks
            .lookup_block(&mut self.source, self.header.variant, block)
    }

    fn require_node(&mut self, node: NodeId) -> Result<NodeDirEntry> {
        self.node_entry(node)?
            .ok_or(PstError::MissingNode { node })
    }

    /// The node's data as one logical stream.
    pub fn node_stream(&mut self, node: NodeId) -> Result<NodeStream> {
        let entry = self.require_node(node)?;
        NodeStream::assemble(&mut self.source, &self.header, &self.blocks, entry.data_block)
    }

    fn subnode_tree(&mut self, entry: &NodeDirEntry) -> Result<SubnodeTree> {
        SubnodeTree::read(
            &mut self.source,
            &self.header,
            &self.blocks,
            entry.subnode_block,
        )
    }

    fn subnode_stream(&mut self, tree: &SubnodeTree, node: NodeId) -> Result<NodeStream> {
        let entry = tree.get(node).ok_or(PstError::MissingNode { node })?;
        NodeStream::assemble(&mut self.source, &self.header, &self.blocks, entry.data_block)
    }

    fn node_heap(&mut self, node: NodeId) -> Result<(Heap, SubnodeTree)> {
        let entry = self.require_node(node)?;
        let stream =
            NodeStream::assemble(&mut self.source, &self.header, &self.blocks, entry.data_block)?;
        let subnodes = self.subnode_tree(&entry)?;
        Ok((Heap::parse(stream)?, subnodes))
    }

    /// Decode a node's flat properties, chasing externally-stored values
    /// through its subnode tree. Values whose subnode is absent stay
    /// flagged as `PropertyValue::External`.
    pub fn properties(&mut self, node: NodeId) -> Result<NodeProperties> {
        let (heap, subnodes) = self.node_heap(node)?;
        let mut props = PropertyContext::parse(&heap)?;

        let externals: Vec<(PropertyId, NodeId, PropertyType)> = props
            .iter()
            .filter_map(|(id, value)| match value {
                PropertyValue::External { node, kind } => Some((*id, *node, *kind)),
                _ => None,
            })
            .collect();
        for (id, subnode, kind) in externals {
            if subnodes.get(subnode).is_none() {
                continue;
            }
            let bytes = self.subnode_stream(&subnodes, subnode)?.read_all();
            props.put(id, PropertyValue::decode_buffer(kind, bytes));
        }

        Ok(NodeProperties { node, props })
    }

    /// Raw bytes of a property stored outside the heap, fetched through the
    /// node's subnode tree. `None` when the property is not external or the
    /// subnode is absent.
    pub fn resolve_external(&mut self, node: NodeId, id: PropertyId) -> Result<Option<Vec<u8>>> {
        let (heap, subnodes) = self.node_heap(node)?;
        let props = PropertyContext::parse(&heap)?;
        let Some(PropertyValue::External { node: subnode, .. }) = props.get(id) else {
            return Ok(None);
        };
        if subnodes.get(*subnode).is_none() {
            return Ok(None);
        }
        Ok(Some(self.subnode_stream(&subnodes, *subnode)?.read_all()))
    }

    /// Decode a row table: a folder companion table or any raw table node.
    pub fn enumerate_rows(&mut self, node: NodeId, which: TableKind) -> Result<Vec<TableRow>> {
        self.enumerate_rows_range(node, which, 0, usize::MAX, None)
    }

    /// Range and single-column form of `enumerate_rows`. Ranges past the
    /// logical row count come back empty.
    pub fn enumerate_rows_range(
        &mut self,
        node: NodeId,
        which: TableKind,
        start: usize,
        count: usize,
        only: Option<PropertyId>,
    ) -> Result<Vec<TableRow>> {
        let table_node = match which {
            TableKind::Hierarchy => node + HIERARCHY_TABLE_OFFSET,
            TableKind::Contents => node + CONTENTS_TABLE_OFFSET,
            TableKind::Raw => node,
        };
        let (heap, subnodes) = self.node_heap(table_node)?;
        let tc = TableContext::parse(&heap)?;

        let store = if let Some(store) = tc.row_store_inline(&heap)? {
            store
        } else if let Some(subnode) = tc.row_store_subnode() {
            RowStore::Stream(self.subnode_stream(&subnodes, subnode)?)
        } else {
            RowStore::Empty
        };

        let capacity = self.header.variant.row_page_capacity();
        let mut rows = tc.read_rows(&heap, &store, capacity, start, count, only)?;

        for row in &mut rows {
            let externals: Vec<(PropertyId, NodeId, PropertyType)> = row
                .values
                .iter()
                .filter_map(|(id, value)| match value {
                    PropertyValue::External { node, kind } => Some((*id, *node, *kind)),
                    _ => None,
                })
                .collect();
            for (id, subnode, kind) in externals {
                if subnodes.get(subnode).is_none() {
                    continue;
                }
                let bytes = self.subnode_stream(&subnodes, subnode)?.read_all();
                row.values
                    .insert(id, PropertyValue::decode_buffer(kind, bytes));
            }
        }
        Ok(rows)
    }

    pub fn folder_hierarchy(&mut self, folder: NodeId) -> Result<Vec<TableRow>> {
        self.enumerate_rows(folder, TableKind::Hierarchy)
    }

    pub fn folder_contents(&mut self, folder: NodeId) -> Result<Vec<TableRow>> {
        self.enumerate_rows(folder, TableKind::Contents)
    }

    /// Message children of a folder, preferring its contents table. When
    /// that table fails to decode, fall back to one full walk of the node
    /// directory (cached for the life of this container) filtered to
    /// message-type ids, in node-id order.
    pub fn folder_message_children(&mut self, folder: NodeId) -> Result<Vec<NodeId>> {
        match self.folder_contents(folder) {
            Ok(rows) => Ok(rows
                .iter()
                .map(|row| row.row_id)
                .filter(|id| NodeKind::of(*id).is_message())
                .collect()),
            Err(err) => {
                warn!("contents table of folder {folder} unreadable ({err}), walking directory");
                self.ensure_child_map()?;
                let children = self
                    .children
                    .as_ref()
                    .and_then(|map| map.get(&folder))
                    .cloned()
                    .unwrap_or_default();
                Ok(children
                    .into_iter()
                    .filter(|id| NodeKind::of(*id).is_message())
                    .collect())
            }
        }
    }

    fn ensure_child_map(&mut self) -> Result<()> {
        if self.children.is_some() {
            return Ok(());
        }
        let mut map: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        self.nodes
            .walk_nodes(&mut self.source, self.header.variant, &mut |entry| {
                if entry.parent != entry.node {
                    map.entry(entry.parent).or_default().push(entry.node);
                }
            })?;
        debug!("directory walk indexed {} parents", map.len());
        self.children = Some(map);
        Ok(())
    }

    /// Look a named property up in the registry built at open.
    pub fn name_to_id(&self, key: &NameKey, guid_set: u16) -> Option<PropertyId> {
        self.name_map.as_ref()?.lookup(key, guid_set)
    }
}
