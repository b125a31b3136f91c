use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom};

use crate::{
    storage::{
        BLOCK_TYPE_SUBNODE,
        btree::BTree,
        header::{FileHeader, FormatVariant},
    },
    types::{
        BlockId, NodeId,
        error::{PstError, Result},
    },
    utils::bytes::{u8_at, u16_at, u32_at, u64_at},
};

/// One private child of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubnodeEntry {
    pub node: NodeId,
    pub data_block: BlockId,
    /// Nested subnode root for the child's own children, 0 if none.
    pub subnode_block: BlockId,
}

/// A node-scoped nested B-tree of private children: the node's own property
/// blobs, recipient/attachment rows, and embedded sub-objects.
#[derive(Debug, Default)]
pub struct SubnodeTree {
    entries: BTreeMap<NodeId, SubnodeEntry>,
}

impl SubnodeTree {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read the tree rooted at `block`; 0 means the node has no children.
    pub fn read<S: Read + Seek>(
        src: &mut S,
        header: &FileHeader,
        blocks: &BTree,
        block: BlockId,
    ) -> Result<SubnodeTree> {
        let mut tree = SubnodeTree::default();
        if block != 0 {
            tree.read_level(src, header, blocks, block)?;
        }
        Ok(tree)
    }

    pub fn get(&self, node: NodeId) -> Option<&SubnodeEntry> {
        self.entries.get(&node)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SubnodeEntry> {
        self.entries.values()
    }

    fn read_level<S: Read + Seek>(
        &mut self,
        src: &mut S,
        header: &FileHeader,
        blocks: &BTree,
        block: BlockId,
    ) -> Result<()> {
        let entry = blocks
            .lookup_block(src, header.variant, block)?
            .ok_or(PstError::MissingBlock { block })?;
        let mut raw = vec![0u8; entry.size as usize];
        src.seek(SeekFrom::Start(entry.offset))?;
        src.read_exact(&mut raw)?;

        if u8_at(&raw, 0)? != BLOCK_TYPE_SUBNODE {
            return Err(PstError::CorruptedBlock {
                block,
                reason: "expected a subnode block".to_string(),
            });
        }
        let level = u8_at(&raw, 1)?;
        let count = u16_at(&raw, 2)? as usize;
        let base = if header.variant.is_wide() { 8 } else { 4 };

        if level == 0 {
            let width = header.variant.subnode_leaf_width();
            for i in 0..count {
                let entry = parse_leaf(&raw, base + i * width, header.variant)?;
                self.entries.insert(entry.node, entry);
            }
            return Ok(());
        }

        // Branch level: each entry names a child subnode block.
        let width = header.variant.subnode_branch_width();
        for i in 0..count {
            let offset = base + i * width;
            let child = if header.variant.is_wide() {
                u64_at(&raw, offset + 8)?
            } else {
                u64::from(u32_at(&raw, offset + 4)?)
            };
            self.read_level(src, header, blocks, child)?;
        }
        Ok(())
    }
}

fn parse_leaf(raw: &[u8], offset: usize, variant: FormatVariant) -> Result<SubnodeEntry> {
    if variant.is_wide() {
        Ok(SubnodeEntry {
            node: u64_at(raw, offset)? as NodeId,
            data_block: u64_at(raw, offset + 8)?,
            subnode_block: u64_at(raw, offset + 16)?,
        })
    } else {
        Ok(SubnodeEntry {
            node: u32_at(raw, offset)?,
            data_block: u64::from(u32_at(raw, offset + 4)?),
            subnode_block: u64::from(u32_at(raw, offset + 8)?),
        })
    }
}
