use std::io::{Read, Seek, SeekFrom};

use crate::{
    storage::header::{BlockRef, FormatVariant},
    types::{
        BlockId, NodeId,
        error::{PstError, Result},
    },
    utils::bytes::{u8_at, u16_at, u32_at, u64_at},
};

/// Node-directory leaf: where a node's data lives and who owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeDirEntry {
    pub node: NodeId,
    pub data_block: BlockId,
    /// 0 when the node has no private children.
    pub subnode_block: BlockId,
    pub parent: NodeId,
}

/// Block-directory leaf: where a block's bytes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDirEntry {
    pub block: BlockId,
    pub offset: u64,
    pub size: u32,
}

/// Read-only point-lookup over one of the file's two on-disk B-trees.
///
/// Pages are fixed-size with their metadata quad (entry count, capacity,
/// entry width, levels-to-leaf) just before the page trailer. Branch items
/// are key + child page reference; descent follows the last item whose key
/// is <= the target.
#[derive(Debug, Clone, Copy)]
pub struct BTree {
    pub root: BlockRef,
}

struct PageMeta {
    count: usize,
    width: usize,
    level: u8,
}

impl BTree {
    pub fn new(root: BlockRef) -> Self {
        Self { root }
    }

    pub fn lookup_node<S: Read + Seek>(
        &self,
        src: &mut S,
        variant: FormatVariant,
        node: NodeId,
    ) -> Result<Option<NodeDirEntry>> {
        match self.find_leaf_item(src, variant, u64::from(node))? {
            Some(item) => Ok(Some(parse_node_entry(&item, variant)?)),
            None => Ok(None),
        }
    }

    pub fn lookup_block<S: Read + Seek>(
        &self,
        src: &mut S,
        variant: FormatVariant,
        block: BlockId,
    ) -> Result<Option<BlockDirEntry>> {
        match self.find_leaf_item(src, variant, block)? {
            Some(item) => Ok(Some(parse_block_entry(&item, variant)?)),
            None => Ok(None),
        }
    }

    /// Visit every node-directory leaf once, left to right, so entries
    /// arrive in ascending node-id order.
    pub fn walk_nodes<S: Read + Seek>(
        &self,
        src: &mut S,
        variant: FormatVariant,
        visit: &mut dyn FnMut(&NodeDirEntry),
    ) -> Result<()> {
        self.walk_page(src, variant, self.root, visit)
    }

    fn walk_page<S: Read + Seek>(
        &self,
        src: &mut S,
        variant: FormatVariant,
        page_ref: BlockRef,
        visit: &mut dyn FnMut(&NodeDirEntry),
    ) -> Result<()> {
        let page = load_page(src, variant, &page_ref)?;
        let meta = page_meta(&page, variant)?;
        if meta.level == 0 {
            for i in 0..meta.count {
                let item = &page[i * meta.width..(i + 1) * meta.width];
                visit(&parse_node_entry(item, variant)?);
            }
            return Ok(());
        }
        for i in 0..meta.count {
            let offset = i * meta.width;
            let child = branch_child(&page, offset, variant)?;
            self.walk_page(src, variant, child, visit)?;
        }
        Ok(())
    }

    fn find_leaf_item<S: Read + Seek>(
        &self,
        src: &mut S,
        variant: FormatVariant,
        key: u64,
    ) -> Result<Option<Vec<u8>>> {
        let mut page_ref = self.root;
        loop {
            let page = load_page(src, variant, &page_ref)?;
            let meta = page_meta(&page, variant)?;

            if meta.level == 0 {
                for i in 0..meta.count {
                    let offset = i * meta.width;
                    if item_key(&page, offset, variant)? == key {
                        return Ok(Some(page[offset..offset + meta.width].to_vec()));
                    }
                }
                return Ok(None);
            }

            // Branch level: descend into the last item whose key <= target.
            let mut child = None;
            for i in 0..meta.count {
                let offset = i * meta.width;
                if item_key(&page, offset, variant)? > key {
                    break;
                }
                child = Some(branch_child(&page, offset, variant)?);
            }
            match child {
                Some(next) => page_ref = next,
                None => return Ok(None),
            }
        }
    }
}

fn load_page<S: Read + Seek>(
    src: &mut S,
    variant: FormatVariant,
    page_ref: &BlockRef,
) -> Result<Vec<u8>> {
    let mut page = vec![0u8; variant.page_size()];
    src.seek(SeekFrom::Start(page_ref.offset))?;
    src.read_exact(&mut page)?;
    Ok(page)
}

fn page_meta(page: &[u8], variant: FormatVariant) -> Result<PageMeta> {
    let meta_offset = variant.page_meta_offset();
    let count = u8_at(page, meta_offset)? as usize;
    let capacity = u8_at(page, meta_offset + 1)? as usize;
    let width = u8_at(page, meta_offset + 2)? as usize;
    let level = u8_at(page, meta_offset + 3)?;

    if count > capacity || width == 0 || count * width > meta_offset {
        return Err(PstError::CorruptedPage {
            reason: format!("{count} items of {width} bytes exceed the page"),
        });
    }
    if level > 8 {
        return Err(PstError::CorruptedPage {
            reason: format!("implausible level {level}"),
        });
    }
    Ok(PageMeta {
        count,
        width,
        level,
    })
}

fn item_key(page: &[u8], offset: usize, variant: FormatVariant) -> Result<u64> {
    if variant.is_wide() {
        u64_at(page, offset)
    } else {
        Ok(u64::from(u32_at(page, offset)?))
    }
}

fn branch_child(page: &[u8], offset: usize, variant: FormatVariant) -> Result<BlockRef> {
    if variant.is_wide() {
        Ok(BlockRef {
            block: u64_at(page, offset + 8)?,
            offset: u64_at(page, offset + 16)?,
        })
    } else {
        Ok(BlockRef {
            block: u64::from(u32_at(page, offset + 4)?),
            offset: u64::from(u32_at(page, offset + 8)?),
        })
    }
}

fn parse_node_entry(item: &[u8], variant: FormatVariant) -> Result<NodeDirEntry> {
    if variant.is_wide() {
        Ok(NodeDirEntry {
            node: u64_at(item, 0)? as NodeId,
            data_block: u64_at(item, 8)?,
            subnode_block: u64_at(item, 16)?,
            parent: u32_at(item, 24)?,
        })
    } else {
        Ok(NodeDirEntry {
            node: u32_at(item, 0)?,
            data_block: u64::from(u32_at(item, 4)?),
            subnode_block: u64::from(u32_at(item, 8)?),
            parent: u32_at(item, 12)?,
        })
    }
}

fn parse_block_entry(item: &[u8], variant: FormatVariant) -> Result<BlockDirEntry> {
    if variant.is_wide() {
        Ok(BlockDirEntry {
            block: u64_at(item, 0)?,
            offset: u64_at(item, 8)?,
            size: u32::from(u16_at(item, 16)?),
        })
    } else {
        Ok(BlockDirEntry {
            block: u64::from(u32_at(item, 0)?),
            offset: u64::from(u32_at(item, 4)?),
            size: u32::from(u16_at(item, 8)?),
        })
    }
}
