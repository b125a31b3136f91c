use crate::{
    storage::{
        CRYPT_OFFSET_ANSI, CRYPT_OFFSET_UNICODE, HEADER_LEN, PST_MAGIC, ROOT_BLOCK_TREE_ANSI,
        ROOT_BLOCK_TREE_UNICODE, ROOT_NODE_TREE_ANSI, ROOT_NODE_TREE_UNICODE, VERSION_OFFSET,
    },
    types::{
        BlockId,
        error::{PstError, Result},
    },
    utils::bytes::{u8_at, u32_at, u64_at},
};

/// On-disk layout family, selected by the header version byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVariant {
    /// 32-bit ids and offsets, 512-byte index pages.
    Ansi,
    /// 64-bit ids and offsets, 512-byte index pages.
    Unicode,
    /// 64-bit ids and offsets, 4096-byte index pages (2013 large-page files).
    Unicode4k,
}

impl FormatVariant {
    pub fn from_version(version: u8) -> Result<Self> {
        match version {
            14 | 15 => Ok(FormatVariant::Ansi),
            23 => Ok(FormatVariant::Unicode),
            36 => Ok(FormatVariant::Unicode4k),
            _ => Err(PstError::UnsupportedVersion { version }),
        }
    }

    pub fn is_wide(&self) -> bool {
        !matches!(self, FormatVariant::Ansi)
    }

    pub fn page_size(&self) -> usize {
        match self {
            FormatVariant::Ansi | FormatVariant::Unicode => 512,
            FormatVariant::Unicode4k => 4096,
        }
    }

    /// Offset of the page trailer; the page metadata quad (entry count,
    /// capacity, entry width, level) sits in the 8 bytes before it.
    pub fn page_trailer_offset(&self) -> usize {
        match self {
            FormatVariant::Ansi => 500,
            FormatVariant::Unicode => 496,
            FormatVariant::Unicode4k => 4096 - 24,
        }
    }

    pub fn page_meta_offset(&self) -> usize {
        self.page_trailer_offset() - 8
    }

    /// Width of a subnode leaf entry (descriptor id, data block, nested root).
    pub fn subnode_leaf_width(&self) -> usize {
        if self.is_wide() { 24 } else { 12 }
    }

    /// Width of a subnode branch entry (descriptor id, child block).
    pub fn subnode_branch_width(&self) -> usize {
        if self.is_wide() { 16 } else { 8 }
    }

    /// Usable bytes of one row-matrix page before per-page padding.
    pub fn row_page_capacity(&self) -> usize {
        match self {
            FormatVariant::Ansi => 8180,
            FormatVariant::Unicode | FormatVariant::Unicode4k => 8176,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    None,
    Compressible,
}

/// A reference to an index page or block: its directory id plus the file
/// offset it lives at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRef {
    pub block: BlockId,
    pub offset: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct FileHeader {
    pub variant: FormatVariant,
    pub crypt: CryptMethod,
    pub node_root: BlockRef,
    pub block_root: BlockRef,
}

impl FileHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(PstError::InvalidHeader {
                reason: format!("header too short: {} bytes", bytes.len()),
            });
        }
        if &bytes[..4] != PST_MAGIC {
            return Err(PstError::InvalidHeader {
                reason: "bad magic".to_string(),
            });
        }

        let variant = FormatVariant::from_version(u8_at(bytes, VERSION_OFFSET)?)?;

        let crypt_offset = match variant {
            FormatVariant::Ansi => CRYPT_OFFSET_ANSI,
            FormatVariant::Unicode | FormatVariant::Unicode4k => CRYPT_OFFSET_UNICODE,
        };
        let crypt = match u8_at(bytes, crypt_offset)? {
            0 => CryptMethod::None,
            1 => CryptMethod::Compressible,
            method => return Err(PstError::UnsupportedEncryption { method }),
        };

        let (node_root, block_root) = match variant {
            FormatVariant::Ansi => (
                BlockRef {
                    block: u64::from(u32_at(bytes, ROOT_NODE_TREE_ANSI)?),
                    offset: u64::from(u32_at(bytes, ROOT_NODE_TREE_ANSI + 4)?),
                },
                BlockRef {
                    block: u64::from(u32_at(bytes, ROOT_BLOCK_TREE_ANSI)?),
                    offset: u64::from(u32_at(bytes, ROOT_BLOCK_TREE_ANSI + 4)?),
                },
            ),
            FormatVariant::Unicode | FormatVariant::Unicode4k => (
                BlockRef {
                    block: u64_at(bytes, ROOT_NODE_TREE_UNICODE)?,
                    offset: u64_at(bytes, ROOT_NODE_TREE_UNICODE + 8)?,
                },
                BlockRef {
                    block: u64_at(bytes, ROOT_BLOCK_TREE_UNICODE)?,
                    offset: u64_at(bytes, ROOT_BLOCK_TREE_UNICODE + 8)?,
                },
            ),
        };

        Ok(FileHeader {
            variant,
            crypt,
            node_root,
            block_root,
        })
    }
}
