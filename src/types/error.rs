use thiserror::Error;

use crate::types::{BlockId, NodeId};

#[derive(Error, Debug)]
pub enum PstError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("Unsupported file version: {version}")]
    UnsupportedVersion { version: u8 },

    #[error("Unsupported encryption method: {method}")]
    UnsupportedEncryption { method: u8 },

    #[error("Corrupted index page: {reason}")]
    CorruptedPage { reason: String },

    #[error("Corrupted block {block}: {reason}")]
    CorruptedBlock { block: BlockId, reason: String },

    #[error("Block {block} not present in the block directory")]
    MissingBlock { block: BlockId },

    #[error("Node {node} not present in the node directory")]
    MissingNode { node: NodeId },

    #[error("Signature mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    SignatureMismatch { expected: u8, actual: u8 },

    #[error("Heap reference 0x{hid:08X} out of range: {reason}")]
    InvalidHeapRef { hid: u32, reason: String },

    #[error("Seek to {offset} past logical end {len}")]
    SeekPastEnd { offset: u64, len: u64 },

    #[error("Read of {requested} bytes at {offset} cannot be filled (stream length {len})")]
    UnexpectedEof {
        offset: u64,
        requested: usize,
        len: u64,
    },

    #[error("Truncated structure: need {needed} bytes at offset {offset}, have {have}")]
    Truncated {
        offset: usize,
        needed: usize,
        have: usize,
    },

    #[error("Table decode error: {reason}")]
    TableDecode { reason: String },

    #[error("Decompression error: {details}")]
    Decompression { details: String },

    #[error("Compressed RTF length mismatch: expected {expected} bytes, produced {actual}")]
    RtfLengthMismatch { expected: usize, actual: usize },

    #[error("Compressed RTF stream is malformed: {reason}")]
    RtfMalformed { reason: String },
}

pub type Result<T> = std::result::Result<T, PstError>;
