use surat::{
    PstError, PstFile,
    storage::header::{CryptMethod, FileHeader, FormatVariant},
    utils::fixture::sample_file,
};

fn blank_header() -> Vec<u8> {
    let mut bytes = vec![0u8; 1024];
    bytes[..4].copy_from_slice(b"!BDN");
    bytes
}

#[test]
fn test_unicode_header_fields() {
    let image = sample_file(false);
    let header = FileHeader::parse(&image).unwrap();
    assert_eq!(header.variant, FormatVariant::Unicode);
    assert_eq!(header.crypt, CryptMethod::Compressible);
    assert!(header.node_root.offset >= 1024);
    assert!(header.block_root.offset >= 1024);
}

#[test]
fn test_ansi_header_fields() {
    let mut bytes = blank_header();
    bytes[10] = 14;
    bytes[461] = 0;
    bytes[188..192].copy_from_slice(&7u32.to_le_bytes());
    bytes[192..196].copy_from_slice(&2048u32.to_le_bytes());
    bytes[196..200].copy_from_slice(&9u32.to_le_bytes());
    bytes[200..204].copy_from_slice(&4096u32.to_le_bytes());
    let header = FileHeader::parse(&bytes).unwrap();
    assert_eq!(header.variant, FormatVariant::Ansi);
    assert_eq!(header.crypt, CryptMethod::None);
    assert_eq!(header.node_root.block, 7);
    assert_eq!(header.node_root.offset, 2048);
    assert_eq!(header.block_root.block, 9);
    assert_eq!(header.block_root.offset, 4096);
}

#[test]
fn test_large_page_version_selects_unicode4k() {
    let mut bytes = blank_header();
    bytes[10] = 36;
    let header = FileHeader::parse(&bytes).unwrap();
    assert_eq!(header.variant, FormatVariant::Unicode4k);
    assert_eq!(header.variant.page_size(), 4096);
    assert_eq!(header.variant.page_trailer_offset(), 4096 - 24);
}

#[test]
fn test_bad_magic_is_fatal() {
    let mut bytes = blank_header();
    bytes[..4].copy_from_slice(b"NOPE");
    bytes[10] = 23;
    assert!(matches!(
        FileHeader::parse(&bytes),
        Err(PstError::InvalidHeader { .. })
    ));
}

#[test]
fn test_unknown_version_is_fatal() {
    let mut bytes = blank_header();
    bytes[10] = 99;
    assert!(matches!(
        FileHeader::parse(&bytes),
        Err(PstError::UnsupportedVersion { version: 99 })
    ));
}

#[test]
fn test_strong_encryption_is_fatal() {
    let mut bytes = blank_header();
    bytes[10] = 23;
    bytes[513] = 2;
    assert!(matches!(
        FileHeader::parse(&bytes),
        Err(PstError::UnsupportedEncryption { method: 2 })
    ));
}

#[test]
fn test_open_rejects_truncated_input() {
    assert!(matches!(
        PstFile::open_bytes(vec![0u8; 64]),
        Err(PstError::InvalidHeader { .. })
    ));
}
