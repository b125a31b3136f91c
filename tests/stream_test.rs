use std::io::Write;

use flate2::{Compression, write::ZlibEncoder};
use surat::{
    PstError, PstFile,
    storage::stream::NodeStream,
    utils::fixture::{PstFixture, build_fanout_block},
};

fn deflate(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

fn patterned(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| seed.wrapping_add(i as u8)).collect()
}

#[test]
fn test_multi_block_stream_equals_physical_concatenation() {
    let parts = [patterned(300, 1), patterned(200, 7), patterned(450, 13)];
    let mut fixture = PstFixture::new(true);
    fixture.add_data_block(0x10, parts[0].clone());
    fixture.add_data_block(0x12, parts[1].clone());
    fixture.add_data_block(0x14, parts[2].clone());
    let total = parts.iter().map(|p| p.len() as u32).sum();
    fixture.add_structural_block(0x21, build_fanout_block(1, total, &[0x10, 0x12, 0x14]));
    fixture.add_node(0x44, 0x21, 0, 0);

    let mut pst = PstFile::open_bytes(fixture.build()).unwrap();
    let stream = pst.node_stream(0x44).unwrap();

    let mut expected = Vec::new();
    for part in &parts {
        expected.extend_from_slice(part);
    }
    assert_eq!(stream.len(), expected.len() as u64);
    assert_eq!(stream.read_all(), expected);
    assert_eq!(stream.page_count(), 3);
    assert_eq!(stream.page_extent(1), Some((300, 500)));
}

#[test]
fn test_two_level_fanout_resolves_in_order() {
    let parts = [patterned(64, 1), patterned(64, 2), patterned(64, 3), patterned(64, 4)];
    let mut fixture = PstFixture::new(false);
    fixture.add_data_block(0x10, parts[0].clone());
    fixture.add_data_block(0x12, parts[1].clone());
    fixture.add_data_block(0x14, parts[2].clone());
    fixture.add_data_block(0x16, parts[3].clone());
    fixture.add_structural_block(0x21, build_fanout_block(1, 128, &[0x10, 0x12]));
    fixture.add_structural_block(0x23, build_fanout_block(1, 128, &[0x14, 0x16]));
    fixture.add_structural_block(0x25, build_fanout_block(2, 256, &[0x21, 0x23]));
    fixture.add_node(0x44, 0x25, 0, 0);

    let mut pst = PstFile::open_bytes(fixture.build()).unwrap();
    let stream = pst.node_stream(0x44).unwrap();
    let mut expected = Vec::new();
    for part in &parts {
        expected.extend_from_slice(part);
    }
    assert_eq!(stream.read_all(), expected);
}

#[test]
fn test_cipher_applied_to_data_blocks_only() {
    // The fixture stores data blocks ciphered when the image is marked
    // compressible; reading them back must round-trip every byte value.
    let payload: Vec<u8> = (0..=255u8).collect();
    let mut fixture = PstFixture::new(true);
    fixture.add_data_block(0x10, payload.clone());
    fixture.add_node(0x44, 0x10, 0, 0);

    let mut pst = PstFile::open_bytes(fixture.build()).unwrap();
    assert_eq!(pst.node_stream(0x44).unwrap().read_all(), payload);
}

#[test]
fn test_single_zlib_stream_spanning_blocks() {
    let plaintext = patterned(5000, 99);
    let compressed = deflate(&plaintext);
    let (first, second) = compressed.split_at(compressed.len() / 2);
    assert!(!second.starts_with(&[0x78, 0x9C]));

    let mut fixture = PstFixture::new(false);
    fixture.add_data_block(0x10, first.to_vec());
    fixture.add_data_block(0x12, second.to_vec());
    let total = compressed.len() as u32;
    fixture.add_structural_block(0x21, build_fanout_block(1, total, &[0x10, 0x12]));
    fixture.add_node(0x44, 0x21, 0, 0);

    let mut pst = PstFile::open_bytes(fixture.build()).unwrap();
    let stream = pst.node_stream(0x44).unwrap();
    assert_eq!(stream.read_all(), plaintext);
    // One materialized buffer replaces the raw skip-point table.
    assert_eq!(stream.page_count(), 1);
}

#[test]
fn test_independent_zlib_streams_concatenate_in_order() {
    let first_plain = patterned(3000, 5);
    let second_plain = patterned(2000, 11);
    let mut fixture = PstFixture::new(true);
    fixture.add_data_block(0x10, deflate(&first_plain));
    fixture.add_data_block(0x12, deflate(&second_plain));
    fixture.add_structural_block(0x21, build_fanout_block(1, 0, &[0x10, 0x12]));
    fixture.add_node(0x44, 0x21, 0, 0);

    let mut pst = PstFile::open_bytes(fixture.build()).unwrap();
    let stream = pst.node_stream(0x44).unwrap();
    let mut expected = first_plain.clone();
    expected.extend_from_slice(&second_plain);
    assert_eq!(stream.read_all(), expected);
    assert_eq!(stream.page_count(), 2);
    assert_eq!(stream.page_extent(1), Some((3000, 5000)));
}

#[test]
fn test_seek_past_end_is_fatal() {
    let mut stream = NodeStream::from_blocks(vec![b"hello".to_vec()]).unwrap();
    assert!(stream.seek(5).is_ok());
    assert!(matches!(
        stream.seek(6),
        Err(PstError::SeekPastEnd { offset: 6, len: 5 })
    ));
}

#[test]
fn test_reads_never_fill_partially() {
    let mut stream = NodeStream::from_blocks(vec![b"hello".to_vec(), b"world".to_vec()]).unwrap();
    let mut buf = [0u8; 6];
    stream.seek(2).unwrap();
    stream.read(&mut buf).unwrap();
    assert_eq!(&buf, b"llowor");

    let mut over = [0u8; 4];
    stream.seek(8).unwrap();
    assert!(matches!(
        stream.read(&mut over),
        Err(PstError::UnexpectedEof { .. })
    ));
    // The failed read must not move the cursor.
    assert_eq!(stream.position(), 8);
}

#[test]
fn test_scalar_reads_cross_block_boundaries() {
    let stream =
        NodeStream::from_blocks(vec![vec![0x01, 0x02, 0x03], vec![0x04, 0x05, 0x06, 0x07, 0x08]])
            .unwrap();
    assert_eq!(stream.u16_at(2).unwrap(), 0x0403);
    assert_eq!(stream.u32_at(1).unwrap(), 0x05040302);
    assert_eq!(stream.u64_at(0).unwrap(), 0x0807060504030201);
}
