use surat::{
    PstFile,
    utils::fixture::{PstFixture, build_pc_block},
};

/// Enough nodes to spill the directory across several leaf pages and force
/// a branch level above them (15 node entries fit one 512-byte page).
fn wide_directory() -> (PstFixture, Vec<u32>) {
    let mut fixture = PstFixture::new(false);
    fixture.add_data_block(0x10, build_pc_block(&[]));
    let mut nodes = Vec::new();
    for i in 0..40u32 {
        let node = (i + 9) * 32 + 4;
        fixture.add_node(node, 0x10, 0, 0);
        nodes.push(node);
    }
    (fixture, nodes)
}

#[test]
fn test_every_inserted_key_is_found() {
    let (fixture, nodes) = wide_directory();
    let mut pst = PstFile::open_bytes(fixture.build()).unwrap();
    for node in nodes {
        let entry = pst.node_entry(node).unwrap().expect("inserted node");
        assert_eq!(entry.node, node);
        assert_eq!(entry.data_block, 0x10);
    }
}

#[test]
fn test_absent_keys_return_none_not_error() {
    let (fixture, nodes) = wide_directory();
    let mut pst = PstFile::open_bytes(fixture.build()).unwrap();
    // Between, below and above every inserted key.
    assert!(pst.node_entry(1).unwrap().is_none());
    assert!(pst.node_entry(nodes[0] + 1).unwrap().is_none());
    assert!(pst.node_entry(nodes[nodes.len() - 1] + 32).unwrap().is_none());
}

#[test]
fn test_block_directory_lookup() {
    let mut fixture = PstFixture::new(false);
    fixture.add_data_block(0x10, vec![1, 2, 3]);
    fixture.add_data_block(0x42, vec![4; 100]);
    let mut pst = PstFile::open_bytes(fixture.build()).unwrap();

    let entry = pst.block_entry(0x42).unwrap().expect("inserted block");
    assert_eq!(entry.block, 0x42);
    assert_eq!(entry.size, 100);
    assert!(pst.block_entry(0x44).unwrap().is_none());
}

#[test]
fn test_malformed_page_is_fatal() {
    let (fixture, _) = wide_directory();
    let mut image = fixture.build();
    // Clobber the root node page's metadata quad: an entry width of zero
    // can never describe a valid page.
    let root_offset = u64::from_le_bytes(image[232..240].try_into().unwrap()) as usize;
    image[root_offset + 488 + 2] = 0;
    let mut pst = PstFile::open_bytes(image).unwrap();
    assert!(pst.node_entry(292).is_err());
}
