use surat::{
    NameKey, PropertyValue, PstFile, TableKind,
    storage::header::{CryptMethod, FormatVariant},
    types::{NID_MESSAGE_STORE, NID_ROOT_FOLDER, TAG_DISPLAY_NAME},
    utils::fixture::{
        FIXTURE_MESSAGES, FIXTURE_SUBFOLDERS, FixtureColumn, PcVal, PstFixture, build_pc_block,
        build_subnode_block, build_tc_block, sample_file, write_temp_image,
    },
};

fn open_sample(corrupt_contents: bool) -> PstFile {
    let _ = env_logger::builder().is_test(true).try_init();
    PstFile::open_bytes(sample_file(corrupt_contents)).unwrap()
}

#[test]
fn test_sample_reports_variant_and_encryption() {
    let pst = open_sample(false);
    assert_eq!(pst.header().variant, FormatVariant::Unicode);
    assert_eq!(pst.header().crypt, CryptMethod::Compressible);
}

#[test]
fn test_message_store_display_name() {
    let mut pst = open_sample(false);
    let store = pst.properties(NID_MESSAGE_STORE).unwrap();
    assert_eq!(
        store.get_string(TAG_DISPLAY_NAME, ""),
        "Personal folders"
    );
}

#[test]
fn test_root_folder_lists_subfolders_in_disk_order() {
    let mut pst = open_sample(false);
    let rows = pst.folder_hierarchy(NID_ROOT_FOLDER).unwrap();
    assert_eq!(rows.len(), 3);
    for (row, (node, name)) in rows.iter().zip(FIXTURE_SUBFOLDERS) {
        assert_eq!(row.row_id, node);
        assert_eq!(
            row.values.get(&TAG_DISPLAY_NAME),
            Some(&PropertyValue::String(name.to_string()))
        );
    }
}

#[test]
fn test_contents_table_yields_messages() {
    let mut pst = open_sample(false);
    let messages = pst.folder_message_children(NID_ROOT_FOLDER).unwrap();
    assert_eq!(messages, FIXTURE_MESSAGES);
}

#[test]
fn test_corrupt_contents_table_falls_back_to_directory_walk() {
    let mut pst = open_sample(true);
    // The table itself is unreadable...
    assert!(pst.folder_contents(NID_ROOT_FOLDER).is_err());
    // ...but the recovery path still yields the messages, in node-id
    // order, without the subfolders and companion tables.
    let messages = pst.folder_message_children(NID_ROOT_FOLDER).unwrap();
    assert_eq!(messages, FIXTURE_MESSAGES);
}

#[test]
fn test_name_to_id_round_trips_both_key_kinds() {
    let pst = open_sample(false);
    assert_eq!(pst.name_to_id(&NameKey::Id(0x8233), 3), Some(0x8000));
    assert_eq!(
        pst.name_to_id(&NameKey::Name("Keywords".to_string()), 5),
        Some(0x8001)
    );
    assert_eq!(pst.name_to_id(&NameKey::Id(0x8233), 4), None);
    assert_eq!(pst.name_to_id(&NameKey::Id(0x9999), 3), None);
}

#[test]
fn test_open_from_path() {
    let file = write_temp_image(&sample_file(false)).unwrap();
    let mut pst = PstFile::open(file.path()).unwrap();
    let store = pst.properties(NID_MESSAGE_STORE).unwrap();
    assert_eq!(store.get_string(TAG_DISPLAY_NAME, ""), "Personal folders");
}

/// A message whose 0x3701 attachment blob lives in its subnode tree.
fn subnode_fixture() -> PstFixture {
    let mut fixture = PstFixture::new(true);
    fixture.add_data_block(
        0x100,
        build_pc_block(&[(0x3701, 0x0102, PcVal::Subnode(0x21))]),
    );
    fixture.add_data_block(0x102, b"attachment payload".to_vec());
    fixture.add_structural_block(0x201, build_subnode_block(&[(0x21, 0x102, 0)]));
    fixture.add_node(292, 0x100, 0x201, 0);
    fixture
}

#[test]
fn test_external_property_resolved_through_subnode_tree() {
    let mut pst = PstFile::open_bytes(subnode_fixture().build()).unwrap();
    let props = pst.properties(292).unwrap();
    assert_eq!(
        props.get_binary(0x3701, &[]),
        b"attachment payload".to_vec()
    );

    let raw = pst.resolve_external(292, 0x3701).unwrap();
    assert_eq!(raw, Some(b"attachment payload".to_vec()));
    assert_eq!(pst.resolve_external(292, 0x0E07).unwrap(), None);
}

#[test]
fn test_absent_subnode_leaves_value_flagged_external() {
    let mut fixture = PstFixture::new(false);
    fixture.add_data_block(
        0x100,
        build_pc_block(&[(0x3701, 0x0102, PcVal::Subnode(0x41))]),
    );
    fixture.add_structural_block(0x201, build_subnode_block(&[]));
    fixture.add_node(292, 0x100, 0x201, 0);

    let mut pst = PstFile::open_bytes(fixture.build()).unwrap();
    let props = pst.properties(292).unwrap();
    assert!(matches!(
        props.get(0x3701),
        Some(PropertyValue::External { node: 0x41, .. })
    ));
}

#[test]
fn test_row_matrix_in_a_subnode_stream() {
    let columns = [FixtureColumn {
        id: 0x0001,
        ptype: 0x0003,
        offset: 4,
        width: 4,
        bit: 0,
    }];
    let mut matrix = Vec::new();
    for i in 0..4u32 {
        matrix.extend_from_slice(&(640 + i * 32).to_le_bytes());
        matrix.extend_from_slice(&(i * 100).to_le_bytes());
        matrix.push(0x80);
    }

    let mut fixture = PstFixture::new(true);
    // The table header references subnode 0x21 instead of a heap slot.
    fixture.add_data_block(
        0x100,
        build_tc_block(0x7C, &columns, [8, 8, 8, 9], 0x21, None, &[]),
    );
    fixture.add_data_block(0x102, matrix);
    fixture.add_structural_block(0x201, build_subnode_block(&[(0x21, 0x102, 0)]));
    fixture.add_node(302, 0x100, 0x201, 0);

    let mut pst = PstFile::open_bytes(fixture.build()).unwrap();
    let rows = pst.enumerate_rows(302, TableKind::Raw).unwrap();
    assert_eq!(rows.len(), 4);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row.row_id, 640 + i as u32 * 32);
        assert_eq!(
            row.values.get(&0x0001),
            Some(&PropertyValue::Int32(i as i32 * 100))
        );
    }
}
