use surat::{
    PstError,
    storage::stream::NodeStream,
    table::heap::{Heap, Hnid, classify},
    utils::fixture::{build_heap_block, build_heap_follow_block, hid},
};

fn hid_on(page: u32, slot: u32) -> u32 {
    (page << 16) | (slot << 5)
}

fn two_page_heap() -> Heap {
    let first = build_heap_block(
        0xBC,
        hid(1),
        &[b"alpha".to_vec(), b"beta".to_vec()],
    );
    let second = build_heap_follow_block(&[b"gamma".to_vec()]);
    Heap::parse(NodeStream::from_blocks(vec![first, second]).unwrap()).unwrap()
}

#[test]
fn test_resolve_across_pages() {
    let heap = two_page_heap();
    assert_eq!(heap.resolve(hid(1)).unwrap(), b"alpha");
    assert_eq!(heap.resolve(hid(2)).unwrap(), b"beta");
    assert_eq!(heap.resolve(hid_on(1, 1)).unwrap(), b"gamma");
}

#[test]
fn test_zero_hid_is_the_empty_range() {
    let heap = two_page_heap();
    assert_eq!(heap.resolve(0).unwrap(), Vec::<u8>::new());
}

#[test]
fn test_out_of_range_slot_is_fatal() {
    let heap = two_page_heap();
    assert!(matches!(
        heap.resolve(hid(3)),
        Err(PstError::InvalidHeapRef { .. })
    ));
    assert!(matches!(
        heap.resolve(hid_on(1, 2)),
        Err(PstError::InvalidHeapRef { .. })
    ));
}

#[test]
fn test_out_of_range_page_is_fatal() {
    let heap = two_page_heap();
    assert!(matches!(
        heap.resolve(hid_on(2, 1)),
        Err(PstError::InvalidHeapRef { .. })
    ));
}

#[test]
fn test_bad_heap_signature_is_fatal() {
    let mut block = build_heap_block(0xBC, hid(1), &[b"x".to_vec()]);
    block[2] = 0x00;
    assert!(matches!(
        Heap::parse(NodeStream::from_blocks(vec![block]).unwrap()),
        Err(PstError::SignatureMismatch { .. })
    ));
}

#[test]
fn test_hnid_classification() {
    assert_eq!(classify(0), Hnid::Empty);
    assert_eq!(classify(0x40), Hnid::Heap(0x40));
    assert_eq!(classify(0x21), Hnid::Node(0x21));
}
