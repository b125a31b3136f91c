use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use surat::{
    PstFile,
    types::{NID_MESSAGE_STORE, NID_ROOT_FOLDER, TAG_DISPLAY_NAME},
    utils::fixture::{PstFixture, build_fanout_block, sample_file},
};

const STREAM_BLOCKS: usize = 24;
const BLOCK_SIZE: usize = 4096;

fn multi_block_image() -> Vec<u8> {
    let mut fixture = PstFixture::new(true);
    let mut children = Vec::new();
    for i in 0..STREAM_BLOCKS {
        let block = 0x100 + i as u64 * 2;
        fixture.add_data_block(block, vec![i as u8; BLOCK_SIZE]);
        children.push(block);
    }
    fixture.add_structural_block(
        0x401,
        build_fanout_block(1, (STREAM_BLOCKS * BLOCK_SIZE) as u32, &children),
    );
    fixture.add_node(0x44, 0x401, 0, 0);
    fixture.build()
}

fn benchmark_open(c: &mut Criterion) {
    let image = sample_file(false);
    c.bench_function("open_bytes", |b| {
        b.iter(|| {
            let pst = PstFile::open_bytes(black_box(image.clone())).unwrap();
            black_box(pst.header().variant)
        });
    });
}

fn benchmark_property_read(c: &mut Criterion) {
    let image = sample_file(false);
    c.bench_function("store_display_name", |b| {
        let mut pst = PstFile::open_bytes(image.clone()).unwrap();
        b.iter(|| {
            let props = pst.properties(NID_MESSAGE_STORE).unwrap();
            black_box(props.get_string(TAG_DISPLAY_NAME, ""))
        });
    });
}

fn benchmark_hierarchy_rows(c: &mut Criterion) {
    let image = sample_file(false);
    c.bench_function("folder_hierarchy", |b| {
        let mut pst = PstFile::open_bytes(image.clone()).unwrap();
        b.iter(|| black_box(pst.folder_hierarchy(NID_ROOT_FOLDER).unwrap().len()));
    });
}

fn benchmark_stream_scan(c: &mut Criterion) {
    let image = multi_block_image();
    let mut group = c.benchmark_group("stream_scan");
    group.throughput(Throughput::Bytes((STREAM_BLOCKS * BLOCK_SIZE) as u64));
    group.bench_function("assemble_and_read", |b| {
        let mut pst = PstFile::open_bytes(image.clone()).unwrap();
        b.iter(|| {
            let stream = pst.node_stream(0x44).unwrap();
            black_box(stream.read_all().len())
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    benchmark_open,
    benchmark_property_read,
    benchmark_hierarchy_rows,
    benchmark_stream_scan
);
criterion_main!(benches);
