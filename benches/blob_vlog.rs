use blob_vlog::{BlobStore, Config, ExternalIndex, MockIndex};
use criterion::{criterion_group, criterion_main, Criterion};
use rand::{Rng, RngCore};
use std::{io::Read, sync::Arc};

fn open_store(path: &std::path::Path) -> (BlobStore, MockIndex) {
    let index = MockIndex::default();
    let store = BlobStore::open(
        path,
        Config::default().background_maintenance(false),
        Arc::new(index.clone()),
    )
    .unwrap();
    (store, index)
}

fn append_chunk(c: &mut Criterion) {
    let mut group = c.benchmark_group("append chunk");
    group.sample_size(20);

    let folder = tempfile::tempdir().unwrap();
    let (store, _) = open_store(folder.path());

    let mut rng = rand::thread_rng();

    for size in [1_024, 64_000, 1_024 * 1_024] {
        let mut data = vec![0u8; size];
        rng.fill_bytes(&mut data);

        let mut chunk_number = 0;

        group.bench_function(format!("{size} bytes"), |b| {
            b.iter(|| {
                chunk_number += 1;
                store
                    .append_chunk("bench", b"key", chunk_number, &data)
                    .unwrap();
            })
        });
    }
}

fn load_chunk(c: &mut Criterion) {
    let mut group = c.benchmark_group("load chunk");

    let sizes = [
        128,               // 128 B
        512,               // 512 B
        1_024,             // 1 KiB
        4_096,             // 4 KiB
        16_000,            // 16 KiB
        64_000,            // 64 KiB
        128_000,           // 128 KiB
        256_000,           // 256 KiB
        512_000,           // 512 KiB
        1_024 * 1_024,     // 1 MiB
        4 * 1_024 * 1_024, // 4 MiB
    ];

    let folder = tempfile::tempdir().unwrap();
    let (store, _) = open_store(folder.path());

    let mut rng = rand::thread_rng();

    for size in sizes {
        let mut data = vec![0u8; size];
        rng.fill_bytes(&mut data);

        let locator = store
            .append_chunk("bench", size.to_string().as_bytes(), 1, &data)
            .unwrap();

        group.bench_function(format!("{size} bytes"), |b| {
            b.iter(|| {
                let mut buf = Vec::with_capacity(size);
                store.read_chunk(&locator).unwrap().read_to_end(&mut buf).unwrap();
                assert_eq!(size, buf.len());
            })
        });

        group.bench_function(format!("{size} bytes - verified"), |b| {
            b.iter(|| {
                let buf = store.read_chunk_verified(&locator).unwrap();
                assert_eq!(size, buf.len());
            })
        });
    }
}

fn load_blob(c: &mut Criterion) {
    let mut group = c.benchmark_group("load blob");
    group.sample_size(20);

    let blob_count = 1_000u64;
    let blob_size = 256_000;

    let folder = tempfile::tempdir().unwrap();
    let index = MockIndex::default();
    let store = BlobStore::open(
        folder.path(),
        Config::default()
            .background_maintenance(false)
            .chunk_size(64_000),
        Arc::new(index.clone()),
    )
    .unwrap();

    let mut rng = rand::thread_rng();

    for key in (0..blob_count).map(u64::to_be_bytes) {
        let mut data = vec![0u8; blob_size];
        rng.fill_bytes(&mut data);
        store.put_blob("bench", &key, None, data.as_slice()).unwrap();
    }

    group.bench_function(format!("{blob_size}B in 64K chunks"), |b| {
        b.iter(|| {
            let key = rng.gen_range(0..blob_count).to_be_bytes();
            let locators = index.get("bench", &key).unwrap().unwrap();

            let mut buf = Vec::with_capacity(blob_size);
            store.read_blob(locators).read_to_end(&mut buf).unwrap();
            assert_eq!(blob_size, buf.len());
        })
    });
}

criterion_group!(benches, append_chunk, load_chunk, load_blob);
criterion_main!(benches);
