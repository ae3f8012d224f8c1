mod common;

use blob_vlog::{ChunkLocator, Config, ValueLogFile, ValueLogHandle};
use common::{manual_config, open_store};
use std::collections::HashSet;
use test_log::test;

const THREADS: u8 = 8;
const CHUNKS_PER_THREAD: i32 = 50;

#[test]
fn concurrent_writers() -> blob_vlog::Result<()> {
    let folder = tempfile::tempdir()?;
    let (store, _) = open_store(folder.path(), manual_config())?;

    let locators = std::thread::scope(|s| {
        let threads = (0..THREADS)
            .map(|t| {
                let store = &store;
                s.spawn(move || {
                    (1..=CHUNKS_PER_THREAD)
                        .map(|chunk| {
                            let payload = vec![b'a' + t; 1_000 + chunk as usize];
                            store.append_chunk("default", &[t], chunk, &payload)
                        })
                        .collect::<blob_vlog::Result<Vec<ChunkLocator>>>()
                })
            })
            .collect::<Vec<_>>();

        threads
            .into_iter()
            .map(|t| t.join().expect("writer thread panicked"))
            .collect::<blob_vlog::Result<Vec<_>>>()
    })?;

    let locators = locators.into_iter().flatten().collect::<Vec<_>>();
    assert_eq!(locators.len(), THREADS as usize * CHUNKS_PER_THREAD as usize);

    // No two records share bytes
    let ranges = locators
        .iter()
        .map(|l| (l.container_name.clone(), l.start_offset))
        .collect::<HashSet<_>>();
    assert_eq!(ranges.len(), locators.len());

    for locator in &locators {
        let bytes = store.read_chunk_verified(locator)?;
        let t = locator.key[0];
        assert_eq!(bytes.len(), 1_000 + locator.chunk_number as usize);
        assert!(bytes.iter().all(|b| *b == b'a' + t));
    }

    // Every file scans cleanly, record by record
    let mut scanned = 0;
    for name in store.pool().list_files()? {
        let handle = store.pool().get_read_handle(&name)?;
        for entry in handle.file().iter()? {
            let entry = entry?;
            assert!(locators.iter().any(|l| l.points_to(&entry)));
            scanned += 1;
        }
    }
    assert_eq!(scanned, locators.len());

    Ok(())
}

#[test]
fn concurrent_writers_same_handle() -> blob_vlog::Result<()> {
    let folder = tempfile::tempdir()?;
    let handle = ValueLogHandle::wrap(ValueLogFile::create(folder.path(), 1, &Config::default())?);

    std::thread::scope(|s| {
        let threads = (0..THREADS)
            .map(|t| {
                let handle = handle.clone();
                s.spawn(move || -> blob_vlog::Result<()> {
                    for chunk in 1..=CHUNKS_PER_THREAD {
                        let guard = loop {
                            if let Some(guard) = handle.try_acquire_for_writing() {
                                break guard;
                            }
                            std::thread::yield_now();
                        };

                        let payload = vec![b'a' + t; 100 + chunk as usize];
                        guard.append("default", &[t], chunk, &payload)?;
                    }
                    Ok(())
                })
            })
            .collect::<Vec<_>>();

        threads
            .into_iter()
            .map(|t| t.join().expect("writer thread panicked"))
            .collect::<blob_vlog::Result<()>>()
    })?;

    assert!(!handle.is_locked_for_writing());

    let file = handle.file();
    let mut scanner = file.iter()?;
    let entries = scanner
        .by_ref()
        .collect::<blob_vlog::Result<Vec<_>>>()?;

    assert_eq!(0, scanner.skipped_bytes());
    assert_eq!(entries.len(), THREADS as usize * CHUNKS_PER_THREAD as usize);
    assert_eq!(entries.len() as u64, file.record_count());

    // Records are back to back, none overlaps another
    let mut cursor = 0;
    for entry in &entries {
        assert_eq!(entry.start, cursor);
        cursor = entry.end();

        let t = entry.key[0];
        let bytes = file.read_verified(entry.start_of_payload, entry.length, &entry.hash)?;
        assert_eq!(bytes.len(), 100 + entry.chunk_number as usize);
        assert!(bytes.iter().all(|b| *b == b'a' + t));
    }
    assert_eq!(cursor, file.len());

    Ok(())
}
