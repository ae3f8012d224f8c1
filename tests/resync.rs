mod common;

use common::{manual_config, open_store, write_raw_record};
use std::io::Write;
use test_log::test;

#[test]
fn resync_after_garbage() -> blob_vlog::Result<()> {
    let folder = tempfile::tempdir()?;

    {
        let mut file = std::fs::File::create(folder.path().join("vlog_0001.vlog"))?;
        write_raw_record(&mut file, "default", b"a", 1, b"first")?;
        file.write_all(&[0xAB; 37])?;
        write_raw_record(&mut file, "default", b"b", 1, b"second")?;
        file.sync_all()?;
    }

    let (store, _) = open_store(folder.path(), manual_config())?;
    let handle = store.pool().get_read_handle("vlog_0001.vlog")?;

    let mut scanner = handle.file().iter()?;
    let entries = scanner
        .by_ref()
        .collect::<blob_vlog::Result<Vec<_>>>()?;
    assert_eq!(2, entries.len());
    assert_eq!(37, scanner.skipped_bytes());

    assert_eq!(&*entries[0].key, b"a");
    assert_eq!(&*entries[1].key, b"b");
    assert_eq!(entries[1].start, entries[0].end() + 37);

    for entry in &entries {
        let payload = store.read_chunk_verified(&entry.locator())?;
        assert_eq!(payload.len() as u64, entry.length);
    }

    Ok(())
}

#[test]
fn resync_after_broken_header() -> blob_vlog::Result<()> {
    let folder = tempfile::tempdir()?;

    {
        let mut broken = vec![];
        write_raw_record(&mut broken, "default", b"broken", 1, b"lost")?;

        // Wipe the end marker, so the header no longer decodes
        let marker_pos = 4 + 1 + 7 + 1 + 6 + 4 + 8 + 32;
        broken[marker_pos] = 0;

        let mut file = std::fs::File::create(folder.path().join("vlog_0001.vlog"))?;
        write_raw_record(&mut file, "default", b"a", 1, b"first")?;
        file.write_all(&broken)?;
        write_raw_record(&mut file, "default", b"b", 1, b"second")?;
        file.sync_all()?;
    }

    let (store, _) = open_store(folder.path(), manual_config())?;
    let handle = store.pool().get_read_handle("vlog_0001.vlog")?;

    let keys = handle
        .file()
        .iter()?
        .map(|entry| entry.map(|entry| entry.key))
        .collect::<blob_vlog::Result<Vec<_>>>()?;

    assert_eq!(keys, vec![b"a".to_vec().into(), b"b".to_vec().into()]);

    Ok(())
}

#[test]
fn resync_only_garbage() -> blob_vlog::Result<()> {
    let folder = tempfile::tempdir()?;
    std::fs::write(folder.path().join("vlog_0001.vlog"), vec![b'@'; 2_000])?;

    let (store, _) = open_store(folder.path(), manual_config())?;
    let handle = store.pool().get_read_handle("vlog_0001.vlog")?;

    assert_eq!(0, handle.file().iter()?.count());

    Ok(())
}
