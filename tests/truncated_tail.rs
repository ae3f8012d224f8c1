mod common;

use common::{manual_config, open_store, write_raw_record};
use test_log::test;

#[test]
fn truncated_tail() -> blob_vlog::Result<()> {
    let folder = tempfile::tempdir()?;

    {
        let mut bytes = vec![];
        write_raw_record(&mut bytes, "default", b"a", 1, b"complete")?;
        write_raw_record(&mut bytes, "default", b"b", 1, b"also complete")?;
        write_raw_record(&mut bytes, "default", b"c", 1, &[7; 1_000])?;

        // Crash in the middle of the last payload
        bytes.truncate(bytes.len() - 500);

        std::fs::write(folder.path().join("vlog_0001.vlog"), bytes)?;
    }

    let (store, _) = open_store(folder.path(), manual_config())?;
    let handle = store.pool().get_read_handle("vlog_0001.vlog")?;

    let mut iter = handle.file().iter()?;

    assert_eq!(&*iter.next().expect("should exist")?.key, b"a");
    assert_eq!(&*iter.next().expect("should exist")?.key, b"b");

    assert!(matches!(
        iter.next(),
        Some(Err(blob_vlog::Error::Truncated { expected: 1_000, .. }))
    ));
    assert!(iter.next().is_none());

    Ok(())
}

#[test]
fn truncated_header() -> blob_vlog::Result<()> {
    let folder = tempfile::tempdir()?;

    {
        let mut bytes = vec![];
        write_raw_record(&mut bytes, "default", b"a", 1, b"complete")?;
        let complete = bytes.len();

        write_raw_record(&mut bytes, "default", b"b", 1, b"lost")?;

        // Header made it to disk up to its end marker, the padding did not
        bytes.truncate(complete + 4 + 1 + 7 + 1 + 1 + 4 + 8 + 32 + 1);

        std::fs::write(folder.path().join("vlog_0001.vlog"), bytes)?;
    }

    let (store, _) = open_store(folder.path(), manual_config())?;
    let handle = store.pool().get_read_handle("vlog_0001.vlog")?;

    let results = handle.file().iter()?.collect::<Vec<_>>();
    assert_eq!(2, results.len());
    assert!(results[0].is_ok());
    assert!(matches!(
        results[1],
        Err(blob_vlog::Error::Truncated { .. })
    ));

    Ok(())
}
