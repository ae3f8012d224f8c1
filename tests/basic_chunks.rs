mod common;

use blob_vlog::{HashFactory, Sha256Factory};
use common::{manual_config, open_store};
use std::io::Read;
use test_log::test;

#[test]
fn basic_chunks() -> blob_vlog::Result<()> {
    let folder = tempfile::tempdir()?;
    let (store, _) = open_store(folder.path(), manual_config())?;

    let items = ["a", "b", "c", "d", "e"];
    let mut locators = vec![];

    for key in &items {
        let payload = key.repeat(10_000);
        let locator = store.append_chunk("default", key.as_bytes(), 1, payload.as_bytes())?;

        assert_eq!(locator.length, 10_000);
        assert_eq!(locator.hash, Sha256Factory.hash(payload.as_bytes()));
        locators.push(locator);
    }

    for (key, locator) in items.iter().zip(&locators) {
        let mut bytes = vec![];
        store.read_chunk(locator)?.read_to_end(&mut bytes)?;
        assert_eq!(bytes, key.repeat(10_000).as_bytes());

        let verified = store.read_chunk_verified(locator)?;
        assert_eq!(verified, bytes);
        assert_eq!(Sha256Factory.hash(&verified), locator.hash);
    }

    // Single writer at a time, so everything landed in one file
    assert_eq!(1, store.pool().list_files()?.len());

    Ok(())
}

#[test]
fn basic_chunks_empty_payload() -> blob_vlog::Result<()> {
    let folder = tempfile::tempdir()?;
    let (store, _) = open_store(folder.path(), manual_config())?;

    let locator = store.append_chunk("default", b"empty", 1, &[])?;
    assert_eq!(locator.length, 0);
    assert!(store.read_chunk(&locator)?.is_empty());
    assert!(store.read_chunk_verified(&locator)?.is_empty());

    Ok(())
}

#[test]
fn basic_chunks_hash_mismatch() -> blob_vlog::Result<()> {
    let folder = tempfile::tempdir()?;
    let (store, _) = open_store(folder.path(), manual_config())?;

    let mut locator = store.append_chunk("default", b"a", 1, b"hello")?;
    locator.hash = Sha256Factory.hash(b"world");

    assert!(matches!(
        store.read_chunk_verified(&locator),
        Err(blob_vlog::Error::HashMismatch { .. })
    ));

    Ok(())
}
