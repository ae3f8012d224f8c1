use blob_vlog::{encode, BlobStore, Config, MockIndex, Sha256Factory};
use std::{io::Write, path::Path, sync::Arc};

/// Config for tests that drive maintenance by hand
#[allow(unused)]
pub fn manual_config() -> Config {
    Config::default().background_maintenance(false)
}

#[allow(unused)]
pub fn open_store(path: &Path, config: Config) -> blob_vlog::Result<(BlobStore, MockIndex)> {
    let index = MockIndex::default();
    let store = BlobStore::open(path, config, Arc::new(index.clone()))?;
    Ok((store, index))
}

/// Writes one raw record into a writer, bypassing the pool
#[allow(unused)]
pub fn write_raw_record<W: Write>(
    writer: &mut W,
    family: &str,
    key: &[u8],
    chunk_number: i32,
    payload: &[u8],
) -> blob_vlog::Result<()> {
    let record = encode(family, key, chunk_number, payload, &Sha256Factory)?;
    writer.write_all(&record.header)?;
    writer.write_all(record.payload)?;
    Ok(())
}
