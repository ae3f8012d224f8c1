// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    compaction::{report::CompactionReport, Compactor},
    log_file::reader::ChunkReader,
    maintenance::Maintenance,
    record,
    value::ChunkNumber,
    ChunkLocator, ChunkedReader, Config, ExternalIndex, ValueLogHandle, ValueLogPool,
};
use std::{
    io::Read,
    path::Path,
    sync::{Arc, Mutex},
};

/// Fills `buf` as far as the reader allows, returning the amount of bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;

    while let Some(free) = buf.get_mut(filled..) {
        if free.is_empty() {
            break;
        }

        match reader.read(free) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    Ok(filled)
}

/// A blob store backed by value log files
///
/// Payloads are appended to value log files, their locators are kept by an
/// [`ExternalIndex`]. Sealed files are compacted to give back the space of
/// blobs that were deleted or overwritten.
pub struct BlobStore {
    pool: ValueLogPool,
    compactor: Compactor,
    index: Arc<dyn ExternalIndex + Send + Sync>,
    maintenance: Mutex<Option<Maintenance>>,
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore")
            .field("pool", &self.pool)
            .field("compactor", &self.compactor)
            .finish_non_exhaustive()
    }
}

impl BlobStore {
    /// Creates or reopens a blob store in a folder.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the folder holds an unknown format version,
    /// or an IO error occurs.
    pub fn open<P: AsRef<Path>>(
        path: P,
        config: Config,
        index: Arc<dyn ExternalIndex + Send + Sync>,
    ) -> crate::Result<Self> {
        let background_maintenance = config.background_maintenance;

        let pool = ValueLogPool::open(path, config)?;
        let compactor = Compactor::new(&pool);

        let maintenance = if background_maintenance {
            Some(Maintenance::start(&pool)?)
        } else {
            None
        };

        Ok(Self {
            pool,
            compactor,
            index,
            maintenance: Mutex::new(maintenance),
        })
    }

    /// Returns the value log pool.
    #[must_use]
    pub fn pool(&self) -> &ValueLogPool {
        &self.pool
    }

    /// Returns the compactor.
    #[must_use]
    pub fn compactor(&self) -> &Compactor {
        &self.compactor
    }

    /// Appends one chunk and returns its locator.
    ///
    /// The index is not touched, storing the locator is up to the caller.
    ///
    /// # Errors
    ///
    /// Will return `Err` if family, key or chunk number are invalid,
    /// or an IO error occurs.
    pub fn append_chunk(
        &self,
        family: &str,
        key: &[u8],
        chunk_number: ChunkNumber,
        payload: &[u8],
    ) -> crate::Result<ChunkLocator> {
        self.pool.append_chunk(family, key, chunk_number, payload)
    }

    /// Opens a stream over one chunk.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the container does not exist, or an IO error occurs.
    pub fn read_chunk(&self, locator: &ChunkLocator) -> crate::Result<ChunkReader> {
        self.pool.read_chunk(locator)
    }

    /// Reads one chunk into memory, checking its hash.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the hash does not match, the container does not
    /// exist, or an IO error occurs.
    pub fn read_chunk_verified(&self, locator: &ChunkLocator) -> crate::Result<Vec<u8>> {
        self.pool.read_chunk_verified(locator)
    }

    /// Opens a stream over all given chunks, in chunk order.
    ///
    /// A description chunk (chunk 0) is included and comes first.
    #[must_use]
    pub fn read_blob(&self, locators: Vec<ChunkLocator>) -> ChunkedReader {
        ChunkedReader::new(&self.pool, locators)
    }

    /// Opens a stream over the payload chunks of a blob, in chunk order.
    ///
    /// The description chunk is skipped.
    #[must_use]
    pub fn read_blob_payload(&self, locators: Vec<ChunkLocator>) -> ChunkedReader {
        ChunkedReader::payload_only(&self.pool, locators)
    }

    /// Seals full or aged value log files and closes idle read handles.
    ///
    /// Sealed files are queued for compaction and returned.
    pub fn run_maintenance_sweep(&self) -> Vec<Arc<ValueLogHandle>> {
        self.pool.run_maintenance_sweep()
    }

    /// Compacts every queued file.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the index fails, a record does not match its hash,
    /// or an IO error occurs.
    pub fn run_compaction_pass(&self) -> crate::Result<CompactionReport> {
        self.compactor.run_compaction_pass(&*self.index)
    }

    /// Stops background maintenance and closes all files.
    ///
    /// Chunks stay readable, but nothing can be appended anymore.
    ///
    /// # Errors
    ///
    /// Will return `Err` if flushing a file fails.
    pub fn shutdown(&self) -> crate::Result<()> {
        if let Some(mut maintenance) = self.maintenance.lock().expect("lock is poisoned").take() {
            maintenance.stop();
        }

        self.pool.close()?;

        log::info!("Blob store at {} shut down", self.pool.path().display());

        Ok(())
    }

    /// Stores a blob, splitting it into chunks of the configured chunk size.
    ///
    /// Payload chunks are numbered from 1, an optional description is stored
    /// as chunk 0. The locators are written to the index once, after every
    /// chunk was appended, so a failed write never leaves a partial blob
    /// visible.
    ///
    /// # Errors
    ///
    /// Will return `Err` if family or key are invalid, the reader fails,
    /// the index fails, or an IO error occurs.
    pub fn put_blob<R: Read>(
        &self,
        family: &str,
        key: &[u8],
        description: Option<&[u8]>,
        mut reader: R,
    ) -> crate::Result<Vec<ChunkLocator>> {
        record::validate(family, key, 0)?;

        let mut locators = vec![];

        if let Some(description) = description {
            locators.push(self.append_chunk(family, key, 0, description)?);
        }

        let chunk_size = self.pool.config().chunk_size;
        let mut buf = vec![0; chunk_size];
        let mut chunk_number: ChunkNumber = 1;

        loop {
            let n = read_full(&mut reader, &mut buf)?;
            if n == 0 {
                break;
            }

            let chunk = buf.get(..n).unwrap_or_default();
            locators.push(self.append_chunk(family, key, chunk_number, chunk)?);

            if n < chunk_size {
                break;
            }

            chunk_number = chunk_number
                .checked_add(1)
                .ok_or(crate::Error::Validation("blob has too many chunks"))?;
        }

        self.index
            .put(family, key, locators.clone())
            .map_err(crate::Error::Index)?;

        log::trace!(
            "Stored blob {family}:{:?} in {} chunks",
            String::from_utf8_lossy(key),
            locators.len()
        );

        Ok(locators)
    }

    /// Opens a stream over a blob's payload, if the index knows it.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the index fails.
    pub fn get_blob(&self, family: &str, key: &[u8]) -> crate::Result<Option<ChunkedReader>> {
        let locators = self.index.get(family, key).map_err(crate::Error::Index)?;
        Ok(locators.map(|locators| self.read_blob_payload(locators)))
    }

    /// Returns a blob's description chunk, if it has one.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the index fails, the hash does not match,
    /// or an IO error occurs.
    pub fn get_description(&self, family: &str, key: &[u8]) -> crate::Result<Option<Vec<u8>>> {
        let Some(locators) = self.index.get(family, key).map_err(crate::Error::Index)? else {
            return Ok(None);
        };

        locators
            .iter()
            .find(|locator| locator.chunk_number == 0)
            .map(|locator| self.read_chunk_verified(locator))
            .transpose()
    }

    /// Returns `true` if the index knows the blob.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the index fails.
    pub fn has_blob(&self, family: &str, key: &[u8]) -> crate::Result<bool> {
        Ok(self
            .index
            .get(family, key)
            .map_err(crate::Error::Index)?
            .is_some())
    }

    /// Removes a blob from the index.
    ///
    /// Its chunks stay on disk until their file is compacted.
    /// Returns `false` if the blob did not exist.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the index fails.
    pub fn delete_blob(&self, family: &str, key: &[u8]) -> crate::Result<bool> {
        if !self.has_blob(family, key)? {
            return Ok(false);
        }

        self.index
            .mark_deleted(family, key)
            .map_err(crate::Error::Index)?;

        Ok(true)
    }
}
