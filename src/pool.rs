// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    compaction::CandidateQueue,
    handle::{ValueLogHandle, WriteGuard},
    id::{FileNumber, IdGenerator},
    log_file::{parse_file_name, reader::ChunkReader, ValueLogFile},
    marker,
    path::{absolute_path, fsync_directory},
    read_cache::ReadCache,
    record,
    value::ChunkNumber,
    ChunkLocator, Config,
};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, RwLock,
    },
};

/// Allocates, tracks and retires the value log files of one store folder.
#[derive(Clone)]
#[allow(clippy::module_name_repetitions)]
pub struct ValueLogPool(Arc<PoolInner>);

impl std::ops::Deref for ValueLogPool {
    type Target = PoolInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[allow(clippy::module_name_repetitions)]
pub struct PoolInner {
    /// Store folder
    path: PathBuf,

    config: Config,

    /// Held while picking or creating a writable file, and while sweeping
    allocation: Mutex<()>,

    /// Files that may still accept appends
    writable: RwLock<BTreeMap<Arc<str>, Arc<ValueLogHandle>>>,

    /// Open handles of sealed files
    read_cache: ReadCache,

    id_generator: IdGenerator,

    /// Sealed files waiting to be compacted
    candidates: CandidateQueue,

    is_closed: AtomicBool,
}

impl std::fmt::Debug for ValueLogPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ValueLogPool<{}, {} writable, {:?}>",
            self.path.display(),
            self.writable_count(),
            self.read_cache,
        )
    }
}

impl ValueLogPool {
    pub(crate) fn weak(&self) -> std::sync::Weak<PoolInner> {
        Arc::downgrade(&self.0)
    }

    pub(crate) fn from_inner(inner: Arc<PoolInner>) -> Self {
        Self(inner)
    }

    /// Opens the pool of a store folder, creating the folder if needed.
    ///
    /// Value log files already in the folder are loaded lazily, read-only.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the folder holds an unknown format version,
    /// or an IO error occurs.
    pub fn open<P: AsRef<Path>>(path: P, config: Config) -> crate::Result<Self> {
        let path = absolute_path(path)?;
        log::info!("Opening value log pool at {}", path.display());

        std::fs::create_dir_all(&path)?;

        if marker::write_or_check(&path)? {
            fsync_directory(&path)?;
        }

        let mut max_number: FileNumber = 0;
        let mut recovered = 0;

        for dirent in std::fs::read_dir(&path)? {
            let dirent = dirent?;
            let file_name = dirent.file_name();

            let Some(number) = file_name.to_str().and_then(parse_file_name) else {
                if file_name != marker::MARKER_FILE {
                    log::debug!("Ignoring unknown file {file_name:?} in value log folder");
                }
                continue;
            };

            if !dirent.file_type()?.is_file() {
                log::debug!("Ignoring non-file entry {file_name:?} in value log folder");
                continue;
            }

            max_number = max_number.max(number);
            recovered += 1;
        }

        if recovered > 0 {
            log::info!("Recovered {recovered} value log files, last is #{max_number}");
        }

        let read_cache = ReadCache::with_capacity(config.read_cache_capacity);

        Ok(Self(Arc::new(PoolInner {
            path,
            config,
            allocation: Mutex::new(()),
            writable: RwLock::new(BTreeMap::new()),
            read_cache,
            id_generator: IdGenerator::new(max_number + 1),
            candidates: CandidateQueue::default(),
            is_closed: AtomicBool::new(false),
        })))
    }

    /// Returns the store folder.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn candidates(&self) -> &CandidateQueue {
        &self.candidates
    }

    /// Returns `true` once [`ValueLogPool::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.is_closed.load(Ordering::Acquire)
    }

    /// Returns a locked, writable value log file.
    ///
    /// Picks an existing file that still has room and is not locked by
    /// another writer, or creates the next one.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the pool is closed, or an IO error occurs.
    pub fn get_writable_handle(&self) -> crate::Result<WriteGuard> {
        let _lock = self.allocation.lock().expect("lock is poisoned");

        // NOTE: Checked under the lock, so `close` never misses a new file
        if self.is_closed() {
            return Err(crate::Error::Io(std::io::Error::other(
                "value log pool is closed",
            )));
        }

        for handle in self.writable.read().expect("lock is poisoned").values() {
            if !handle.file().is_available_for_writing() {
                continue;
            }

            if let Some(guard) = handle.try_acquire_for_writing() {
                // NOTE: Could have filled up before we got the lock
                if handle.file().is_available_for_writing() {
                    log::trace!("Reusing writable value log {}", handle.name());
                    return Ok(guard);
                }
            }
        }

        loop {
            let number = self.id_generator.next();

            match ValueLogFile::create(&self.path, number, &self.config) {
                Ok(file) => {
                    let (handle, guard) = ValueLogHandle::wrap_acquired(file);

                    self.writable
                        .write()
                        .expect("lock is poisoned")
                        .insert(handle.name().clone(), handle);

                    return Ok(guard);
                }
                Err(crate::Error::Io(e)) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    log::warn!("Value log #{number} already exists, trying next number");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Returns a handle for reading the named value log file.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the file does not exist, or an IO error occurs.
    pub fn get_read_handle(&self, container_name: &str) -> crate::Result<Arc<ValueLogHandle>> {
        if let Some(handle) = self
            .writable
            .read()
            .expect("lock is poisoned")
            .get(container_name)
            .cloned()
        {
            handle.mark_for_reading();
            return Ok(handle);
        }

        if let Some(handle) = self.read_cache.get(container_name) {
            log::trace!("Read handle cache hit for {container_name}");
            return Ok(handle);
        }

        // NOTE: Only ever join valid file names onto the folder
        if parse_file_name(container_name).is_none() {
            return Err(crate::Error::NotFound(container_name.into()));
        }

        let name: Arc<str> = container_name.into();

        self.read_cache.get_or_load(&name, || {
            let file = ValueLogFile::open(self.path.join(&*name), &self.config)?;
            log::debug!("Caching read handle for {name}");
            Ok(ValueLogHandle::wrap(file))
        })
    }

    /// Appends a chunk to any writable file and returns its locator.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the input is invalid, or an IO error occurs.
    pub fn append_chunk(
        &self,
        family: &str,
        key: &[u8],
        chunk_number: ChunkNumber,
        payload: &[u8],
    ) -> crate::Result<ChunkLocator> {
        record::validate(family, key, chunk_number)?;

        let guard = self.get_writable_handle()?;
        guard.append_chunk(family, key, chunk_number, payload)
    }

    /// Opens a stream over the payload a locator points to.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the container does not exist, or an IO error occurs.
    pub fn read_chunk(&self, locator: &ChunkLocator) -> crate::Result<ChunkReader> {
        let handle = self.get_read_handle(&locator.container_name)?;
        handle
            .file()
            .read(locator.start_of_payload_offset, locator.length)
    }

    /// Reads the payload a locator points to and checks its hash.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the hash does not match, the container does not
    /// exist, or an IO error occurs.
    pub fn read_chunk_verified(&self, locator: &ChunkLocator) -> crate::Result<Vec<u8>> {
        let handle = self.get_read_handle(&locator.container_name)?;
        handle.file().read_verified(
            locator.start_of_payload_offset,
            locator.length,
            &locator.hash,
        )
    }

    fn should_seal(&self, file: &ValueLogFile) -> bool {
        file.is_read_only()
            || file.len() > self.config.max_file_size
            || file.record_count() > self.config.max_record_count
            || file.age() >= self.config.max_file_age
    }

    /// Seals writable files that are full, too old or broken, and queues
    /// them for compaction. Also closes idle read handles.
    ///
    /// Files currently locked by a writer are skipped.
    ///
    /// Returns the sealed files.
    pub fn run_maintenance_sweep(&self) -> Vec<Arc<ValueLogHandle>> {
        let lock = self.allocation.lock().expect("lock is poisoned");

        let handles = self
            .writable
            .read()
            .expect("lock is poisoned")
            .values()
            .cloned()
            .collect::<Vec<_>>();

        // NOTE: Holding the write lock keeps writers away from files about to be sealed
        let to_seal = handles
            .into_iter()
            .filter_map(|handle| {
                let guard = handle.try_acquire_for_writing()?;
                self.should_seal(handle.file()).then_some((handle, guard))
            })
            .collect::<Vec<_>>();

        drop(lock);

        let mut sealed = Vec::with_capacity(to_seal.len());

        for (handle, guard) in to_seal {
            if let Err(e) = handle.file().seal() {
                log::error!("Failed to seal value log {}: {e:?}", handle.name());
            }

            // NOTE: Make it readable through the cache before it leaves the writable set
            self.read_cache.insert(handle.clone());
            self.writable
                .write()
                .expect("lock is poisoned")
                .remove(handle.name());

            drop(guard);

            log::debug!(
                "Sealed value log {} ({} bytes, {} records)",
                handle.name(),
                handle.file().len(),
                handle.file().record_count(),
            );

            self.candidates.push(&handle);
            sealed.push(handle);
        }

        self.read_cache.evict_idle(self.config.read_handle_ttl);

        sealed
    }

    /// Deletes a value log file.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn remove_file(&self, container_name: &str) -> crate::Result<()> {
        if parse_file_name(container_name).is_none() {
            return Err(crate::Error::NotFound(container_name.into()));
        }

        self.read_cache.remove(container_name);

        if let Some(handle) = self
            .writable
            .write()
            .expect("lock is poisoned")
            .remove(container_name)
        {
            handle.file().close()?;
        }

        match std::fs::remove_file(self.path.join(container_name)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        fsync_directory(&self.path)?;

        log::debug!("Deleted value log {container_name}");

        Ok(())
    }

    /// Closes every writable and cached file.
    ///
    /// Can be called more than once.
    ///
    /// # Errors
    ///
    /// Will return `Err` if flushing a file fails.
    pub fn close(&self) -> crate::Result<()> {
        if self.is_closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let lock = self.allocation.lock().expect("lock is poisoned");

        let handles = self
            .writable
            .read()
            .expect("lock is poisoned")
            .values()
            .cloned()
            .collect::<Vec<_>>();

        drop(lock);

        let mut first_error = None;

        for handle in handles {
            if let Err(e) = handle.file().close() {
                log::error!("Failed to close value log {}: {e:?}", handle.name());
                first_error.get_or_insert(e);
            }
        }

        self.read_cache.clear();

        log::info!("Closed value log pool at {}", self.path.display());

        first_error.map_or(Ok(()), Err)
    }

    /// Returns the amount of files that may still accept appends.
    #[must_use]
    pub fn writable_count(&self) -> usize {
        self.writable.read().expect("lock is poisoned").len()
    }

    /// Returns the amount of open read handles in the cache.
    #[must_use]
    pub fn cached_read_handles(&self) -> usize {
        self.read_cache.len()
    }

    /// Lists the value log files in the store folder, ordered by number.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn list_files(&self) -> crate::Result<Vec<Arc<str>>> {
        let mut files = vec![];

        for dirent in std::fs::read_dir(&self.path)? {
            let dirent = dirent?;

            if let Some(name) = dirent.file_name().to_str() {
                if let Some(number) = parse_file_name(name) {
                    files.push((number, Arc::<str>::from(name)));
                }
            }
        }

        files.sort_unstable_by_key(|(number, _)| *number);

        Ok(files.into_iter().map(|(_, name)| name).collect())
    }
}
