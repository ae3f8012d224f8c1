// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    log_file::{entry::EntryInfo, ValueLogFile},
    value::ChunkNumber,
    ChunkLocator,
};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

/// Shared handle of a value log file
///
/// Any number of readers may use the file at the same time, but only the
/// holder of the [`WriteGuard`] may append to it.
#[allow(clippy::module_name_repetitions)]
pub struct ValueLogHandle {
    file: ValueLogFile,
    is_locked_for_writing: AtomicBool,

    /// Reference point for `last_access`
    epoch: Instant,

    /// Nanoseconds since `epoch` at the last read access
    last_access: AtomicU64,
}

impl std::fmt::Debug for ValueLogHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueLogHandle")
            .field("file", &self.file)
            .field("is_locked_for_writing", &self.is_locked_for_writing())
            .finish()
    }
}

impl ValueLogHandle {
    /// Wraps an unlocked file.
    #[must_use]
    pub fn wrap(file: ValueLogFile) -> Arc<Self> {
        Arc::new(Self {
            file,
            is_locked_for_writing: AtomicBool::new(false),
            epoch: Instant::now(),
            last_access: AtomicU64::new(0),
        })
    }

    /// Wraps a file whose write lock is already held by the caller.
    ///
    /// Used for freshly created files, so nobody else can claim them first.
    pub(crate) fn wrap_acquired(file: ValueLogFile) -> (Arc<Self>, WriteGuard) {
        let handle = Arc::new(Self {
            file,
            is_locked_for_writing: AtomicBool::new(true),
            epoch: Instant::now(),
            last_access: AtomicU64::new(0),
        });

        let guard = WriteGuard {
            handle: handle.clone(),
        };

        (handle, guard)
    }

    /// Returns the underlying file.
    #[must_use]
    pub fn file(&self) -> &ValueLogFile {
        &self.file
    }

    /// Returns the file name.
    #[must_use]
    pub fn name(&self) -> &Arc<str> {
        self.file.name()
    }

    /// Claims the write lock without blocking.
    ///
    /// Returns `None` if another writer holds it.
    #[must_use]
    pub fn try_acquire_for_writing(self: &Arc<Self>) -> Option<WriteGuard> {
        self.is_locked_for_writing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;

        Some(WriteGuard {
            handle: self.clone(),
        })
    }

    /// Returns `true` if a writer currently holds the write lock.
    #[must_use]
    pub fn is_locked_for_writing(&self) -> bool {
        self.is_locked_for_writing.load(Ordering::Acquire)
    }

    fn nanos_since_epoch(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Records a read access, which keeps the handle in the read cache.
    pub fn mark_for_reading(&self) {
        self.last_access
            .fetch_max(self.nanos_since_epoch(), Ordering::AcqRel);
    }

    /// Returns how long the handle has not been accessed.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        let last_access = self.last_access.load(Ordering::Acquire);
        Duration::from_nanos(self.nanos_since_epoch().saturating_sub(last_access))
    }

    fn release(&self) {
        self.is_locked_for_writing.store(false, Ordering::Release);
    }
}

/// Exclusive append access to a value log file
///
/// The write lock is released when the guard is dropped.
pub struct WriteGuard {
    handle: Arc<ValueLogHandle>,
}

impl std::fmt::Debug for WriteGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WriteGuard<{}>", self.handle.name())
    }
}

impl WriteGuard {
    /// Returns the locked handle.
    #[must_use]
    pub fn handle(&self) -> &Arc<ValueLogHandle> {
        &self.handle
    }

    /// Appends a record to the locked file.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the file is read-only, the input is invalid,
    /// or an IO error occurs.
    pub fn append(
        &self,
        family: &str,
        key: &[u8],
        chunk_number: ChunkNumber,
        payload: &[u8],
    ) -> crate::Result<EntryInfo> {
        self.handle.file.append(family, key, chunk_number, payload)
    }

    /// Appends a chunk and returns its locator.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the file is read-only, the input is invalid,
    /// or an IO error occurs.
    pub fn append_chunk(
        &self,
        family: &str,
        key: &[u8],
        chunk_number: ChunkNumber,
        payload: &[u8],
    ) -> crate::Result<ChunkLocator> {
        let info = self.append(family, key, chunk_number, payload)?;
        Ok(info.into_locator(
            self.handle.name().clone(),
            family.into(),
            key.into(),
            chunk_number,
        ))
    }

    /// Releases the write lock.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        self.handle.release();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Config;
    use test_log::test;

    #[test]
    fn handle_single_writer() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let handle = ValueLogHandle::wrap(ValueLogFile::create(dir.path(), 1, &Config::default())?);

        let guard = handle.try_acquire_for_writing().unwrap();
        assert!(handle.is_locked_for_writing());
        assert!(handle.try_acquire_for_writing().is_none());

        let locator = guard.append_chunk("f", b"a", 1, b"data")?;
        assert_eq!(&*locator.container_name, "vlog_0001.vlog");
        assert_eq!(locator.length, 4);

        guard.release();
        assert!(!handle.is_locked_for_writing());

        let guard = handle.try_acquire_for_writing();
        assert!(guard.is_some());
        drop(guard);
        assert!(!handle.is_locked_for_writing());

        Ok(())
    }

    #[test]
    fn handle_wrap_acquired() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let (handle, guard) =
            ValueLogHandle::wrap_acquired(ValueLogFile::create(dir.path(), 1, &Config::default())?);

        assert!(handle.try_acquire_for_writing().is_none());
        drop(guard);
        assert!(handle.try_acquire_for_writing().is_some());

        Ok(())
    }

    #[test]
    fn handle_contended() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let handle = ValueLogHandle::wrap(ValueLogFile::create(dir.path(), 1, &Config::default())?);

        let winners = std::thread::scope(|s| {
            let threads = (0..8)
                .map(|_| {
                    let handle = handle.clone();
                    s.spawn(move || {
                        let guard = handle.try_acquire_for_writing();
                        std::thread::sleep(Duration::from_millis(50));
                        guard.is_some()
                    })
                })
                .collect::<Vec<_>>();

            threads
                .into_iter()
                .map(|t| t.join().unwrap())
                .filter(|won| *won)
                .count()
        });

        assert!(winners >= 1);
        assert!(!handle.is_locked_for_writing());

        Ok(())
    }
}
