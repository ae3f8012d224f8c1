// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

pub mod report;

use crate::{ExternalIndex, ValueLogHandle, ValueLogPool};
use report::CompactionReport;
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

/// Lifecycle of a sealed file on its way to deletion
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum CandidateState {
    /// Waiting for the next compaction pass
    Queued,

    /// Live records are being relocated
    Rewriting,

    /// Deleted
    Reclaimed,

    /// Kept on disk because parts of it could not be read back
    Retained,
}

#[derive(Default)]
struct QueueInner {
    queue: VecDeque<Arc<ValueLogHandle>>,
    states: HashMap<Arc<str>, CandidateState>,
}

/// Sealed files handed from the maintenance sweep to the compactor
#[derive(Clone, Default)]
pub struct CandidateQueue(Arc<Mutex<QueueInner>>);

impl CandidateQueue {
    /// Enqueues a file, unless it is already known.
    pub fn push(&self, handle: &Arc<ValueLogHandle>) -> bool {
        let mut lock = self.0.lock().expect("lock is poisoned");

        if lock.states.contains_key(handle.name()) {
            return false;
        }

        lock.states
            .insert(handle.name().clone(), CandidateState::Queued);
        lock.queue.push_back(handle.clone());

        true
    }

    fn pop(&self) -> Option<Arc<ValueLogHandle>> {
        let mut lock = self.0.lock().expect("lock is poisoned");

        let handle = lock.queue.pop_front()?;
        lock.states
            .insert(handle.name().clone(), CandidateState::Rewriting);

        Some(handle)
    }

    fn requeue(&self, handle: Arc<ValueLogHandle>) {
        let mut lock = self.0.lock().expect("lock is poisoned");

        lock.states
            .insert(handle.name().clone(), CandidateState::Queued);
        lock.queue.push_back(handle);
    }

    fn mark(&self, name: &Arc<str>, state: CandidateState) {
        self.0
            .lock()
            .expect("lock is poisoned")
            .states
            .insert(name.clone(), state);
    }

    /// Returns the state of a file, if it was ever queued.
    #[must_use]
    pub fn state(&self, name: &str) -> Option<CandidateState> {
        self.0
            .lock()
            .expect("lock is poisoned")
            .states
            .get(name)
            .copied()
    }

    /// Returns the names of the queued files, in queue order.
    #[must_use]
    pub fn queued(&self) -> Vec<Arc<str>> {
        self.0
            .lock()
            .expect("lock is poisoned")
            .queue
            .iter()
            .map(|handle| handle.name().clone())
            .collect()
    }

    /// Returns the amount of queued files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.lock().expect("lock is poisoned").queue.len()
    }

    /// Returns `true` if no file is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reclaims space from sealed value log files
///
/// Every record of a candidate file that the index still points to is
/// appended again through the pool and the index is updated to the new
/// location. Only then is the old file deleted, so a failure at any point
/// leaves every locator in the index resolvable.
pub struct Compactor {
    pool: ValueLogPool,

    /// Serializes compaction passes
    pass_lock: Mutex<()>,
}

impl std::fmt::Debug for Compactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Compactor<{} queued>", self.pool.candidates().len())
    }
}

impl Compactor {
    /// Creates a compactor consuming the pool's candidate queue.
    #[must_use]
    pub fn new(pool: &ValueLogPool) -> Self {
        Self {
            pool: pool.clone(),
            pass_lock: Mutex::new(()),
        }
    }

    /// Enqueues a sealed file.
    ///
    /// Returns `false` if the file still accepts appends, is locked by a
    /// writer, or was queued before.
    pub fn add_candidate(&self, handle: &Arc<ValueLogHandle>) -> bool {
        if !handle.file().is_read_only() || handle.is_locked_for_writing() {
            log::debug!("Refusing to queue {} for compaction, still writable", handle.name());
            return false;
        }

        self.pool.candidates().push(handle)
    }

    /// Returns the state of a file, if it was ever queued.
    #[must_use]
    pub fn state(&self, name: &str) -> Option<CandidateState> {
        self.pool.candidates().state(name)
    }

    /// Returns the names of the queued files.
    #[must_use]
    pub fn queued(&self) -> Vec<Arc<str>> {
        self.pool.candidates().queued()
    }

    /// Compacts every queued file.
    ///
    /// If a file fails, it is queued again and the error is returned;
    /// files compacted before it stay deleted. Files with unreadable regions
    /// are kept on disk, see [`CandidateState::Retained`].
    ///
    /// # Errors
    ///
    /// Will return `Err` if the index fails, a relocated record does not match
    /// its hash, or an IO error occurs.
    pub fn run_compaction_pass(
        &self,
        index: &(dyn ExternalIndex + Send + Sync),
    ) -> crate::Result<CompactionReport> {
        let _lock = self.pass_lock.lock().expect("lock is poisoned");

        let queue = self.pool.candidates();
        let mut report = CompactionReport::default();

        if queue.is_empty() {
            log::trace!("Compaction queue is empty");
            return Ok(report);
        }

        while let Some(handle) = queue.pop() {
            log::debug!("Compacting value log {}", handle.name());

            match self.compact_file(&handle, index, &mut report) {
                Ok(true) => {
                    queue.mark(handle.name(), CandidateState::Reclaimed);
                    report.files_reclaimed += 1;
                }
                Ok(false) => {
                    queue.mark(handle.name(), CandidateState::Retained);
                    report.files_retained += 1;
                }
                Err(e) => {
                    log::error!("Compaction of {} failed: {e:?}", handle.name());
                    queue.requeue(handle);
                    return Err(e);
                }
            }
        }

        if !report.is_empty() {
            log::info!("Compaction pass done: {report}");
        }

        Ok(report)
    }

    /// Relocates the live records of a file, then deletes it.
    ///
    /// Returns `false` if the file is kept, because the scan had to skip
    /// bytes or hit a truncated record. Those regions may still hold
    /// payloads the index points to.
    fn compact_file(
        &self,
        handle: &ValueLogHandle,
        index: &(dyn ExternalIndex + Send + Sync),
        report: &mut CompactionReport,
    ) -> crate::Result<bool> {
        let file = handle.file();
        let mut scanner = file.iter()?;
        let mut is_truncated = false;

        for entry in scanner.by_ref() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(crate::Error::Truncated { .. }) => {
                    is_truncated = true;
                    break;
                }
                Err(e) => return Err(e),
            };

            let locators = index
                .get(&entry.family, &entry.key)
                .map_err(crate::Error::Index)?;

            let Some(mut locators) = locators else {
                report.records_dropped += 1;
                continue;
            };

            let Some(slot) = locators.iter_mut().find(|l| l.points_to(&entry)) else {
                report.records_dropped += 1;
                continue;
            };

            let payload = file.read_verified(entry.start_of_payload, entry.length, &entry.hash)?;

            let relocated =
                self.pool
                    .append_chunk(&entry.family, &entry.key, entry.chunk_number, &payload)?;

            log::trace!(
                "Relocated {}:{}#{} from {} to {}",
                entry.family,
                String::from_utf8_lossy(&entry.key),
                entry.chunk_number,
                entry.container_name,
                relocated.container_name,
            );

            *slot = relocated;

            index
                .put(&entry.family, &entry.key, locators)
                .map_err(crate::Error::Index)?;

            report.records_relocated += 1;
            report.bytes_rewritten += entry.length;
        }

        let skipped = scanner.skipped_bytes();

        if skipped > 0 || is_truncated {
            log::warn!(
                "Keeping value log {}, {skipped} bytes were unreadable (truncated: {is_truncated})",
                handle.name(),
            );
            return Ok(false);
        }

        let size = file.len();

        // NOTE: Index is up to date, nothing points into this file anymore
        self.pool.remove_file(handle.name())?;

        report.bytes_freed += size;

        Ok(true)
    }
}
