// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::ValueLogHandle;
use quick_cache::{sync::Cache, Lifecycle, UnitWeighter};
use std::{sync::Arc, time::Duration};

fn close_handle(name: &str, handle: &ValueLogHandle) {
    log::trace!("Closing cached read handle {name}");

    if let Err(e) = handle.file().close() {
        log::warn!("Failed to close read handle {name}: {e:?}");
    }
}

/// Closes handles pushed out of the cache
#[derive(Clone, Default)]
struct CloseOnEvict;

impl Lifecycle<Arc<str>, Arc<ValueLogHandle>> for CloseOnEvict {
    type RequestState = ();

    fn begin_request(&self) -> Self::RequestState {}

    fn on_evict(&self, _: &mut Self::RequestState, key: Arc<str>, val: Arc<ValueLogHandle>) {
        close_handle(&key, &val);
    }
}

/// Keeps a bounded number of sealed value log files open for reading
///
/// Handles that fall out of the cache, either because of capacity or
/// because they sat idle for too long, are closed.
pub struct ReadCache {
    data: Cache<Arc<str>, Arc<ValueLogHandle>, UnitWeighter, ahash::RandomState, CloseOnEvict>,

    /// Capacity in handles
    capacity: usize,
}

impl std::fmt::Debug for ReadCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReadCache<cap: {} handles>", self.capacity)
    }
}

impl ReadCache {
    /// Creates a new read cache holding up to `capacity` handles.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);

        #[allow(clippy::default_trait_access)]
        let data = Cache::with(
            capacity,
            capacity as u64,
            UnitWeighter,
            Default::default(),
            CloseOnEvict,
        );

        Self { data, capacity }
    }

    /// Returns the amount of cached handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the cached handle, if any.
    pub fn get(&self, name: &str) -> Option<Arc<ValueLogHandle>> {
        let handle = self.data.get(name)?;
        handle.mark_for_reading();
        Some(handle)
    }

    /// Returns the cached handle, or loads and caches it.
    ///
    /// # Errors
    ///
    /// Will return `Err` if loading fails, in which case nothing is cached.
    pub fn get_or_load<F>(&self, name: &Arc<str>, load: F) -> crate::Result<Arc<ValueLogHandle>>
    where
        F: FnOnce() -> crate::Result<Arc<ValueLogHandle>>,
    {
        let handle = self.data.get_or_insert_with(name, load)?;
        handle.mark_for_reading();
        Ok(handle)
    }

    /// Caches a handle.
    pub fn insert(&self, handle: Arc<ValueLogHandle>) {
        handle.mark_for_reading();
        self.data.insert(handle.name().clone(), handle);
    }

    /// Removes a handle from the cache and closes it.
    pub fn remove(&self, name: &str) -> Option<Arc<ValueLogHandle>> {
        let (key, handle) = self.data.remove(name)?;
        close_handle(&key, &handle);
        Some(handle)
    }

    /// Closes and drops every handle that has not been used for `ttl`.
    ///
    /// Returns the amount of evicted handles.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let before = self.data.len();

        self.data.retain(|name, handle| {
            if handle.idle_for() < ttl {
                return true;
            }

            close_handle(name, handle);
            false
        });

        let evicted = before.saturating_sub(self.data.len());

        if evicted > 0 {
            log::debug!("Evicted {evicted} idle read handles");
        }

        evicted
    }

    /// Closes and drops every handle.
    pub fn clear(&self) {
        self.data.retain(|name, handle| {
            close_handle(name, handle);
            false
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{log_file::ValueLogFile, Config};
    use test_log::test;

    fn sealed_handle(dir: &std::path::Path, number: u64) -> crate::Result<Arc<ValueLogHandle>> {
        let file = ValueLogFile::create(dir, number, &Config::default())?;
        file.append("f", b"k", 1, b"data")?;
        file.close()?;
        Ok(ValueLogHandle::wrap(file))
    }

    #[test]
    fn read_cache_get_or_load() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = ReadCache::with_capacity(10);
        let handle = sealed_handle(dir.path(), 1)?;

        let name = handle.name().clone();
        assert!(cache.get(&name).is_none());

        let loaded = cache.get_or_load(&name, || Ok(handle.clone()))?;
        assert!(Arc::ptr_eq(&loaded, &handle));

        // Second call is served from the cache
        let cached = cache.get_or_load(&name, || panic!("should be cached"))?;
        assert!(Arc::ptr_eq(&cached, &handle));

        assert!(cache
            .get_or_load(&"vlog_0009.vlog".into(), || Err(crate::Error::NotFound(
                "vlog_0009.vlog".into()
            )))
            .is_err());
        assert_eq!(cache.len(), 1);

        Ok(())
    }

    #[test]
    fn read_cache_evict_idle() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = ReadCache::with_capacity(10);

        cache.insert(sealed_handle(dir.path(), 1)?);
        cache.insert(sealed_handle(dir.path(), 2)?);
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.evict_idle(Duration::from_secs(60)), 0);

        std::thread::sleep(Duration::from_millis(50));
        cache.get("vlog_0002.vlog").unwrap();

        assert_eq!(cache.evict_idle(Duration::from_millis(40)), 1);
        assert!(cache.get("vlog_0001.vlog").is_none());
        assert!(cache.get("vlog_0002.vlog").is_some());

        cache.clear();
        assert!(cache.is_empty());

        Ok(())
    }

    #[test]
    fn read_cache_remove() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = ReadCache::with_capacity(10);
        cache.insert(sealed_handle(dir.path(), 1)?);

        assert!(cache.remove("vlog_0001.vlog").is_some());
        assert!(cache.remove("vlog_0001.vlog").is_none());
        assert!(cache.is_empty());

        Ok(())
    }
}
