// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::record::{HashFactory, Sha256Factory};
use std::{sync::Arc, time::Duration};

/// Value log configuration
#[derive(Clone)]
pub struct Config {
    /// Size after which a value log file stops accepting appends
    pub(crate) max_file_size: u64,

    /// Record count after which a value log file stops accepting appends
    pub(crate) max_record_count: u64,

    /// Age after which the maintenance sweep seals a writable file
    pub(crate) max_file_age: Duration,

    /// Maximum number of read handles kept open
    pub(crate) read_cache_capacity: usize,

    /// Idle time after which a cached read handle is closed
    pub(crate) read_handle_ttl: Duration,

    /// Interval of the background maintenance sweep
    pub(crate) sweep_interval: Duration,

    /// Whether to run the maintenance sweep on a background thread
    pub(crate) background_maintenance: bool,

    /// Chunk size used when splitting blobs
    pub(crate) chunk_size: usize,

    /// Content digest factory
    pub(crate) hash_factory: Arc<dyn HashFactory>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("max_file_size", &self.max_file_size)
            .field("max_record_count", &self.max_record_count)
            .field("max_file_age", &self.max_file_age)
            .field("read_cache_capacity", &self.read_cache_capacity)
            .field("read_handle_ttl", &self.read_handle_ttl)
            .field("sweep_interval", &self.sweep_interval)
            .field("background_maintenance", &self.background_maintenance)
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_file_size: 100 * 1_024 * 1_024,
            max_record_count: 10_000,
            max_file_age: Duration::from_secs(60 * 60),
            read_cache_capacity: 100,
            read_handle_ttl: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(10),
            background_maintenance: true,
            chunk_size: 1_024 * 1_024,
            hash_factory: Arc::new(Sha256Factory),
        }
    }
}

impl Config {
    /// Sets the maximum size of value log files.
    ///
    /// A file is no longer picked for appends once it grew past this size,
    /// so a file may exceed it by at most one record.
    ///
    /// Compaction works on a per-file basis, so this heavily
    /// influences space amplification.
    ///
    /// Default = 100 MiB
    #[must_use]
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Sets the maximum amount of records per value log file.
    ///
    /// Default = 10'000
    #[must_use]
    pub fn max_record_count(mut self, count: u64) -> Self {
        self.max_record_count = count;
        self
    }

    /// Sets the age after which writable files are sealed by the maintenance sweep.
    ///
    /// Default = 1 hour
    #[must_use]
    pub fn max_file_age(mut self, age: Duration) -> Self {
        self.max_file_age = age;
        self
    }

    /// Sets the maximum amount of value log files kept open for reading.
    ///
    /// Default = 100
    #[must_use]
    pub fn read_cache_capacity(mut self, handles: usize) -> Self {
        self.read_cache_capacity = handles;
        self
    }

    /// Sets the idle time after which a cached read handle is closed.
    ///
    /// Default = 60 seconds
    #[must_use]
    pub fn read_handle_ttl(mut self, ttl: Duration) -> Self {
        self.read_handle_ttl = ttl;
        self
    }

    /// Sets the interval of the background maintenance sweep.
    ///
    /// Default = 10 seconds
    #[must_use]
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Enables or disables the background maintenance thread.
    ///
    /// If disabled, [`BlobStore::run_maintenance_sweep`](crate::BlobStore::run_maintenance_sweep)
    /// needs to be called manually.
    ///
    /// Default = enabled
    #[must_use]
    pub fn background_maintenance(mut self, enabled: bool) -> Self {
        self.background_maintenance = enabled;
        self
    }

    /// Sets the chunk size used to split blobs.
    ///
    /// # Panics
    ///
    /// Panics if the chunk size is 0.
    ///
    /// Default = 1 MiB
    #[must_use]
    pub fn chunk_size(mut self, bytes: usize) -> Self {
        assert!(bytes > 0, "chunk size may not be 0");
        self.chunk_size = bytes;
        self
    }

    /// Sets the content digest.
    ///
    /// Default = SHA-256
    #[must_use]
    pub fn hash_factory(mut self, factory: Arc<dyn HashFactory>) -> Self {
        self.hash_factory = factory;
        self
    }
}
