// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::ChunkLocator;

/// External index trait
///
/// An index maps `(family, key)` to the locators of the chunks stored
/// for that key. The value log itself keeps no index.
pub trait ExternalIndex {
    /// Returns the chunk locators of a key.
    ///
    /// This method is used to index back into the index to check for
    /// stale records when compacting value log files.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    fn get(&self, family: &str, key: &[u8]) -> std::io::Result<Option<Vec<ChunkLocator>>>;

    /// Replaces the chunk locators of a key.
    ///
    /// The write should be atomic.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    fn put(&self, family: &str, key: &[u8], locators: Vec<ChunkLocator>) -> std::io::Result<()>;

    /// Marks a key as deleted, after which [`ExternalIndex::get`] returns `None`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    fn mark_deleted(&self, family: &str, key: &[u8]) -> std::io::Result<()>;
}
