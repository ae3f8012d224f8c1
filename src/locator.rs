// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    log_file::entry::EntryDescription,
    value::{ChunkNumber, ContentHash, Family, UserKey},
};
use std::sync::Arc;

/// A chunk locator points into a value log file
///
/// Locators are handed out by appends, stored by the external index and
/// handed back to read a chunk without scanning the log. They are never
/// mutated; compaction replaces them.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ChunkLocator {
    /// Family of the blob
    pub family: Family,

    /// Blob key
    pub key: UserKey,

    /// Chunk number, 0 is the description chunk
    pub chunk_number: ChunkNumber,

    /// Name of the value log file
    pub container_name: Arc<str>,

    /// Offset of the record header
    pub start_offset: u64,

    /// Offset of the first payload byte
    pub start_of_payload_offset: u64,

    /// Payload length
    pub length: u64,

    /// SHA-256 of the payload
    pub hash: ContentHash,
}

impl ChunkLocator {
    /// Returns the offset one past the last payload byte.
    #[must_use]
    pub fn end_offset(&self) -> u64 {
        self.start_of_payload_offset + self.length
    }

    /// Returns `true` if the locator points at the scanned record.
    #[must_use]
    pub fn points_to(&self, entry: &EntryDescription) -> bool {
        self.container_name == entry.container_name
            && self.start_of_payload_offset == entry.start_of_payload
            && self.chunk_number == entry.chunk_number
            && self.length == entry.length
    }

    /// Returns the payload hash as lowercase hex.
    #[must_use]
    pub fn hash_hex(&self) -> String {
        use std::fmt::Write;

        self.hash.iter().fold(String::with_capacity(64), |mut s, b| {
            let _ = write!(s, "{b:02x}");
            s
        })
    }
}
