// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    value::{ChunkNumber, ContentHash, Family, UserKey},
    ChunkLocator,
};
use std::sync::Arc;

/// Where an append put a record
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EntryInfo {
    /// Offset of the record header
    pub start: u64,

    /// Offset of the first payload byte
    pub start_of_payload: u64,

    /// Offset one past the last payload byte
    pub end: u64,

    /// Payload hash
    pub hash: ContentHash,
}

impl EntryInfo {
    /// Returns the payload length.
    #[must_use]
    pub fn payload_length(&self) -> u64 {
        self.end - self.start_of_payload
    }

    /// Builds the locator of the appended chunk.
    #[must_use]
    pub fn into_locator(
        self,
        container_name: Arc<str>,
        family: Family,
        key: UserKey,
        chunk_number: ChunkNumber,
    ) -> ChunkLocator {
        ChunkLocator {
            family,
            key,
            chunk_number,
            container_name,
            start_offset: self.start,
            start_of_payload_offset: self.start_of_payload,
            length: self.payload_length(),
            hash: self.hash,
        }
    }
}

/// A record found while scanning a value log file
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct EntryDescription {
    /// Name of the scanned file
    pub container_name: Arc<str>,

    /// Family
    pub family: Family,

    /// Key
    pub key: UserKey,

    /// Chunk number
    pub chunk_number: ChunkNumber,

    /// Offset of the record header
    pub start: u64,

    /// Offset of the first payload byte
    pub start_of_payload: u64,

    /// Payload length
    pub length: u64,

    /// Payload hash as stored in the header
    pub hash: ContentHash,
}

impl EntryDescription {
    /// Offset one past the last payload byte
    #[must_use]
    pub fn end(&self) -> u64 {
        self.start_of_payload + self.length
    }

    /// Returns a locator pointing at this record.
    #[must_use]
    pub fn locator(&self) -> ChunkLocator {
        ChunkLocator {
            family: self.family.clone(),
            key: self.key.clone(),
            chunk_number: self.chunk_number,
            container_name: self.container_name.clone(),
            start_offset: self.start,
            start_of_payload_offset: self.start_of_payload,
            length: self.length,
            hash: self.hash,
        }
    }
}
