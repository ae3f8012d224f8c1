// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Value log blob store engine.
//!
//! Large binary payloads ("blobs") are split into chunks and appended to
//! value log files, while an external index keeps small, frequently accessed
//! metadata and a [`ChunkLocator`] per chunk. Holding a locator allows
//! loading a chunk by reading the byte range it points to, without scanning
//! the log.
//!
//! Every record is a fixed-size header followed by the raw payload:
//!
//! [@@@1 | family | key | chunk number | length | sha256 | # | padding][payload]
//!
//! The fixed header size makes it possible to scan a file from the start and
//! to skip over damaged regions one byte at a time until the next header.
//!
//! Each value log file has at most one writer at a time. The
//! [`ValueLogPool`] hands out locked files ([`WriteGuard`]), starts new files
//! once the current ones are full and keeps a bounded cache of open read
//! handles. Files that are full, or older than the configured maximum age,
//! are sealed by a periodic maintenance sweep and queued for compaction.
//!
//! As blobs are overwritten or deleted, old chunks unnecessarily occupy disk
//! space. The [`Compactor`] rewrites the chunks of a sealed file that the
//! index still points to, updates the index, and only then deletes the file.
//!
//! In summary, a value log trades read and space amplification for superior
//! write amplification when storing large blobs.

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]
#![deny(clippy::unwrap_used, clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery, clippy::cargo)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]

mod blob_store;
mod chunked_reader;
mod compaction;
mod config;
mod error;
mod handle;
mod id;
mod index;
mod locator;
mod log_file;
mod maintenance;
mod marker;
mod mock;
mod path;
mod pool;
mod read_cache;
mod record;
mod value;
mod version;

pub use {
    blob_store::BlobStore,
    chunked_reader::ChunkedReader,
    compaction::{report::CompactionReport, CandidateState, Compactor},
    config::Config,
    error::{Error, Result},
    handle::{ValueLogHandle, WriteGuard},
    id::FileNumber,
    index::ExternalIndex,
    locator::ChunkLocator,
    log_file::{
        entry::{EntryDescription, EntryInfo},
        file_name, parse_file_name,
        reader::ChunkReader,
        scanner::Scanner,
        ValueLogFile,
    },
    maintenance::Maintenance,
    pool::ValueLogPool,
    record::{
        decode_header, encode, validate, ContentHasher, EncodedRecord, HashFactory, RecordHeader,
        Sha256Factory, HASH_LENGTH, HEADER_SIZE, NAME_MAX_LENGTH,
    },
    value::{ChunkNumber, ContentHash, Family, UserKey},
    version::Version,
};

#[doc(hidden)]
pub use mock::MockIndex;
