// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::version::Version;
use std::sync::Arc;

/// Represents errors that can occur in the value log engine
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Family, key or chunk number cannot be stored
    ///
    /// Raised before any I/O happens.
    Validation(&'static str),

    /// Append attempted on a sealed value log file
    ///
    /// Request a fresh handle from the pool and retry.
    ReadOnly(Arc<str>),

    /// Referenced value log file does not exist
    ///
    /// This means the index and the value logs have diverged.
    NotFound(Arc<str>),

    /// A record header declares more payload bytes than the file holds
    Truncated {
        /// Value log file name
        container: Arc<str>,

        /// Offset of the record start
        offset: u64,

        /// Declared payload length
        expected: u64,
    },

    /// Payload bytes do not match the stored content hash
    HashMismatch {
        /// Value log file name
        container: Arc<str>,

        /// Offset of the payload
        offset: u64,
    },

    /// Invalid data format version
    InvalidVersion(Option<Version>),

    /// External index returned an error
    Index(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "BlobVlogError: invalid input: {msg}"),
            Self::ReadOnly(name) => write!(f, "BlobVlogError: {name} is read-only"),
            Self::NotFound(name) => write!(f, "BlobVlogError: value log {name} not found"),
            Self::Truncated {
                container,
                offset,
                expected,
            } => write!(
                f,
                "BlobVlogError: record at {container}:{offset} is truncated, expected {expected} payload bytes"
            ),
            Self::HashMismatch { container, offset } => {
                write!(f, "BlobVlogError: hash mismatch at {container}:{offset}")
            }
            _ => write!(f, "BlobVlogError: {self:?}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) | Self::Index(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Value log result
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for std::io::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::Io(e) | Error::Index(e) => e,
            e => Self::other(e),
        }
    }
}
