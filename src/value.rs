// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::sync::Arc;

/// User defined key
pub type UserKey = Arc<[u8]>;

/// Namespace a key lives in
pub type Family = Arc<str>;

/// Caller-assigned chunk number, 0 is the description chunk
pub type ChunkNumber = i32;

/// SHA-256 of a chunk payload
pub type ContentHash = [u8; 32];
