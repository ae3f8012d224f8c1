// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::sync::{atomic::AtomicU64, Arc};

/// Sequence number of a value log file
pub type FileNumber = u64;

/// Hands out ascending value log file numbers
#[derive(Clone, Debug)]
pub struct IdGenerator(Arc<AtomicU64>);

impl std::ops::Deref for IdGenerator {
    type Target = Arc<AtomicU64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(1)
    }
}

impl IdGenerator {
    pub fn new(start: FileNumber) -> Self {
        Self(Arc::new(AtomicU64::new(start)))
    }

    pub fn next(&self) -> FileNumber {
        self.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }
}
