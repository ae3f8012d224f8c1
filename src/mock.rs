// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    value::{Family, UserKey},
    ChunkLocator, ExternalIndex,
};
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, RwLock,
    },
};

type MockIndexInner = RwLock<BTreeMap<(Family, UserKey), Vec<ChunkLocator>>>;

/// Mock in-memory index
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Default)]
pub struct MockIndex {
    data: Arc<MockIndexInner>,
    fail_writes: Arc<AtomicBool>,
}

impl std::ops::Deref for MockIndex {
    type Target = MockIndexInner;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl MockIndex {
    /// Makes every following `put` and `mark_deleted` fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Release);
    }

    /// Number of keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().expect("lock is poisoned").len()
    }

    /// Returns `true` if no key is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self) -> std::io::Result<()> {
        if self.fail_writes.load(Ordering::Acquire) {
            return Err(std::io::Error::other("mock index refuses writes"));
        }
        Ok(())
    }
}

impl ExternalIndex for MockIndex {
    fn get(&self, family: &str, key: &[u8]) -> std::io::Result<Option<Vec<ChunkLocator>>> {
        Ok(self
            .read()
            .expect("lock is poisoned")
            .get(&(Family::from(family), UserKey::from(key)))
            .cloned())
    }

    fn put(&self, family: &str, key: &[u8], locators: Vec<ChunkLocator>) -> std::io::Result<()> {
        self.check_writable()?;
        self.write()
            .expect("lock is poisoned")
            .insert((family.into(), key.into()), locators);
        Ok(())
    }

    fn mark_deleted(&self, family: &str, key: &[u8]) -> std::io::Result<()> {
        self.check_writable()?;
        self.write()
            .expect("lock is poisoned")
            .remove(&(Family::from(family), UserKey::from(key)));
        Ok(())
    }
}
