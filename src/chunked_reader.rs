// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{log_file::reader::ChunkReader, ChunkLocator, ValueLogPool};
use std::{collections::VecDeque, io::Read};

/// Reads the chunks of a blob as one contiguous stream
///
/// Chunks are read in ascending chunk number order, no matter the order
/// the locators were given in. Only one chunk is open at any time.
pub struct ChunkedReader {
    pool: ValueLogPool,
    locators: VecDeque<ChunkLocator>,
    current: Option<ChunkReader>,
    len: u64,
}

impl std::fmt::Debug for ChunkedReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ChunkedReader<{} chunks left, {} bytes>",
            self.locators.len(),
            self.len
        )
    }
}

impl ChunkedReader {
    /// Creates a reader over all given chunks.
    #[must_use]
    pub fn new(pool: &ValueLogPool, mut locators: Vec<ChunkLocator>) -> Self {
        locators.sort_by_key(|locator| locator.chunk_number);

        let len = locators.iter().map(|locator| locator.length).sum();

        Self {
            pool: pool.clone(),
            locators: locators.into(),
            current: None,
            len,
        }
    }

    /// Creates a reader over the payload chunks, skipping the description chunk.
    #[must_use]
    pub fn payload_only(pool: &ValueLogPool, locators: Vec<ChunkLocator>) -> Self {
        let locators = locators
            .into_iter()
            .filter(|locator| locator.chunk_number != 0)
            .collect();

        Self::new(pool, locators)
    }

    /// Returns the total amount of bytes of all chunks.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` if there is nothing to read.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drops the open chunk stream and all remaining chunks.
    pub fn close(&mut self) {
        self.current = None;
        self.locators.clear();
    }
}

impl Read for ChunkedReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if let Some(current) = &mut self.current {
                let n = current.read(buf)?;

                if n > 0 {
                    return Ok(n);
                }

                self.current = None;
            }

            let Some(locator) = self.locators.pop_front() else {
                return Ok(0);
            };

            log::trace!(
                "Opening chunk #{} in {}",
                locator.chunk_number,
                locator.container_name
            );

            self.current = Some(self.pool.read_chunk(&locator)?);
        }
    }
}
