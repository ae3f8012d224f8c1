// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::{fs::File, io::Read, sync::Arc};

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
    use std::os::unix::fs::FileExt;

    // NOTE: pread does not move the file cursor, so the descriptor can be shared
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

/// Reads exactly one byte range of a value log file.
///
/// The range is immutable once an append returned it, so reading needs no lock.
pub struct ChunkReader {
    file: Arc<File>,
    position: u64,
    remaining: u64,
    len: u64,
}

impl ChunkReader {
    pub(crate) fn new(file: Arc<File>, offset: u64, length: u64) -> Self {
        Self {
            file,
            position: offset,
            remaining: length,
            len: length,
        }
    }

    /// Returns the total amount of bytes this reader yields.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` if the range is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the amount of bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl Read for ChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let max = usize::try_from(self.remaining)
            .unwrap_or(usize::MAX)
            .min(buf.len());

        let Some(buf) = buf.get_mut(..max) else {
            return Ok(0);
        };

        let n = read_at(&self.file, buf, self.position)?;

        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "value log ended before the chunk",
            ));
        }

        self.position += n as u64;
        self.remaining -= n as u64;

        Ok(n)
    }
}
