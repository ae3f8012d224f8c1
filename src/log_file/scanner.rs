// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::entry::EntryDescription;
use crate::record::{decode_header, HEADER_SIZE};
use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
    sync::Arc,
};

/// Reads through a value log file in order.
///
/// Bytes that do not form a valid record header are skipped one at a time
/// until the next header is found, so a damaged region (for example a record
/// cut short by a crash) does not hide the records around it.
///
/// If a header declares more payload than the file holds, the scanner yields
/// [`Error::Truncated`](crate::Error::Truncated) once and stops.
pub struct Scanner {
    container: Arc<str>,
    inner: BufReader<File>,

    /// File length as last observed
    file_len: u64,

    /// File offset of the first byte in `window`
    position: u64,
    window: Vec<u8>,

    /// Bytes skipped since the last valid header
    skipped: u64,

    /// Bytes skipped over the whole scan
    skipped_total: u64,

    is_terminated: bool,
}

impl Scanner {
    pub(crate) fn new<P: AsRef<Path>>(path: P, container: Arc<str>) -> crate::Result<Self> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                crate::Error::NotFound(container.clone())
            } else {
                e.into()
            }
        })?;

        let file_len = file.metadata()?.len();

        Ok(Self {
            container,
            inner: BufReader::new(file),
            file_len,
            position: 0,
            window: Vec::with_capacity(HEADER_SIZE),
            skipped: 0,
            skipped_total: 0,
            is_terminated: false,
        })
    }

    /// Returns the amount of bytes skipped so far because they did not
    /// belong to any readable record.
    #[must_use]
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped_total
    }

    /// Tops up the window to a full header, unless the file ends first.
    fn fill_window(&mut self) -> std::io::Result<()> {
        while self.window.len() < HEADER_SIZE {
            let filled = self.window.len();
            self.window.resize(HEADER_SIZE, 0);

            let n = match self.window.get_mut(filled..) {
                Some(free) => self.inner.read(free),
                None => Ok(0),
            };

            let n = match n {
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {
                    self.window.truncate(filled);
                    continue;
                }
                Err(e) => {
                    self.window.truncate(filled);
                    return Err(e);
                }
            };

            self.window.truncate(filled + n);

            if n == 0 {
                break;
            }
        }

        Ok(())
    }

    fn payload_fits(&mut self, end: u64) -> std::io::Result<bool> {
        if end <= self.file_len {
            return Ok(true);
        }

        // NOTE: The file may have grown while scanning
        self.file_len = self.inner.get_ref().metadata()?.len();
        Ok(end <= self.file_len)
    }

    fn report_skipped(&mut self) {
        if self.skipped > 0 {
            log::warn!(
                "Skipped {} unreadable bytes in {} before offset {}",
                self.skipped,
                self.container,
                self.position,
            );
            self.skipped = 0;
        }
    }

    fn truncated(&mut self, offset: u64, expected: u64) -> crate::Error {
        self.is_terminated = true;

        log::warn!(
            "Record at {}:{offset} is truncated, expected {expected} payload bytes",
            self.container,
        );

        crate::Error::Truncated {
            container: self.container.clone(),
            offset,
            expected,
        }
    }
}

impl Iterator for Scanner {
    type Item = crate::Result<EntryDescription>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.is_terminated {
                return None;
            }

            if let Err(e) = self.fill_window() {
                self.is_terminated = true;
                return Some(Err(e.into()));
            }

            if self.window.is_empty() {
                self.report_skipped();
                self.is_terminated = true;
                return None;
            }

            if let Some(header) = decode_header(&self.window) {
                self.report_skipped();

                let start = self.position;

                if self.window.len() < HEADER_SIZE {
                    return Some(Err(self.truncated(start, header.payload_length)));
                }

                let start_of_payload = start + HEADER_SIZE as u64;

                let fits = start_of_payload
                    .checked_add(header.payload_length)
                    .map(|end| self.payload_fits(end));

                match fits {
                    Some(Ok(true)) => {}
                    Some(Err(e)) => {
                        self.is_terminated = true;
                        return Some(Err(e.into()));
                    }
                    Some(Ok(false)) | None => {
                        return Some(Err(self.truncated(start, header.payload_length)));
                    }
                }

                // NOTE: The window ends exactly where the payload begins
                self.window.clear();

                // NOTE: decode_header never yields lengths above i64::MAX
                #[allow(clippy::cast_possible_wrap)]
                if let Err(e) = self.inner.seek_relative(header.payload_length as i64) {
                    self.is_terminated = true;
                    return Some(Err(e.into()));
                }

                self.position = start_of_payload + header.payload_length;

                return Some(Ok(EntryDescription {
                    container_name: self.container.clone(),
                    family: header.family,
                    key: header.key,
                    chunk_number: header.chunk_number,
                    start,
                    start_of_payload,
                    length: header.payload_length,
                    hash: header.hash,
                }));
            }

            // Resynchronize
            self.window.remove(0);
            self.position += 1;
            self.skipped += 1;
            self.skipped_total += 1;
        }
    }
}
