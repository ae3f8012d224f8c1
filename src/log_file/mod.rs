// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

pub mod entry;
pub mod reader;
pub mod scanner;

use crate::{
    id::FileNumber,
    path::fsync_directory,
    record::{self, HashFactory, HEADER_SIZE},
    value::{ChunkNumber, ContentHash},
    Config,
};
use entry::EntryInfo;
use reader::ChunkReader;
use scanner::Scanner;
use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

const FILE_PREFIX: &str = "vlog_";
const FILE_SUFFIX: &str = ".vlog";

/// Returns the file name of a value log file.
#[must_use]
pub fn file_name(number: FileNumber) -> String {
    format!("{FILE_PREFIX}{number:04}{FILE_SUFFIX}")
}

/// Parses the sequence number out of a value log file name.
///
/// Returns `None` for anything that is not a value log file name.
#[must_use]
pub fn parse_file_name(name: &str) -> Option<FileNumber> {
    let digits = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    digits.parse().ok()
}

fn write_record(writer: &mut BufWriter<File>, header: &[u8], payload: &[u8]) -> std::io::Result<()> {
    writer.write_all(header)?;
    writer.write_all(payload)?;
    writer.flush()?;
    writer.get_mut().sync_all()
}

/// An append-only value log file
///
/// Appends are not synchronized beyond what is needed for memory safety:
/// the single-writer rule is enforced by [`ValueLogHandle`](crate::ValueLogHandle),
/// which is the only way to reach [`ValueLogFile::append`] through the pool.
///
/// Reads address byte ranges that never change after an append returned,
/// so they take no lock and use positional I/O on a shared descriptor.
pub struct ValueLogFile {
    number: FileNumber,
    name: Arc<str>,
    path: PathBuf,

    writer: Mutex<Option<BufWriter<File>>>,
    reader: Mutex<Option<Arc<File>>>,

    /// Append cursor, equal to the file length
    cursor: AtomicU64,

    record_count: AtomicU64,
    is_read_only: AtomicBool,
    created_at: Instant,

    max_size: u64,
    max_record_count: u64,
    hash_factory: Arc<dyn HashFactory>,
}

impl std::fmt::Debug for ValueLogFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ValueLogFile<{}: {} bytes, {} records{}>",
            self.name,
            self.len(),
            self.record_count(),
            if self.is_read_only() { ", read-only" } else { "" },
        )
    }
}

impl ValueLogFile {
    /// Creates a new, empty value log file in `folder`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs, including if the file already exists.
    pub fn create<P: AsRef<Path>>(
        folder: P,
        number: FileNumber,
        config: &Config,
    ) -> crate::Result<Self> {
        let folder = folder.as_ref();
        let name: Arc<str> = file_name(number).into();
        let path = folder.join(&*name);

        log::debug!("Creating value log file {}", path.display());

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;

        fsync_directory(folder)?;

        Ok(Self {
            number,
            name,
            path,
            writer: Mutex::new(Some(BufWriter::new(file))),
            reader: Mutex::new(None),
            cursor: AtomicU64::new(0),
            record_count: AtomicU64::new(0),
            is_read_only: AtomicBool::new(false),
            created_at: Instant::now(),
            max_size: config.max_file_size,
            max_record_count: config.max_record_count,
            hash_factory: config.hash_factory.clone(),
        })
    }

    /// Opens an existing value log file for reading.
    ///
    /// Files from disk are never appended to again.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the file does not exist, its name is not a value
    /// log file name, or an IO error occurs.
    pub fn open<P: AsRef<Path>>(path: P, config: &Config) -> crate::Result<Self> {
        let path = path.as_ref();

        let name: Arc<str> = path
            .file_name()
            .and_then(|x| x.to_str())
            .unwrap_or_default()
            .into();

        let Some(number) = parse_file_name(&name) else {
            return Err(crate::Error::NotFound(name));
        };

        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(crate::Error::NotFound(name));
            }
            Err(e) => return Err(e.into()),
        };

        let len = file.metadata()?.len();

        log::debug!("Opened value log file {} ({len} bytes)", path.display());

        Ok(Self {
            number,
            name,
            path: path.into(),
            writer: Mutex::new(None),
            reader: Mutex::new(Some(Arc::new(file))),
            cursor: AtomicU64::new(len),
            record_count: AtomicU64::new(0),
            is_read_only: AtomicBool::new(true),
            created_at: Instant::now(),
            max_size: config.max_file_size,
            max_record_count: config.max_record_count,
            hash_factory: config.hash_factory.clone(),
        })
    }

    /// Returns the sequence number.
    #[must_use]
    pub fn number(&self) -> FileNumber {
        self.number
    }

    /// Returns the file name, which is the container name used in locators.
    #[must_use]
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.cursor.load(Ordering::Acquire)
    }

    /// Returns `true` if nothing was written yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the amount of records appended through this instance.
    ///
    /// Files opened from disk report 0.
    #[must_use]
    pub fn record_count(&self) -> u64 {
        self.record_count.load(Ordering::Acquire)
    }

    /// Returns how long ago this file was created or opened.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Returns `true` if the file no longer accepts appends.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.is_read_only.load(Ordering::Acquire)
    }

    /// Returns `false` if the file is read-only, or too large, or holds too many records.
    #[must_use]
    pub fn is_available_for_writing(&self) -> bool {
        !self.is_read_only()
            && self.len() <= self.max_size
            && self.record_count() <= self.max_record_count
    }

    /// Appends a record and syncs it to disk.
    ///
    /// Must only be called by the holder of the file's write lock, see
    /// [`WriteGuard`](crate::WriteGuard).
    ///
    /// If writing fails, the file is sealed and the error is returned,
    /// there is no retry.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the file is read-only, the input is invalid,
    /// or an IO error occurs.
    pub(crate) fn append(
        &self,
        family: &str,
        key: &[u8],
        chunk_number: ChunkNumber,
        payload: &[u8],
    ) -> crate::Result<EntryInfo> {
        if self.is_read_only() {
            return Err(crate::Error::ReadOnly(self.name.clone()));
        }

        let record = record::encode(family, key, chunk_number, payload, &*self.hash_factory)?;

        let mut lock = self.writer.lock().expect("lock is poisoned");

        let Some(writer) = lock.as_mut() else {
            return Err(crate::Error::ReadOnly(self.name.clone()));
        };

        let start = self.cursor.load(Ordering::Acquire);

        if let Err(e) = write_record(writer, &record.header, record.payload) {
            log::error!("Append to {} failed, sealing file: {e:?}", self.name);
            self.is_read_only.store(true, Ordering::Release);
            return Err(e.into());
        }

        let start_of_payload = start + HEADER_SIZE as u64;
        let end = start_of_payload + payload.len() as u64;

        self.cursor.store(end, Ordering::Release);
        self.record_count.fetch_add(1, Ordering::AcqRel);

        log::trace!(
            "Appended {family}:{:?}#{chunk_number} to {} at {start} ({} bytes)",
            String::from_utf8_lossy(key),
            self.name,
            payload.len(),
        );

        Ok(EntryInfo {
            start,
            start_of_payload,
            end,
            hash: record.hash,
        })
    }

    fn read_descriptor(&self) -> crate::Result<Arc<File>> {
        let mut lock = self.reader.lock().expect("lock is poisoned");

        if let Some(file) = &*lock {
            return Ok(file.clone());
        }

        let file = match File::open(&self.path) {
            Ok(file) => Arc::new(file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(crate::Error::NotFound(self.name.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        *lock = Some(file.clone());

        Ok(file)
    }

    /// Returns a stream over exactly `length` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the range exceeds the file, or an IO error occurs.
    pub fn read(&self, offset: u64, length: u64) -> crate::Result<ChunkReader> {
        let fits = offset
            .checked_add(length)
            .is_some_and(|end| end <= self.len());

        if !fits {
            return Err(crate::Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "range {offset}+{length} exceeds value log {} ({} bytes)",
                    self.name,
                    self.len()
                ),
            )));
        }

        Ok(ChunkReader::new(self.read_descriptor()?, offset, length))
    }

    /// Reads a byte range into memory and checks it against `expected`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the hash does not match, or an IO error occurs.
    pub fn read_verified(
        &self,
        offset: u64,
        length: u64,
        expected: &ContentHash,
    ) -> crate::Result<Vec<u8>> {
        let mut reader = self.read(offset, length)?;

        let mut bytes = Vec::with_capacity(usize::try_from(length).unwrap_or_default());
        let hash = self.hash_factory.hash_reader(&mut reader, &mut bytes)?;

        if &hash != expected {
            return Err(crate::Error::HashMismatch {
                container: self.name.clone(),
                offset,
            });
        }

        Ok(bytes)
    }

    /// Returns an iterator over all records, reading the file from the start.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn iter(&self) -> crate::Result<Scanner> {
        Scanner::new(&self.path, self.name.clone())
    }

    /// Stops accepting appends and releases the write descriptor.
    ///
    /// # Errors
    ///
    /// Will return `Err` if flushing fails.
    pub(crate) fn seal(&self) -> crate::Result<()> {
        self.is_read_only.store(true, Ordering::Release);

        if let Some(mut writer) = self.writer.lock().expect("lock is poisoned").take() {
            log::debug!("Sealing value log file {}", self.name);
            writer.flush()?;
            writer.get_mut().sync_all()?;
        }

        Ok(())
    }

    /// Flushes and releases all descriptors.
    ///
    /// Can be called more than once. Streams handed out earlier stay readable,
    /// later reads reopen the file.
    ///
    /// # Errors
    ///
    /// Will return `Err` if flushing fails.
    pub fn close(&self) -> crate::Result<()> {
        self.seal()?;
        self.reader.lock().expect("lock is poisoned").take();
        Ok(())
    }
}
