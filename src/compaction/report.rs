// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Statistics of a compaction pass
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CompactionReport {
    /// Files deleted after their live records were relocated
    pub files_reclaimed: usize,

    /// Files kept on disk because some of their bytes could not be scanned
    pub files_retained: usize,

    /// Records still referenced by the index, rewritten into a writable file
    pub records_relocated: u64,

    /// Records no longer referenced by the index
    pub records_dropped: u64,

    /// Size of the deleted files
    pub bytes_freed: u64,

    /// Payload bytes written again
    pub bytes_rewritten: u64,
}

impl CompactionReport {
    /// Returns `true` if the pass did not touch any file.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files_reclaimed == 0 && self.files_retained == 0
    }

    /// Returns the net amount of bytes given back to the file system.
    #[must_use]
    pub fn net_bytes_freed(&self) -> u64 {
        self.bytes_freed.saturating_sub(self.bytes_rewritten)
    }
}

impl std::fmt::Display for CompactionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "reclaimed {} files ({} bytes), kept {} files, relocated {} records ({} bytes), dropped {} records",
            self.files_reclaimed,
            self.bytes_freed,
            self.files_retained,
            self.records_relocated,
            self.bytes_rewritten,
            self.records_dropped,
        )
    }
}
