// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::version::Version;
use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};

/// Name of the file that marks a fully initialized store folder
pub const MARKER_FILE: &str = ".vlog-store";

fn rewrite_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let Some(folder) = path.parent() else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "marker path has no parent folder",
        ));
    };

    let mut temp_file = tempfile::NamedTempFile::new_in(folder)?;
    temp_file.write_all(content)?;
    temp_file.as_file().sync_all()?;
    temp_file.persist(path).map_err(|e| e.error)?;

    #[cfg(not(target_os = "windows"))]
    {
        let file = File::open(path)?;
        file.sync_all()?;
    }

    Ok(())
}

fn marker_path(folder: &Path) -> PathBuf {
    folder.join(MARKER_FILE)
}

/// Writes the marker unless it exists, otherwise checks its version.
///
/// Returns `true` if the marker was newly written.
///
/// # Errors
///
/// Will return `Err` if the folder belongs to an unknown format version,
/// or an IO error occurs.
pub fn write_or_check(folder: &Path) -> crate::Result<bool> {
    let path = marker_path(folder);

    if path.try_exists()? {
        let bytes = std::fs::read(&path)?;

        return match Version::parse_file_header(&bytes) {
            Some(Version::V1) => Ok(false),
            None => Err(crate::Error::InvalidVersion(None)),
        };
    }

    let mut bytes = Vec::with_capacity(Version::len());
    Version::V1.write_file_header(&mut bytes)?;
    rewrite_atomic(&path, &bytes)?;

    log::debug!("Wrote store marker {}", path.display());

    Ok(true)
}
