// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use path_absolutize::Absolutize;
use std::path::{Path, PathBuf};

pub fn absolute_path<P: AsRef<Path>>(path: P) -> std::io::Result<PathBuf> {
    Ok(path.as_ref().absolutize()?.into_owned())
}

/// Makes a directory entry durable.
pub fn fsync_directory<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    #[cfg(not(target_os = "windows"))]
    {
        let folder = std::fs::File::open(path)?;
        folder.sync_all()?;
    }

    #[cfg(target_os = "windows")]
    {
        let _ = path;
    }

    Ok(())
}
