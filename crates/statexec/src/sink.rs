// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Append-only destination for sample batches and annotations.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Durable target that formatted text is appended to.
///
/// Each call appends the whole buffer; callers batch a sampling tick into a
/// single call.
pub trait SampleSink: Send + Sync {
    fn append(&self, bytes: &[u8]) -> io::Result<()>;
}

/// Metrics file opened in append mode.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSink {
    /// Opens `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o644);
        }
        let file = options.open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Deletes any previous file at `path` before opening a fresh one.
    pub fn create_fresh(path: impl AsRef<Path>) -> io::Result<Self> {
        match fs::remove_file(path.as_ref()) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SampleSink for FileSink {
    fn append(&self, bytes: &[u8]) -> io::Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "metrics file lock poisoned"))?;
        file.write_all(bytes)?;
        file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.prom");

        let sink = FileSink::open(&path).unwrap();
        sink.append(b"first\n").unwrap();
        sink.append(b"second\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
        assert_eq!(sink.path(), path.as_path());
    }

    #[test]
    fn test_create_fresh_truncates_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.prom");
        fs::write(&path, "stale\n").unwrap();

        let sink = FileSink::create_fresh(&path).unwrap();
        sink.append(b"fresh\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "fresh\n");
    }

    #[test]
    fn test_open_keeps_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.prom");
        fs::write(&path, "kept\n").unwrap();

        FileSink::open(&path).unwrap().append(b"added\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "kept\nadded\n");
    }

    #[test]
    fn test_open_fails_in_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileSink::open(dir.path().join("missing/metrics.prom")).is_err());
    }
}
