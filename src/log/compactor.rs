//! Log Compactor
//!
//! Writes a fresh log next to the live one and atomically swaps it in.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{LodeError, Result};

use super::{LogEntry, LogWriter};

/// Builds a replacement for the log at `path` in `path~`
///
/// Nothing touches the live log until `commit`, which fsyncs the new file and
/// renames it into place: a crash leaves either the old log or the new one.
/// Dropping an uncommitted compactor removes the temporary file.
pub struct LogCompactor {
    path: PathBuf,
    temp_path: PathBuf,
    writer: Option<BufWriter<File>>,
    entries: usize,
    committed: bool,
}

impl LogCompactor {
    /// Start a rewrite of the log at `path`, discarding any stale temp file
    pub fn create(path: &Path) -> Result<Self> {
        let temp_path = Self::temp_path(path);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|source| LodeError::Open {
                path: temp_path.clone(),
                source,
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            temp_path,
            writer: Some(BufWriter::new(file)),
            entries: 0,
            committed: false,
        })
    }

    /// `index.log` -> `index.log~`
    pub fn temp_path(path: &Path) -> PathBuf {
        let mut name = OsString::from(path.as_os_str());
        name.push("~");
        PathBuf::from(name)
    }

    pub fn push(&mut self, entry: &LogEntry) -> Result<()> {
        let line = entry.to_line()?;
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| LodeError::Storage("compactor already committed".to_string()))?;
        writer
            .write_all(line.as_bytes())
            .map_err(|source| LodeError::LogWrite {
                path: self.temp_path.clone(),
                source,
            })?;
        self.entries += 1;
        Ok(())
    }

    /// Entries written so far
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Make the new log durable, rename it over the old one and reopen it
    ///
    /// An error may come after the rename, so on failure a caller holding a
    /// handle on the old log must reopen the path rather than keep using it.
    pub fn commit(mut self) -> Result<LogWriter> {
        let write_err = |path: &Path, source| LodeError::LogWrite {
            path: path.to_path_buf(),
            source,
        };

        let writer = self
            .writer
            .take()
            .ok_or_else(|| LodeError::Storage("compactor already committed".to_string()))?;
        let file = writer
            .into_inner()
            .map_err(|e| write_err(&self.temp_path, e.into_error()))?;
        file.sync_all().map_err(|e| write_err(&self.temp_path, e))?;
        drop(file);

        fs::rename(&self.temp_path, &self.path).map_err(|e| write_err(&self.path, e))?;
        self.committed = true;

        let writer = LogWriter::open(&self.path)?;
        sync_parent_dir(&self.path)?;
        Ok(writer)
    }
}

impl Drop for LogCompactor {
    fn drop(&mut self) {
        if !self.committed {
            drop(self.writer.take());
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

/// Persist the rename itself
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };
        File::open(dir)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}
