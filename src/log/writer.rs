//! Log Writer
//!
//! Appends entries to the index log.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{LodeError, Result};

use super::LogEntry;

/// Append-only handle on the index log
pub struct LogWriter {
    path: PathBuf,
    file: File,
    /// Current file length in bytes
    len: u64,
}

impl LogWriter {
    /// Open or create a log file for appending
    pub fn open(path: &Path) -> Result<Self> {
        let open_err = |source| LodeError::Open {
            path: path.to_path_buf(),
            source,
        };

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .map_err(open_err)?;
        let len = file.metadata().map_err(open_err)?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
        })
    }

    /// Append one entry as a single write
    ///
    /// On failure the file is cut back to its previous length so a partial
    /// line can't end up in the middle of the log. If that cut fails too, the
    /// next append retries it before writing anything.
    pub fn append(&mut self, entry: &LogEntry) -> Result<()> {
        let line = entry.to_line()?;
        self.repair()?;

        if let Err(source) = self.file.write_all(line.as_bytes()) {
            if let Err(e) = self.file.set_len(self.len) {
                warn!(
                    path = %self.path.display(),
                    len = self.len,
                    error = %e,
                    "can't cut back partial log line"
                );
            }
            return Err(LodeError::LogWrite {
                path: self.path.clone(),
                source,
            });
        }
        self.len += line.len() as u64;
        Ok(())
    }

    /// Drop anything past the last complete append
    ///
    /// Fails, and so blocks the append, while the leftover bytes can't be
    /// removed.
    fn repair(&mut self) -> Result<()> {
        let write_err = |source| LodeError::LogWrite {
            path: self.path.clone(),
            source,
        };

        let actual = self.file.metadata().map_err(write_err)?.len();
        if actual > self.len {
            warn!(
                path = %self.path.display(),
                expected = self.len,
                actual,
                "cutting stray bytes off the log"
            );
            self.file.set_len(self.len).map_err(write_err)?;
        }
        Ok(())
    }

    /// Force sync to disk
    pub fn sync(&self) -> Result<()> {
        self.file.sync_data().map_err(|source| LodeError::LogWrite {
            path: self.path.clone(),
            source,
        })
    }

    /// Cut the file to `len` bytes (drops a torn tail)
    pub fn truncate(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len).map_err(|source| LodeError::LogWrite {
            path: self.path.clone(),
            source,
        })?;
        self.len = len;
        Ok(())
    }

    /// Terminate a last line that lost its newline, so the next append
    /// starts on a fresh line
    pub fn ensure_trailing_newline(&mut self) -> Result<()> {
        if self.len == 0 {
            return Ok(());
        }

        let mut last = [0u8; 1];
        self.file.seek(SeekFrom::Start(self.len - 1))?;
        self.file.read_exact(&mut last)?;
        if last[0] != b'\n' {
            self.file
                .write_all(b"\n")
                .map_err(|source| LodeError::LogWrite {
                    path: self.path.clone(),
                    source,
                })?;
            self.len += 1;
        }
        Ok(())
    }

    /// Current length in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
