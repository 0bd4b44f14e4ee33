//! Log Reader
//!
//! Reads entries back from the index log, applying the torn-tail policy.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{LodeError, Result};

use super::LogEntry;

/// Reads entries from the index log in file order
pub struct LogReader {
    path: PathBuf,
    reader: BufReader<File>,
    /// Bytes consumed so far
    offset: u64,
    /// Lines consumed so far (1-based number of the last line read)
    line: usize,
    /// End of the last line that parsed
    valid_len: u64,
    /// Whether an unparsable final line was found
    torn_tail: bool,
}

impl LogReader {
    /// Open a log file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| LodeError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            offset: 0,
            line: 0,
            valid_len: 0,
            torn_tail: false,
        })
    }

    /// Read the next entry from the log
    ///
    /// Blank lines are skipped. Returns `Ok(None)` at end of file or after a
    /// torn final line, and `LogCorruption` for an unparsable line that has
    /// more entries after it.
    pub fn next_entry(&mut self) -> Result<Option<LogEntry>> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let n = self.reader.read_until(b'\n', &mut buf)?;
            if n == 0 {
                return Ok(None);
            }
            self.offset += n as u64;
            self.line += 1;

            let text = trim_line_end(&buf);
            if text.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let parsed = std::str::from_utf8(text)
                .map_err(|e| format!("invalid UTF-8: {}", e))
                .and_then(LogEntry::parse);

            match parsed {
                Ok(entry) => {
                    self.valid_len = self.offset;
                    return Ok(Some(entry));
                }
                Err(reason) if self.rest_is_blank()? => {
                    warn!(
                        path = %self.path.display(),
                        line = self.line,
                        reason = %reason,
                        "ignoring torn last log line"
                    );
                    self.torn_tail = true;
                    return Ok(None);
                }
                Err(reason) => {
                    return Err(LodeError::LogCorruption {
                        path: self.path.clone(),
                        line: self.line,
                        reason,
                    });
                }
            }
        }
    }

    /// Whether everything after the current position is whitespace
    fn rest_is_blank(&mut self) -> Result<bool> {
        let mut rest = Vec::new();
        self.reader.read_to_end(&mut rest)?;
        Ok(rest.iter().all(u8::is_ascii_whitespace))
    }

    /// Offset just past the last line that parsed
    pub fn valid_len(&self) -> u64 {
        self.valid_len
    }

    /// Whether reading stopped at an unparsable final line
    pub fn torn_tail(&self) -> bool {
        self.torn_tail
    }

    /// Number of the last line read (1-based)
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Iterator for LogReader {
    type Item = Result<LogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

fn trim_line_end(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}
