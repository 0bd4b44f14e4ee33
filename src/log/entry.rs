//! Log entry definitions
//!
//! Defines the structure of a single index log line.

use serde::{Deserialize, Serialize};

use crate::error::{LodeError, Result};
use crate::page::{PageId, Record};

/// A single line of the index log: the record stored under `key`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub key: String,

    /// Value length in bytes
    pub size: u64,

    /// Pages holding the value, in order
    pub pages: Vec<PageId>,

    /// Checksum of key, size and pages; absent on lines written without one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crc: Option<u32>,
}

impl LogEntry {
    /// Build the line for `record` stored under `key`
    pub fn new(key: &str, record: &Record) -> Self {
        Self {
            key: key.to_string(),
            size: record.size,
            pages: record.pages.clone(),
            crc: Some(Self::compute_crc(key, record.size, &record.pages)),
        }
    }

    pub fn compute_crc(key: &str, size: u64, pages: &[PageId]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&(key.len() as u64).to_le_bytes());
        hasher.update(key.as_bytes());
        hasher.update(&size.to_le_bytes());
        for page in pages {
            hasher.update(&page.to_le_bytes());
        }
        hasher.finalize()
    }

    /// True if there is no checksum or it matches the fields
    pub fn verify(&self) -> bool {
        match self.crc {
            Some(crc) => crc == Self::compute_crc(&self.key, self.size, &self.pages),
            None => true,
        }
    }

    pub fn record(&self) -> Record {
        Record::new(self.size, self.pages.clone())
    }

    pub fn into_parts(self) -> (String, Record) {
        (self.key, Record::new(self.size, self.pages))
    }

    /// Serialize as one JSON line, newline included
    pub fn to_line(&self) -> Result<String> {
        let mut line =
            serde_json::to_string(self).map_err(|e| LodeError::Serialization(e.to_string()))?;
        line.push('\n');
        Ok(line)
    }

    /// Parse one line (without its newline)
    ///
    /// Tries the JSON form first, then the legacy `key size p0 p1 ...` form.
    /// The error is a human-readable reason covering both attempts.
    pub fn parse(line: &str) -> std::result::Result<Self, String> {
        match serde_json::from_str::<LogEntry>(line) {
            Ok(entry) if entry.verify() => Ok(entry),
            Ok(entry) => Err(format!("checksum mismatch for key {:?}", entry.key)),
            Err(json_err) => Self::parse_legacy(line)
                .map_err(|legacy_err| format!("{}; legacy form: {}", json_err, legacy_err)),
        }
    }

    fn parse_legacy(line: &str) -> std::result::Result<Self, String> {
        let mut parts = line.split(' ');
        let key = parts.next().unwrap_or_default();

        let mut numbers = Vec::new();
        for part in parts {
            let n = part
                .parse::<u64>()
                .map_err(|e| format!("bad number {:?}: {}", part, e))?;
            numbers.push(n);
        }

        let (&size, pages) = numbers
            .split_first()
            .ok_or_else(|| "missing size".to_string())?;

        Ok(Self {
            key: key.to_string(),
            size,
            pages: pages.to_vec(),
            crc: None,
        })
    }
}
