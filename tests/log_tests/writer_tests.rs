//! Tests for the Log Writer and Compactor
//!
//! These tests verify:
//! - Opening creates the file; reopening appends
//! - One line per append, length tracking
//! - Truncation and newline repair
//! - Leftovers of a failed append never get glued to the next line
//! - Compaction replaces the log atomically and cleans up its temp file

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use lodekv::log::{LogCompactor, LogEntry, LogReader, LogWriter};
use lodekv::page::Record;
use lodekv::LodeError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_log() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("index.log");
    (temp_dir, log_path)
}

fn entry(key: &str, page: u64) -> LogEntry {
    LogEntry::new(key, &Record::new(1, vec![page]))
}

fn read_lines(path: &PathBuf) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_creates_file() {
    let (_temp, log_path) = setup_temp_log();

    let writer = LogWriter::open(&log_path).unwrap();

    assert!(log_path.exists());
    assert_eq!(writer.len(), 0);
    assert!(writer.is_empty());
    assert_eq!(writer.path(), log_path.as_path());
}

#[test]
fn test_reopen_appends() {
    let (_temp, log_path) = setup_temp_log();

    {
        let mut writer = LogWriter::open(&log_path).unwrap();
        writer.append(&entry("a", 0)).unwrap();
    }
    let mut writer = LogWriter::open(&log_path).unwrap();
    assert!(writer.len() > 0);
    writer.append(&entry("b", 1)).unwrap();

    let lines = read_lines(&log_path);
    assert_eq!(lines.len(), 2);
    assert_eq!(LogEntry::parse(&lines[0]).unwrap().key, "a");
    assert_eq!(LogEntry::parse(&lines[1]).unwrap().key, "b");
}

// =============================================================================
// Append Tests
// =============================================================================

#[test]
fn test_append_tracks_length() {
    let (_temp, log_path) = setup_temp_log();
    let mut writer = LogWriter::open(&log_path).unwrap();
    let e = entry("key", 3);

    writer.append(&e).unwrap();
    writer.append(&e).unwrap();

    let expected = 2 * e.to_line().unwrap().len() as u64;
    assert_eq!(writer.len(), expected);
    assert_eq!(fs::metadata(&log_path).unwrap().len(), expected);
}

#[test]
fn test_sync() {
    let (_temp, log_path) = setup_temp_log();
    let mut writer = LogWriter::open(&log_path).unwrap();
    writer.append(&entry("key", 0)).unwrap();

    writer.sync().unwrap();
}

// =============================================================================
// Repair Tests
// =============================================================================

#[test]
fn test_truncate() {
    let (_temp, log_path) = setup_temp_log();
    let mut writer = LogWriter::open(&log_path).unwrap();
    writer.append(&entry("a", 0)).unwrap();
    let keep = writer.len();
    writer.append(&entry("b", 1)).unwrap();

    writer.truncate(keep).unwrap();
    writer.append(&entry("c", 2)).unwrap();

    let keys: Vec<_> = read_lines(&log_path)
        .iter()
        .map(|l| LogEntry::parse(l).unwrap().key)
        .collect();
    assert_eq!(keys, vec!["a", "c"]);
}

#[test]
fn test_ensure_trailing_newline_repairs_last_line() {
    let (_temp, log_path) = setup_temp_log();
    let line = entry("a", 0).to_line().unwrap();
    fs::write(&log_path, line.trim_end()).unwrap();

    let mut writer = LogWriter::open(&log_path).unwrap();
    writer.ensure_trailing_newline().unwrap();
    writer.append(&entry("b", 1)).unwrap();

    let lines = read_lines(&log_path);
    assert_eq!(lines.len(), 2);
    assert!(LogEntry::parse(&lines[0]).is_ok());
    assert!(LogEntry::parse(&lines[1]).is_ok());
}

#[test]
fn test_ensure_trailing_newline_is_noop_when_terminated() {
    let (_temp, log_path) = setup_temp_log();
    let mut writer = LogWriter::open(&log_path).unwrap();
    writer.append(&entry("a", 0)).unwrap();
    let before = writer.len();

    writer.ensure_trailing_newline().unwrap();

    assert_eq!(writer.len(), before);
}

#[test]
fn test_ensure_trailing_newline_empty_file() {
    let (_temp, log_path) = setup_temp_log();
    let mut writer = LogWriter::open(&log_path).unwrap();

    writer.ensure_trailing_newline().unwrap();

    assert_eq!(writer.len(), 0);
}

#[test]
fn test_append_cuts_leftover_partial_line() {
    let (_temp, log_path) = setup_temp_log();
    let mut writer = LogWriter::open(&log_path).unwrap();
    writer.append(&entry("a", 0)).unwrap();
    let good = writer.len();

    // What a failed write whose rollback also failed leaves behind
    {
        let mut file = fs::OpenOptions::new().append(true).open(&log_path).unwrap();
        file.write_all(b"{\"key\":\"x").unwrap();
    }

    writer.append(&entry("b", 1)).unwrap();
    writer.append(&entry("c", 2)).unwrap();

    let entries: Vec<LogEntry> = LogReader::open(&log_path)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    let keys: Vec<_> = entries.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["a", "b", "c"]);
    assert_eq!(
        fs::metadata(&log_path).unwrap().len(),
        good + 2 * entry("b", 1).to_line().unwrap().len() as u64
    );
}

#[cfg(target_os = "linux")]
#[test]
fn test_failed_append_reports_error_and_keeps_length() {
    // Every write to /dev/full fails with ENOSPC
    let full = Path::new("/dev/full");
    if !full.exists() {
        return;
    }
    let mut writer = LogWriter::open(full).unwrap();

    let result = writer.append(&entry("a", 0));

    assert!(matches!(result, Err(LodeError::LogWrite { .. })));
    assert_eq!(writer.len(), 0);
}

// =============================================================================
// Compaction Tests
// =============================================================================

#[test]
fn test_compactor_replaces_log() {
    let (_temp, log_path) = setup_temp_log();
    {
        let mut writer = LogWriter::open(&log_path).unwrap();
        for page in 0..10 {
            writer.append(&entry("same", page)).unwrap();
        }
    }
    let before = fs::metadata(&log_path).unwrap().len();

    let mut compactor = LogCompactor::create(&log_path).unwrap();
    compactor.push(&entry("same", 9)).unwrap();
    assert_eq!(compactor.entries(), 1);
    let writer = compactor.commit().unwrap();

    let lines = read_lines(&log_path);
    assert_eq!(lines.len(), 1);
    assert_eq!(LogEntry::parse(&lines[0]).unwrap().pages, vec![9]);
    assert!(writer.len() < before);
    assert!(!LogCompactor::temp_path(&log_path).exists());
}

#[test]
fn test_committed_writer_appends_to_new_log() {
    let (_temp, log_path) = setup_temp_log();
    LogWriter::open(&log_path).unwrap();

    let mut compactor = LogCompactor::create(&log_path).unwrap();
    compactor.push(&entry("a", 0)).unwrap();
    let mut writer = compactor.commit().unwrap();
    writer.append(&entry("b", 1)).unwrap();

    assert_eq!(read_lines(&log_path).len(), 2);
}

#[test]
fn test_abandoned_compactor_leaves_log_untouched() {
    let (_temp, log_path) = setup_temp_log();
    {
        let mut writer = LogWriter::open(&log_path).unwrap();
        writer.append(&entry("a", 0)).unwrap();
    }
    let before = fs::read(&log_path).unwrap();

    {
        let mut compactor = LogCompactor::create(&log_path).unwrap();
        compactor.push(&entry("b", 1)).unwrap();
        assert!(LogCompactor::temp_path(&log_path).exists());
    }

    assert_eq!(fs::read(&log_path).unwrap(), before);
    assert!(!LogCompactor::temp_path(&log_path).exists());
}

#[test]
fn test_compactor_discards_stale_temp_file() {
    let (_temp, log_path) = setup_temp_log();
    fs::write(LogCompactor::temp_path(&log_path), "garbage from an earlier crash\n").unwrap();

    let mut compactor = LogCompactor::create(&log_path).unwrap();
    compactor.push(&entry("a", 0)).unwrap();
    compactor.commit().unwrap();

    let lines = read_lines(&log_path);
    assert_eq!(lines.len(), 1);
    assert!(LogEntry::parse(&lines[0]).is_ok());
}

#[test]
fn test_failed_commit_removes_temp_file() {
    let (_temp, log_path) = setup_temp_log();
    // A non-empty directory can't be renamed over
    fs::create_dir(&log_path).unwrap();
    fs::write(log_path.join("blocker"), b"x").unwrap();

    let mut compactor = LogCompactor::create(&log_path).unwrap();
    compactor.push(&entry("a", 0)).unwrap();
    let result = compactor.commit();

    assert!(matches!(result, Err(LodeError::LogWrite { .. })));
    assert!(log_path.is_dir());
    assert!(!LogCompactor::temp_path(&log_path).exists());
}

#[test]
fn test_temp_path_name() {
    let temp_path = LogCompactor::temp_path(&PathBuf::from("/tmp/db/index.log"));

    assert_eq!(temp_path, PathBuf::from("/tmp/db/index.log~"));
}
