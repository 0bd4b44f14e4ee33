//! Db Concurrency Tests
//!
//! Tests verify:
//! - Many threads storing and fetching the same keys never see torn values
//! - Readers run alongside writers
//! - A range running during stores stays ordered and can fetch what it visits
//! - Page accounting stays exact after concurrent overwrites

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use lodekv::Db;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_shared_db() -> (TempDir, Arc<Db>) {
    let temp_dir = TempDir::new().unwrap();
    let db = Db::open_path(temp_dir.path()).unwrap();
    (temp_dir, Arc::new(db))
}

/// 900 bytes cycling through the 26 characters from '0'
fn payload() -> Vec<u8> {
    (0..900).map(|i| b'0' + (i % 26) as u8).collect()
}

// =============================================================================
// Store / Fetch Tests
// =============================================================================

#[test]
fn test_concurrent_store_and_fetch_same_keys() {
    let (_temp, db) = setup_shared_db();
    let mut handles = vec![];

    // Every thread stores, then fetches and restores, the same 1000 keys
    for _ in 0..10 {
        let db = Arc::clone(&db);
        handles.push(thread::spawn(move || {
            let data = payload();
            for i in 0..1000 {
                db.store(&i.to_string(), &data).unwrap();
            }
            for i in 0..1000 {
                let key = i.to_string();
                assert_eq!(db.fetch(&key).unwrap(), Some(data.clone()));
                db.store(&key, &data).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(db.size(), 1000);
    // 900 bytes -> 4 pages per key
    assert_eq!(db.stats().used_pages(), 4000);
}

#[test]
fn test_concurrent_writers_distinct_keys() {
    let (_temp, db) = setup_shared_db();
    let mut handles = vec![];

    for t in 0..4 {
        let db = Arc::clone(&db);
        handles.push(thread::spawn(move || {
            for i in 0..200 {
                let key = format!("thread{}_key{}", t, i);
                let value = format!("thread{}_value{}", t, i);
                db.store(&key, value.as_bytes()).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(db.size(), 800);
    for t in 0..4 {
        for i in 0..200 {
            let key = format!("thread{}_key{}", t, i);
            let expected = format!("thread{}_value{}", t, i);
            assert_eq!(db.fetch(&key).unwrap(), Some(expected.into_bytes()));
        }
    }
}

#[test]
fn test_readers_see_whole_values_during_overwrites() {
    let (_temp, db) = setup_shared_db();
    let values: Vec<Vec<u8>> = (0..4u8).map(|v| vec![v; 300 + v as usize * 200]).collect();
    db.store("shared", &values[0]).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let writer = {
        let db = Arc::clone(&db);
        let done = Arc::clone(&done);
        let values = values.clone();
        thread::spawn(move || {
            for round in 0..500 {
                db.store("shared", &values[round % values.len()]).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let mut readers = vec![];
    for _ in 0..4 {
        let db = Arc::clone(&db);
        let done = Arc::clone(&done);
        let values = values.clone();
        readers.push(thread::spawn(move || {
            while !done.load(Ordering::SeqCst) {
                let value = db.fetch("shared").unwrap().unwrap();
                // Always exactly one of the stored values, never a mix
                assert!(values.contains(&value));
            }
        }));
    }

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
}

// =============================================================================
// Range Tests
// =============================================================================

#[test]
fn test_range_during_stores() {
    let (_temp, db) = setup_shared_db();
    for i in 0..200 {
        db.store(&format!("base-{:04}", i), b"base").unwrap();
    }

    let writer = {
        let db = Arc::clone(&db);
        thread::spawn(move || {
            for i in 0..1000 {
                db.store(&format!("new-{:04}", i), b"new").unwrap();
                db.store(&format!("base-{:04}", i % 200), b"rewritten").unwrap();
            }
        })
    };

    for _ in 0..10 {
        let mut keys: Vec<String> = Vec::new();
        db.range(|pair| {
            let value = pair.fetch()?;
            assert!(value == b"base" || value == b"new" || value == b"rewritten");
            keys.push(pair.key().to_string());
            Ok(ControlFlow::Continue(()))
        })
        .unwrap();

        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        // Keys are never removed, so every base key is always visited
        assert!(keys.iter().filter(|k| k.starts_with("base-")).count() == 200);
    }

    writer.join().unwrap();
    assert_eq!(db.size(), 1200);
}

#[test]
fn test_size_during_stores() {
    let (_temp, db) = setup_shared_db();

    let writer = {
        let db = Arc::clone(&db);
        thread::spawn(move || {
            for i in 0..500 {
                db.store(&format!("key-{}", i), b"v").unwrap();
            }
        })
    };

    let mut last = 0;
    while !writer.is_finished() {
        let size = db.size();
        assert!(size >= last);
        last = size;
    }

    writer.join().unwrap();
    assert_eq!(db.size(), 500);
}
