//! Tests for Engine
//!
//! These tests verify:
//! - Basic get/put/delete operations
//! - Atomic write batches, live and after replay
//! - Merge operator semantics, operand-only logging and merge timeouts
//! - Prefix scans across MemTable and SSTables
//! - Flush to SSTable and crash recovery from WAL
//! - Concurrent access patterns

use std::fs::OpenOptions;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use jupiter_index::adapter::append_posting;
use jupiter_index::config::{Config, WalSyncStrategy};
use jupiter_index::engine::Engine;
use jupiter_index::wal::Operation;
use jupiter_index::IndexError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn config_for(dir: &std::path::Path) -> Config {
    Config::builder()
        .data_dir(dir)
        .wal_sync_strategy(WalSyncStrategy::EveryWrite) // Sync every write for test reliability
        .memtable_size_limit(1024 * 1024) // 1 MB
        .build()
}

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open_with_merge_operator(config_for(temp_dir.path()), append_posting)
        .unwrap();
    (temp_dir, engine)
}

fn put(key: &str, value: &str) -> Operation {
    Operation::Put {
        key: key.as_bytes().to_vec(),
        value: value.as_bytes().to_vec(),
    }
}

static SLOW_MERGE_STARTED: AtomicBool = AtomicBool::new(false);

/// Holds the writer lock for 300ms per merge
fn slow_append(key: &[u8], existing: Option<&[u8]>, operand: &[u8]) -> Vec<u8> {
    SLOW_MERGE_STARTED.store(true, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(300));
    append_posting(key, existing, operand)
}

fn stalled_append(key: &[u8], existing: Option<&[u8]>, operand: &[u8]) -> Vec<u8> {
    thread::sleep(Duration::from_millis(100));
    append_posting(key, existing, operand)
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_engine_open_creates_layout() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("index");

    let engine = Engine::open(config_for(&data_dir)).unwrap();

    assert!(data_dir.join("sstables").is_dir());
    assert!(data_dir.join("wal.log").exists());
    assert_eq!(engine.data_dir(), data_dir.as_path());
    assert_eq!(engine.storage_dir(), data_dir.join("sstables").as_path());
}

#[test]
fn test_engine_put_get_delete() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"hello", b"world").unwrap();
    assert_eq!(engine.get(b"hello").unwrap(), Some(b"world".to_vec()));

    engine.put(b"hello", b"again").unwrap();
    assert_eq!(engine.get(b"hello").unwrap(), Some(b"again".to_vec()));

    engine.delete(b"hello").unwrap();
    assert_eq!(engine.get(b"hello").unwrap(), None);
    assert_eq!(engine.get(b"missing").unwrap(), None);
}

#[test]
fn test_engine_binary_keys_and_values() {
    let (_temp, engine) = setup_temp_engine();
    let key = vec![0x00, 0xFF, 0x3A];
    let value = vec![0xDE, 0xAD, 0x00, 0xBE, 0xEF];

    engine.put(&key, &value).unwrap();
    engine.flush().unwrap();

    assert_eq!(engine.get(&key).unwrap(), Some(value));
}

// =============================================================================
// Write Batch Tests
// =============================================================================

#[test]
fn test_write_batch_applies_all() {
    let (_temp, engine) = setup_temp_engine();
    engine.put(b"pending:1", b"[]").unwrap();

    engine
        .write_batch(vec![
            put("doc:1", "{}"),
            put("doc:2", "{}"),
            Operation::Delete {
                key: b"pending:1".to_vec(),
            },
        ])
        .unwrap();

    assert_eq!(engine.get(b"doc:1").unwrap(), Some(b"{}".to_vec()));
    assert_eq!(engine.get(b"doc:2").unwrap(), Some(b"{}".to_vec()));
    assert_eq!(engine.get(b"pending:1").unwrap(), None);
}

#[test]
fn test_write_batch_empty_is_noop() {
    let (temp, engine) = setup_temp_engine();

    engine.write_batch(Vec::new()).unwrap();

    let wal_len = std::fs::metadata(temp.path().join("wal.log")).unwrap().len();
    assert_eq!(wal_len, 0);
}

#[test]
fn test_write_batch_replayed_after_crash() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = Engine::open(config_for(temp_dir.path())).unwrap();
        engine
            .write_batch(vec![put("a", "1"), put("b", "2"), put("c", "3")])
            .unwrap();
        drop(engine); // Crash: no flush
    }

    let engine = Engine::open(config_for(temp_dir.path())).unwrap();
    assert_eq!(engine.get(b"a").unwrap(), Some(b"1".to_vec()));
    assert_eq!(engine.get(b"b").unwrap(), Some(b"2".to_vec()));
    assert_eq!(engine.get(b"c").unwrap(), Some(b"3".to_vec()));
}

#[test]
fn test_torn_batch_is_discarded_whole() {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("wal.log");
    {
        let engine = Engine::open(config_for(temp_dir.path())).unwrap();
        engine.put(b"before", b"kept").unwrap();
        engine
            .write_batch(vec![put("a", "1"), put("b", "2"), put("c", "3")])
            .unwrap();
        drop(engine);
    }

    // Cut the batch frame short, as a crash mid-write would
    let len = std::fs::metadata(&wal_path).unwrap().len();
    let file = OpenOptions::new().write(true).open(&wal_path).unwrap();
    file.set_len(len - 3).unwrap();
    drop(file);

    let engine = Engine::open(config_for(temp_dir.path())).unwrap();
    assert_eq!(engine.get(b"before").unwrap(), Some(b"kept".to_vec()));
    assert_eq!(engine.get(b"a").unwrap(), None);
    assert_eq!(engine.get(b"b").unwrap(), None);
    assert_eq!(engine.get(b"c").unwrap(), None);
}

// =============================================================================
// Merge Tests
// =============================================================================

#[test]
fn test_merge_creates_then_appends() {
    let (_temp, engine) = setup_temp_engine();
    let timeout = Duration::from_millis(100);

    engine.merge(b"tok:rust", b"id1", timeout).unwrap();
    assert_eq!(engine.get(b"tok:rust").unwrap(), Some(b"id1".to_vec()));

    engine.merge(b"tok:rust", b"id2", timeout).unwrap();
    engine.merge(b"tok:rust", b"id3", timeout).unwrap();
    assert_eq!(engine.get(b"tok:rust").unwrap(), Some(b"id1:id2:id3".to_vec()));
}

#[test]
fn test_merge_sees_flushed_value() {
    let (_temp, engine) = setup_temp_engine();
    let timeout = Duration::from_millis(100);

    engine.merge(b"tok:web", b"x", timeout).unwrap();
    engine.flush().unwrap();
    engine.merge(b"tok:web", b"y", timeout).unwrap();

    assert_eq!(engine.get(b"tok:web").unwrap(), Some(b"x:y".to_vec()));
}

#[test]
fn test_merge_replayed_after_crash() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine =
            Engine::open_with_merge_operator(config_for(temp_dir.path()), append_posting).unwrap();
        engine.put(b"tok:a", b"0").unwrap();
        engine.flush().unwrap();
        engine.merge(b"tok:a", b"1", Duration::from_millis(100)).unwrap();
        engine.merge(b"tok:a", b"2", Duration::from_millis(100)).unwrap();
        // Dropped without close
    }

    let engine =
        Engine::open_with_merge_operator(config_for(temp_dir.path()), append_posting).unwrap();
    assert_eq!(engine.get(b"tok:a").unwrap(), Some(b"0:1:2".to_vec()));
}

#[test]
fn test_logged_merge_needs_operator_on_open() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine =
            Engine::open_with_merge_operator(config_for(temp_dir.path()), append_posting).unwrap();
        engine.merge(b"tok:a", b"1", Duration::from_millis(100)).unwrap();
    }

    let result = Engine::open(config_for(temp_dir.path()));
    assert!(matches!(result, Err(IndexError::Storage(_))));

    // The failed open left the log alone
    let engine =
        Engine::open_with_merge_operator(config_for(temp_dir.path()), append_posting).unwrap();
    assert_eq!(engine.get(b"tok:a").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_merge_logs_only_operand() {
    let (_temp, engine) = setup_temp_engine();
    let operand = [b'i'; 36];

    for _ in 0..1_000 {
        engine
            .merge(b"tok:hot", &operand, Duration::from_secs(1))
            .unwrap();
    }

    let list = engine.get(b"tok:hot").unwrap().unwrap();
    assert_eq!(list.len(), 1_000 * 37 - 1);
    // Frame header, key, operand and a little bincode framing per merge
    assert!(engine.wal_size() < 1_000 * 128);
}

#[test]
fn test_batch_with_merge() {
    let (_temp, engine) = setup_temp_engine();
    engine.put(b"tok:a", b"x").unwrap();

    engine
        .write_batch(vec![
            put("doc:1", "{}"),
            Operation::Merge {
                key: b"tok:a".to_vec(),
                operand: b"y".to_vec(),
            },
        ])
        .unwrap();

    assert_eq!(engine.get(b"tok:a").unwrap(), Some(b"x:y".to_vec()));
    assert_eq!(engine.get(b"doc:1").unwrap(), Some(b"{}".to_vec()));
}

#[test]
fn test_batch_with_merge_without_operator_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(config_for(temp_dir.path())).unwrap();

    let result = engine.write_batch(vec![
        put("doc:1", "{}"),
        Operation::Merge {
            key: b"tok:a".to_vec(),
            operand: b"y".to_vec(),
        },
    ]);

    assert!(matches!(result, Err(IndexError::Storage(_))));
    assert_eq!(engine.get(b"doc:1").unwrap(), None);
    assert_eq!(engine.wal_size(), 0);
}

#[test]
fn test_merge_without_operator_fails() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(config_for(temp_dir.path())).unwrap();

    let result = engine.merge(b"tok:a", b"1", Duration::from_millis(10));
    assert!(matches!(result, Err(IndexError::Storage(_))));
}

#[test]
fn test_slow_merge_times_out_and_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let engine =
        Engine::open_with_merge_operator(config_for(temp_dir.path()), stalled_append).unwrap();

    let result = engine.merge(b"tok:slow", b"a", Duration::from_millis(20));
    match result {
        Err(IndexError::MergeTimeout { key, timeout_ms }) => {
            assert_eq!(key, "tok:slow");
            assert_eq!(timeout_ms, 20);
        }
        other => panic!("expected MergeTimeout, got {:?}", other),
    }

    assert_eq!(engine.get(b"tok:slow").unwrap(), None);
    assert_eq!(engine.wal_size(), 0);
}

#[test]
fn test_merge_queued_behind_writer_does_not_time_out() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Arc::new(
        Engine::open_with_merge_operator(config_for(temp_dir.path()), slow_append).unwrap(),
    );

    let first = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.merge(b"tok:first", b"a", Duration::from_secs(5)))
    };

    while !SLOW_MERGE_STARTED.load(Ordering::SeqCst) {
        thread::yield_now();
    }

    // Waits ~300ms for the writer, then spends ~300ms of its own
    engine
        .merge(b"tok:second", b"b", Duration::from_millis(450))
        .unwrap();

    first.join().unwrap().unwrap();
    assert_eq!(engine.get(b"tok:first").unwrap(), Some(b"a".to_vec()));
    assert_eq!(engine.get(b"tok:second").unwrap(), Some(b"b".to_vec()));
}

#[test]
fn test_concurrent_merges_lose_nothing() {
    let (_temp, engine) = setup_temp_engine();
    let engine = Arc::new(engine);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for j in 0..25 {
                    let operand = format!("t{}n{}", t, j);
                    engine
                        .merge(b"tok:hot", operand.as_bytes(), Duration::from_secs(10))
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let list = engine.get(b"tok:hot").unwrap().unwrap();
    assert_eq!(list.split(|b| *b == b':').count(), 200);
}

// =============================================================================
// Prefix Scan Tests
// =============================================================================

#[test]
fn test_scan_prefix_merges_memtable_and_sstables() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"pending:a", b"1").unwrap();
    engine.put(b"pending:b", b"2").unwrap();
    engine.put(b"doc:a", b"{}").unwrap();
    engine.flush().unwrap();

    engine.delete(b"pending:a").unwrap();
    engine.put(b"pending:c", b"3").unwrap();
    engine.put(b"pending:b", b"22").unwrap();

    let scanned = engine.scan_prefix(b"pending:").unwrap();

    assert_eq!(
        scanned,
        vec![
            (b"pending:b".to_vec(), b"22".to_vec()),
            (b"pending:c".to_vec(), b"3".to_vec()),
        ]
    );
}

#[test]
fn test_scan_prefix_empty() {
    let (_temp, engine) = setup_temp_engine();
    engine.put(b"doc:a", b"{}").unwrap();

    assert!(engine.scan_prefix(b"pending:").unwrap().is_empty());
}

// =============================================================================
// Flush Tests
// =============================================================================

#[test]
fn test_engine_manual_flush() {
    let (temp, engine) = setup_temp_engine();
    engine.put(b"key", b"value").unwrap();
    assert_eq!(engine.memtable_entry_count(), 1);

    engine.flush().unwrap();

    assert_eq!(engine.memtable_entry_count(), 0);
    assert_eq!(engine.memtable_size(), 0);
    assert_eq!(engine.sstable_count(), 1);
    assert_eq!(engine.get(b"key").unwrap(), Some(b"value".to_vec()));

    // Flushed entries no longer need the log
    let wal_len = std::fs::metadata(temp.path().join("wal.log")).unwrap().len();
    assert_eq!(wal_len, 0);
}

#[test]
fn test_engine_flush_empty_memtable_is_noop() {
    let (_temp, engine) = setup_temp_engine();

    engine.flush().unwrap();

    assert_eq!(engine.sstable_count(), 0);
}

#[test]
fn test_engine_flushes_when_wal_reaches_limit() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .memtable_size_limit(64 * 1024 * 1024)
        .wal_size_limit(4096)
        .build();
    let engine = Engine::open_with_merge_operator(config, append_posting).unwrap();

    for i in 0..200 {
        let operand = format!("{:04}", i);
        engine
            .merge(b"tok:hot", operand.as_bytes(), Duration::from_secs(1))
            .unwrap();
    }

    // The memtable holds one small key; only the WAL limit can trigger this
    assert!(engine.sstable_count() >= 1);
    assert!(engine.wal_size() < 4096);

    let list = engine.get(b"tok:hot").unwrap().unwrap();
    assert_eq!(list.split(|b| *b == b':').count(), 200);
}

#[test]
fn test_engine_auto_flush_on_size_limit() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .wal_sync_strategy(WalSyncStrategy::EveryWrite)
        .memtable_size_limit(100) // Very small to trigger flushes
        .build();
    let engine = Engine::open(config).unwrap();

    for i in 0..20 {
        engine
            .put(format!("key{:02}", i).as_bytes(), &[b'v'; 20])
            .unwrap();
    }

    assert!(engine.sstable_count() > 0);
    for i in 0..20 {
        let value = engine.get(format!("key{:02}", i).as_bytes()).unwrap();
        assert_eq!(value, Some(vec![b'v'; 20]));
    }
}

// =============================================================================
// Crash Recovery Tests
// =============================================================================

#[test]
fn test_engine_recovery_from_wal() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = Engine::open(config_for(temp_dir.path())).unwrap();
        engine.put(b"key1", b"value1").unwrap();
        engine.put(b"key2", b"value2").unwrap();
        engine.delete(b"key1").unwrap();
        drop(engine); // Crash: no flush
    }

    let engine = Engine::open(config_for(temp_dir.path())).unwrap();

    // Recovered entries are flushed straight to an SSTable
    assert_eq!(engine.sstable_count(), 1);
    assert_eq!(engine.memtable_entry_count(), 0);
    assert_eq!(engine.get(b"key1").unwrap(), None);
    assert_eq!(engine.get(b"key2").unwrap(), Some(b"value2".to_vec()));
}

#[test]
fn test_engine_repeated_recovery_keeps_data() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = Engine::open(config_for(temp_dir.path())).unwrap();
        engine.put(b"key", b"value").unwrap();
    }
    {
        let engine = Engine::open(config_for(temp_dir.path())).unwrap();
        assert_eq!(engine.get(b"key").unwrap(), Some(b"value".to_vec()));
    }

    let engine = Engine::open(config_for(temp_dir.path())).unwrap();
    assert_eq!(engine.get(b"key").unwrap(), Some(b"value".to_vec()));
    assert_eq!(engine.sstable_count(), 1);
}

#[test]
fn test_engine_close_flushes_data() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = Engine::open(config_for(temp_dir.path())).unwrap();
        engine.put(b"key", b"value").unwrap();
        engine.close().unwrap();
    }

    let engine = Engine::open_path(temp_dir.path()).unwrap();
    assert_eq!(engine.get(b"key").unwrap(), Some(b"value".to_vec()));
    assert_eq!(engine.sstable_count(), 1);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_engine_concurrent_readers_and_writer() {
    let (_temp, engine) = setup_temp_engine();
    let engine = Arc::new(engine);
    for i in 0..50 {
        engine
            .put(format!("key{:02}", i).as_bytes(), b"stable")
            .unwrap();
    }

    let writer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for i in 0..50 {
                engine
                    .put(format!("new{:02}", i).as_bytes(), b"fresh")
                    .unwrap();
                if i % 10 == 0 {
                    engine.flush().unwrap();
                }
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..50 {
                    let value = engine.get(format!("key{:02}", i).as_bytes()).unwrap();
                    assert_eq!(value, Some(b"stable".to_vec()));
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(engine.scan_prefix(b"new").unwrap().len(), 50);
}
