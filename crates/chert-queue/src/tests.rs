//! Scenario tests for the queue overlay.

use chert_store::{Store, StoreOptions};

use crate::{Queue, QueueError};

fn temp_path(dir: &tempfile::TempDir) -> std::path::PathBuf {
    dir.path().join("queue.db")
}

#[test]
fn items_come_out_in_put_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut queue = Queue::open(temp_path(&dir), StoreOptions::default()).unwrap();

    queue.put(b"first").unwrap();
    queue.put(b"second").unwrap();
    queue.put(b"third").unwrap();
    assert_eq!(queue.len(), 3);

    assert_eq!(queue.take().unwrap().as_deref(), Some(&b"first"[..]));
    assert_eq!(queue.take().unwrap().as_deref(), Some(&b"second"[..]));
    assert_eq!(queue.take().unwrap().as_deref(), Some(&b"third"[..]));
    assert_eq!(queue.take().unwrap(), None);
    assert!(queue.is_empty());
}

#[test]
fn peek_does_not_remove() {
    let dir = tempfile::tempdir().unwrap();
    let mut queue = Queue::open(temp_path(&dir), StoreOptions::default()).unwrap();

    assert_eq!(queue.peek().unwrap(), None);
    queue.put(b"only").unwrap();

    assert_eq!(queue.peek().unwrap().as_deref(), Some(&b"only"[..]));
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.take().unwrap().as_deref(), Some(&b"only"[..]));
}

#[test]
fn put_returns_monotonic_counters() {
    let dir = tempfile::tempdir().unwrap();
    let mut queue = Queue::open(temp_path(&dir), StoreOptions::default()).unwrap();

    let a = queue.put(b"a").unwrap();
    let b = queue.put(b"b").unwrap();
    let c = queue.put(b"c").unwrap();
    assert!(a < b && b < c);
}

#[test]
fn batch_put_interleaves_with_takes() {
    let dir = tempfile::tempdir().unwrap();
    let mut queue = Queue::open(temp_path(&dir), StoreOptions::default()).unwrap();

    queue.put_batch(&[b"a", b"b", b"c"]).unwrap();
    assert_eq!(queue.take().unwrap().as_deref(), Some(&b"a"[..]));
    queue.put_batch(&[b"d"]).unwrap();
    assert_eq!(queue.take().unwrap().as_deref(), Some(&b"b"[..]));
    assert_eq!(queue.take().unwrap().as_deref(), Some(&b"c"[..]));
    assert_eq!(queue.take().unwrap().as_deref(), Some(&b"d"[..]));
}

#[test]
fn stats_track_queue_traffic() {
    let dir = tempfile::tempdir().unwrap();
    let mut queue = Queue::open(temp_path(&dir), StoreOptions::default()).unwrap();

    queue.put_batch(&[b"a", b"b", b"c"]).unwrap();
    queue.take().unwrap();

    let stats = queue.stats();
    assert_eq!(stats.total_put_count, 3);
    assert_eq!(stats.total_take_count, 1);
    assert_eq!(stats.current_size, 2);
    assert_eq!(stats.high_water_mark, 3);
    assert_eq!(stats.next_counter, 4);
}

#[test]
fn queue_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = temp_path(&dir);

    let mut queue = Queue::open(&path, StoreOptions::default()).unwrap();
    queue.put_batch(&[b"a", b"b", b"c"]).unwrap();
    assert_eq!(queue.take().unwrap().as_deref(), Some(&b"a"[..]));
    queue.close().unwrap();
    assert!(queue.is_closed());
    drop(queue);

    let mut reopened = Queue::open(&path, StoreOptions::default()).unwrap();
    assert_eq!(reopened.len(), 2);
    let stats = reopened.stats();
    assert_eq!(stats.total_put_count, 3);
    assert_eq!(stats.total_take_count, 1);
    assert_eq!(reopened.take().unwrap().as_deref(), Some(&b"b"[..]));
    assert_eq!(reopened.take().unwrap().as_deref(), Some(&b"c"[..]));
}

#[test]
fn recovery_reconciles_items_written_before_genesis() {
    let dir = tempfile::tempdir().unwrap();
    let path = temp_path(&dir);

    let mut queue = Queue::open(&path, StoreOptions::default()).unwrap();
    queue.put_batch(&[b"a", b"b"]).unwrap();
    queue.close().unwrap();
    drop(queue);

    // Simulate a crash between an item write and the genesis rewrite by
    // inserting an item record the genesis does not account for
    let opts = StoreOptions {
        max_key_length: 16,
        ..StoreOptions::default()
    };
    let mut store = Store::open(&path, opts).unwrap();
    store.insert(&3u128.to_be_bytes(), b"orphan").unwrap();
    store.close().unwrap();
    drop(store);

    let mut reopened = Queue::open(&path, StoreOptions::default()).unwrap();
    assert_eq!(reopened.len(), 3);
    assert_eq!(reopened.stats().next_counter, 4);
    assert_eq!(reopened.stats().current_size, 3);

    // The orphan takes its place in counter order, and fresh puts continue
    // past it
    let d = reopened.put(b"d").unwrap();
    assert_eq!(d, 4);
    assert_eq!(reopened.take().unwrap().as_deref(), Some(&b"a"[..]));
    assert_eq!(reopened.take().unwrap().as_deref(), Some(&b"b"[..]));
    assert_eq!(reopened.take().unwrap().as_deref(), Some(&b"orphan"[..]));
    assert_eq!(reopened.take().unwrap().as_deref(), Some(&b"d"[..]));
}

#[test]
fn foreign_keys_fail_the_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = temp_path(&dir);

    let mut queue = Queue::open(&path, StoreOptions::default()).unwrap();
    queue.put(b"legit").unwrap();
    queue.close().unwrap();
    drop(queue);

    let opts = StoreOptions {
        max_key_length: 16,
        ..StoreOptions::default()
    };
    let mut store = Store::open(&path, opts).unwrap();
    store.insert(b"stray", b"not a counter").unwrap();
    store.close().unwrap();
    drop(store);

    let err = Queue::open(&path, StoreOptions::default()).unwrap_err();
    assert!(matches!(err, QueueError::ForeignKey { len: 5 }));
}

#[test]
fn read_only_open_requires_a_genesis() {
    let dir = tempfile::tempdir().unwrap();
    let path = temp_path(&dir);

    // A bare store with no genesis record
    let opts = StoreOptions {
        max_key_length: 16,
        ..StoreOptions::default()
    };
    let mut store = Store::open(&path, opts).unwrap();
    store.close().unwrap();
    drop(store);

    let err = Queue::open(&path, StoreOptions::read_only()).unwrap_err();
    assert!(matches!(err, QueueError::MissingGenesis));
}

#[test]
fn read_only_queue_can_peek() {
    let dir = tempfile::tempdir().unwrap();
    let path = temp_path(&dir);

    let mut queue = Queue::open(&path, StoreOptions::default()).unwrap();
    queue.put(b"visible").unwrap();
    queue.close().unwrap();
    drop(queue);

    let mut ro = Queue::open(&path, StoreOptions::read_only()).unwrap();
    assert_eq!(ro.len(), 1);
    assert_eq!(ro.peek().unwrap().as_deref(), Some(&b"visible"[..]));
}
