use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

use shardlog_rs::shard::ShardResult;
use shardlog_rs::{
    BucketId, BucketIndexLog, Cursor, FileLogStore, ListBatch, LogConfig, LogDispatcher, LogEntry,
    LogRequest, ManualClock, MemoryBucketIndex, MemoryLogStore, MetricsCollector, Outcome,
    PaginatedLister, Params, ShardId, ShardInfo, ShardLogStore, StoreError, TimeRange,
};

const SHARDS: u32 = 4;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()
}

fn params(pairs: &[(&str, &str)]) -> Params {
    pairs.iter().copied().collect()
}

fn config() -> LogConfig {
    LogConfig::new()
        .with_metadata_log_shards(SHARDS)
        .with_data_log_shards(SHARDS)
}

fn dispatcher_over(
    metadata: Arc<dyn ShardLogStore>,
    bucket_index: Arc<dyn BucketIndexLog>,
) -> LogDispatcher {
    let data = Arc::new(MemoryLogStore::new(SHARDS));
    LogDispatcher::new(config(), metadata, data, bucket_index).unwrap()
}

fn fill(store: &dyn ShardLogStore, shard_id: ShardId, count: usize) {
    for i in 0..count {
        store
            .append(shard_id, t0() + Duration::seconds(i as i64), json!({ "seq": i }))
            .unwrap();
    }
}

/// Page through a metadata shard via the dispatcher, returning every page
fn paginate(dispatcher: &LogDispatcher, shard: &str, max_entries: usize) -> Vec<Vec<LogEntry>> {
    let mut pages = Vec::new();
    let mut marker = Cursor::Beginning;
    let max = max_entries.to_string();

    loop {
        let mut sink: Vec<LogEntry> = Vec::new();
        let request = LogRequest::get(params(&[
            ("type", "metadata"),
            ("id", shard),
            ("max-entries", max.as_str()),
            ("marker", marker.as_marker()),
        ]));

        let (count, next, truncated) = match dispatcher.handle(&request, &mut sink).unwrap() {
            Outcome::Listed { count, marker, truncated } => (count, marker, truncated),
            other => panic!("list returned {:?}", other),
        };
        assert_eq!(count, sink.len());
        pages.push(sink);

        if !truncated {
            return pages;
        }
        marker = next;
    }
}

#[test]
fn pagination_yields_every_entry_once() {
    for total in [0usize, 1, 1000, 2500] {
        for max_entries in [1usize, 500, 1000] {
            let store = Arc::new(MemoryLogStore::with_batch_limit(SHARDS, 300));
            fill(store.as_ref(), 1, total);
            let dispatcher = dispatcher_over(store, Arc::new(MemoryBucketIndex::new()));

            let pages = paginate(&dispatcher, "1", max_entries);
            assert!(pages.iter().all(|page| page.len() <= max_entries));

            let seen: Vec<_> = pages.into_iter().flatten().map(|e| e.payload["seq"].as_u64().unwrap()).collect();
            let expected: Vec<_> = (0..total as u64).collect();
            assert_eq!(seen, expected, "total={} max_entries={}", total, max_entries);
        }
    }
}

#[test]
fn list_defaults_to_one_thousand_entries() {
    let store = Arc::new(MemoryLogStore::with_batch_limit(SHARDS, 128));
    fill(store.as_ref(), 0, 1500);
    let dispatcher = dispatcher_over(store, Arc::new(MemoryBucketIndex::new()));

    let mut sink: Vec<LogEntry> = Vec::new();
    let outcome = dispatcher
        .handle(&LogRequest::get(params(&[("type", "metadata"), ("id", "0")])), &mut sink)
        .unwrap();

    assert_eq!(sink.len(), 1000);
    assert!(matches!(outcome, Outcome::Listed { truncated: true, .. }));
}

#[test]
fn list_respects_time_range() {
    let store = Arc::new(MemoryLogStore::new(SHARDS));
    fill(store.as_ref(), 2, 100);
    let dispatcher = dispatcher_over(store, Arc::new(MemoryBucketIndex::new()));

    let start = (t0() + Duration::seconds(10)).timestamp().to_string();
    let end = (t0() + Duration::seconds(20)).to_rfc3339();
    let rendered = dispatcher.handle_json(&LogRequest::get(params(&[
        ("type", "metadata"),
        ("id", "2"),
        ("start-time", start.as_str()),
        ("end-time", end.as_str()),
    ])));

    let body = rendered.json().unwrap();
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 10);
    assert_eq!(entries[0]["payload"]["seq"], 10);
    assert_eq!(entries[9]["payload"]["seq"], 19);
}

proptest! {
    #[test]
    fn paginated_lister_is_complete_and_capped(
        total in 0usize..300,
        max_entries in 1usize..60,
        batch_limit in 1usize..40,
    ) {
        let store = MemoryLogStore::with_batch_limit(1, batch_limit);
        fill(&store, 0, total);
        let lister = PaginatedLister::new(Arc::new(MetricsCollector::new()));

        let mut cursor = Cursor::Beginning;
        let mut seen = Vec::new();
        loop {
            let page = lister.list(&store, 0, &TimeRange::unbounded(), cursor, max_entries).unwrap();
            prop_assert!(page.entries.len() <= max_entries);
            if page.truncated {
                prop_assert_eq!(page.entries.len(), max_entries);
            }
            seen.extend(page.entries.iter().map(|e| e.id.clone()));
            if !page.truncated {
                break;
            }
            cursor = page.next_cursor;
        }

        let mut expected = Vec::new();
        let mut all = lister.list(&store, 0, &TimeRange::unbounded(), Cursor::Beginning, usize::MAX).unwrap();
        expected.append(&mut all.entries);
        let expected: Vec<_> = expected.into_iter().map(|e| e.id).collect();

        prop_assert_eq!(seen.len(), total);
        prop_assert_eq!(seen, expected);
    }
}

#[test_log::test]
fn lease_excludes_until_expiry() {
    let clock = Arc::new(ManualClock::new(t0()));
    let dispatcher = dispatcher_over(Arc::new(MemoryLogStore::new(SHARDS)), Arc::new(MemoryBucketIndex::new()))
        .with_clock(clock.clone());

    let lock = |zone: &str, locker: &str| {
        LogRequest::post(params(&[
            ("type", "metadata"),
            ("lock", ""),
            ("id", "3"),
            ("length", "60"),
            ("zone-id", zone),
            ("locker-id", locker),
        ]))
    };

    assert!(dispatcher.handle_json(&lock("zone-a", "locker-a")).is_success());

    let busy = dispatcher.handle_json(&lock("zone-b", "locker-b"));
    assert_eq!(busy.status, -16);
    assert_eq!(busy.http_status, 409);

    clock.advance(Duration::seconds(60));
    assert!(dispatcher.handle_json(&lock("zone-b", "locker-b")).is_success());

    assert_eq!(dispatcher.metrics().get_locks_granted(), 2);
    assert_eq!(dispatcher.metrics().get_lock_conflicts(), 1);
}

#[test]
fn lease_release_requires_owner() {
    let dispatcher = dispatcher_over(Arc::new(MemoryLogStore::new(SHARDS)), Arc::new(MemoryBucketIndex::new()));

    let request = |op: &str, zone: &str| {
        let mut pairs = vec![
            ("type", "data"),
            (op, ""),
            ("id", "1"),
            ("zone-id", zone),
            ("locker-id", "worker"),
        ];
        if op == "lock" {
            pairs.push(("length", "300"));
        }
        LogRequest::post(params(&pairs))
    };

    assert!(dispatcher.handle_json(&request("lock", "zone-a")).is_success());

    let rejected = dispatcher.handle_json(&request("unlock", "zone-b"));
    assert_eq!(rejected.status, -1);
    assert_eq!(rejected.http_status, 403);

    assert!(dispatcher.handle_json(&request("unlock", "zone-a")).is_success());
    assert!(dispatcher.handle_json(&request("lock", "zone-b")).is_success());

    // Leases on one family do not affect the other
    let metadata_lock = LogRequest::post(params(&[
        ("type", "metadata"),
        ("lock", ""),
        ("id", "1"),
        ("length", "300"),
        ("zone-id", "zone-c"),
        ("locker-id", "worker"),
    ]));
    assert!(dispatcher.handle_json(&metadata_lock).is_success());
}

#[test]
fn trim_is_idempotent_on_disk() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(FileLogStore::open(dir.path(), SHARDS)?);
    fill(store.as_ref(), 0, 50);
    let dispatcher = dispatcher_over(store.clone(), Arc::new(MemoryBucketIndex::new()));

    let start = t0().to_rfc3339();
    let end = (t0() + Duration::seconds(20)).to_rfc3339();
    let trim = LogRequest::delete(params(&[
        ("type", "metadata"),
        ("id", "0"),
        ("start-time", start.as_str()),
        ("end-time", end.as_str()),
    ]));

    assert!(dispatcher.handle_json(&trim).is_success());
    assert!(dispatcher.handle_json(&trim).is_success());
    assert_eq!(dispatcher.metrics().get_entries_trimmed(), 20);
    assert_eq!(store.shard_info(0)?.entry_count, 30);

    drop(dispatcher);
    drop(store);
    let reopened = FileLogStore::open(dir.path(), SHARDS)?;
    assert_eq!(reopened.shard_info(0)?.entry_count, 30);
    Ok(())
}

#[test]
fn random_trims_leave_other_entries_listable() {
    let store = Arc::new(MemoryLogStore::with_batch_limit(SHARDS, 17));
    fill(store.as_ref(), 3, 400);
    let dispatcher = dispatcher_over(store.clone(), Arc::new(MemoryBucketIndex::new()));

    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut remaining: Vec<u64> = (0..400).collect();

    for _ in 0..25 {
        let from = rng.gen_range(0..400i64);
        let to = rng.gen_range(from..=400);
        let range = TimeRange::between(t0() + Duration::seconds(from), t0() + Duration::seconds(to));

        let removed = store.trim(3, &range).unwrap();
        let before = remaining.len();
        remaining.retain(|seq| (*seq as i64) < from || (*seq as i64) >= to);
        assert_eq!(removed, before - remaining.len());
    }

    let seen: Vec<u64> = paginate(&dispatcher, "3", 64)
        .into_iter()
        .flatten()
        .map(|e| e.payload["seq"].as_u64().unwrap())
        .collect();
    assert_eq!(seen, remaining);
}

#[test]
fn validation_reports_first_failure_only() {
    let store = Arc::new(CountingStore::new(MemoryLogStore::new(SHARDS)));
    let dispatcher = dispatcher_over(store.clone(), Arc::new(MemoryBucketIndex::new()));

    let request = LogRequest::get(params(&[
        ("type", "metadata"),
        ("id", "not-a-shard"),
        ("start-time", "not-a-date"),
    ]));
    let err = dispatcher.handle(&request, &mut Vec::new()).unwrap_err();
    assert!(err.is_invalid_argument());
    assert!(err.to_string().contains("not-a-shard"));
    assert!(!err.to_string().contains("not-a-date"));

    let request = LogRequest::delete(params(&[
        ("type", "metadata"),
        ("id", "1"),
        ("start-time", "not-a-date"),
    ]));
    let err = dispatcher.handle(&request, &mut Vec::new()).unwrap_err();
    assert!(err.to_string().contains("start-time and end-time"));

    // Nothing reached the store
    assert_eq!(store.list_calls(), 0);
}

#[test_log::test]
fn bucket_index_streams_entries_before_failure() {
    let index = MemoryBucketIndex::with_batch_limit(2);
    index.create_bucket("photos");
    for i in 0..10 {
        index.append("photos", t0(), json!({ "key": i })).unwrap();
    }
    let index = Arc::new(FailingBucketIndex { inner: index, calls: AtomicUsize::new(0), fail_on: 3 });
    let dispatcher = dispatcher_over(Arc::new(MemoryLogStore::new(SHARDS)), index);

    let rendered = dispatcher.handle_json(&LogRequest::get(params(&[("type", "bucket-index"), ("bucket", "photos")])));

    assert_eq!(rendered.status, -5);
    assert_eq!(rendered.http_status, 500);
    let body = rendered.json().unwrap();
    assert_eq!(body["entries"].as_array().unwrap().len(), 4);
}

#[test_log::test]
fn shard_list_failure_yields_no_entries() {
    let store = CountingStore::new(MemoryLogStore::with_batch_limit(SHARDS, 2)).failing_from(3);
    fill(&store, 0, 10);
    let dispatcher = dispatcher_over(Arc::new(store), Arc::new(MemoryBucketIndex::new()));

    let mut sink: Vec<LogEntry> = Vec::new();
    let err = dispatcher
        .handle(&LogRequest::get(params(&[("type", "metadata"), ("id", "0")])), &mut sink)
        .unwrap_err();
    assert_eq!(err.status(), -5);
    assert!(sink.is_empty());

    let rendered = dispatcher.handle_json(&LogRequest::get(params(&[("type", "metadata"), ("id", "0")])));
    assert_eq!(rendered.http_status, 500);
    assert!(rendered.body.is_empty());
}

/// Store wrapper that counts list calls and can fail every call from the nth on
struct CountingStore {
    inner: MemoryLogStore,
    calls: AtomicUsize,
    fail_from: Option<usize>,
}

impl CountingStore {
    fn new(inner: MemoryLogStore) -> Self {
        Self { inner, calls: AtomicUsize::new(0), fail_from: None }
    }

    fn failing_from(mut self, call: usize) -> Self {
        self.fail_from = Some(call);
        self
    }

    fn list_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ShardLogStore for CountingStore {
    fn num_shards(&self) -> u32 {
        self.inner.num_shards()
    }

    fn list(&self, shard_id: ShardId, range: &TimeRange, cursor: &Cursor, max_entries: usize) -> ShardResult<ListBatch> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_from.map_or(false, |first| call >= first) {
            return Err(StoreError::new(-5, "injected read failure"));
        }
        self.inner.list(shard_id, range, cursor, max_entries)
    }

    fn trim(&self, shard_id: ShardId, range: &TimeRange) -> ShardResult<usize> {
        self.inner.trim(shard_id, range)
    }

    fn append(&self, shard_id: ShardId, timestamp: DateTime<Utc>, payload: serde_json::Value) -> ShardResult<LogEntry> {
        self.inner.append(shard_id, timestamp, payload)
    }

    fn shard_info(&self, shard_id: ShardId) -> ShardResult<ShardInfo> {
        self.inner.shard_info(shard_id)
    }
}

/// Bucket index wrapper that fails the nth list call
struct FailingBucketIndex {
    inner: MemoryBucketIndex,
    calls: AtomicUsize,
    fail_on: usize,
}

impl BucketIndexLog for FailingBucketIndex {
    fn resolve_bucket(&self, name: &str) -> ShardResult<BucketId> {
        self.inner.resolve_bucket(name)
    }

    fn list(&self, bucket: &BucketId, marker: &Cursor, max_entries: usize) -> ShardResult<ListBatch> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on {
            return Err(StoreError::new(-5, "injected read failure"));
        }
        self.inner.list(bucket, marker, max_entries)
    }

    fn trim(&self, bucket: &BucketId, start_marker: &str, end_marker: &str) -> ShardResult<usize> {
        self.inner.trim(bucket, start_marker, end_marker)
    }
}
