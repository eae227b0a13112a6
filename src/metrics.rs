use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Operation metrics for log access
#[derive(Debug)]
pub struct MetricsCollector {
    // Operation counts
    /// Number of top-level list calls
    list_count: AtomicUsize,
    /// Number of store reads issued by list calls
    list_batch_count: AtomicUsize,
    /// Number of trim calls
    trim_count: AtomicUsize,
    /// Number of shard count and shard info queries
    info_count: AtomicUsize,

    // Data metrics
    /// Entries returned to callers
    entries_listed: AtomicUsize,
    /// Entries removed by trims
    entries_trimmed: AtomicUsize,

    // Lease metrics
    /// Leases granted
    locks_granted: AtomicUsize,
    /// Lock attempts refused because the shard was held
    lock_conflicts: AtomicUsize,
    /// Leases released
    unlocks: AtomicUsize,
    /// Unlock attempts refused
    unlock_rejections: AtomicUsize,
    /// Stale leases reclaimed on access
    leases_expired: AtomicUsize,

    // Failure metrics
    /// Requests rejected during parameter validation
    invalid_requests: AtomicUsize,
    /// Failures reported by the log stores
    store_failures: AtomicUsize,

    // Timing metrics
    /// Total list duration in nanoseconds
    list_duration_ns: AtomicU64,
    /// Total trim duration in nanoseconds
    trim_duration_ns: AtomicU64,

    // Internal state
    /// Whether recording calls update the counters
    enabled: bool,
    /// Start time of the metrics collector
    start_time: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::with_enabled(true)
    }

    /// Create a collector that records only when `enabled` is set.
    ///
    /// A disabled collector ignores every recording call and reports zeros.
    pub fn with_enabled(enabled: bool) -> Self {
        Self {
            list_count: AtomicUsize::new(0),
            list_batch_count: AtomicUsize::new(0),
            trim_count: AtomicUsize::new(0),
            info_count: AtomicUsize::new(0),

            entries_listed: AtomicUsize::new(0),
            entries_trimmed: AtomicUsize::new(0),

            locks_granted: AtomicUsize::new(0),
            lock_conflicts: AtomicUsize::new(0),
            unlocks: AtomicUsize::new(0),
            unlock_rejections: AtomicUsize::new(0),
            leases_expired: AtomicUsize::new(0),

            invalid_requests: AtomicUsize::new(0),
            store_failures: AtomicUsize::new(0),

            list_duration_ns: AtomicU64::new(0),
            trim_duration_ns: AtomicU64::new(0),

            enabled,
            start_time: Instant::now(),
        }
    }

    /// Check if recording calls update the counters
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn add(&self, counter: &AtomicUsize, count: usize) {
        if self.enabled {
            counter.fetch_add(count, Ordering::Relaxed);
        }
    }

    fn add_duration(&self, counter: &AtomicU64, duration: Duration) {
        if self.enabled {
            counter.fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        }
    }

    // Operation counts

    /// Increment the list counter
    pub fn increment_lists(&self) {
        self.add(&self.list_count, 1);
    }

    /// Increment the store read counter
    pub fn increment_list_batches(&self) {
        self.add(&self.list_batch_count, 1);
    }

    /// Increment the trim counter
    pub fn increment_trims(&self) {
        self.add(&self.trim_count, 1);
    }

    /// Increment the info query counter
    pub fn increment_info_queries(&self) {
        self.add(&self.info_count, 1);
    }

    // Data metrics

    /// Add entries returned to a caller
    pub fn add_entries_listed(&self, count: usize) {
        self.add(&self.entries_listed, count);
    }

    /// Add entries removed by a trim
    pub fn add_entries_trimmed(&self, count: usize) {
        self.add(&self.entries_trimmed, count);
    }

    // Lease metrics

    /// Record a granted lease
    pub fn record_lock_granted(&self) {
        self.add(&self.locks_granted, 1);
    }

    /// Record a refused lock attempt
    pub fn record_lock_conflict(&self) {
        self.add(&self.lock_conflicts, 1);
    }

    /// Record a released lease
    pub fn record_unlock(&self) {
        self.add(&self.unlocks, 1);
    }

    /// Record a refused unlock attempt
    pub fn record_unlock_rejected(&self) {
        self.add(&self.unlock_rejections, 1);
    }

    /// Record a stale lease reclaimed on access
    pub fn record_lease_expired(&self) {
        self.add(&self.leases_expired, 1);
    }

    // Failure metrics

    /// Record a request rejected during validation
    pub fn record_invalid_request(&self) {
        self.add(&self.invalid_requests, 1);
    }

    /// Record a failure reported by a log store
    pub fn record_store_failure(&self) {
        self.add(&self.store_failures, 1);
    }

    // Timing metrics

    /// Record list duration
    pub fn record_list_duration(&self, duration: Duration) {
        self.add_duration(&self.list_duration_ns, duration);
    }

    /// Record trim duration
    pub fn record_trim_duration(&self, duration: Duration) {
        self.add_duration(&self.trim_duration_ns, duration);
    }

    // Getters

    /// Get the list count
    pub fn get_list_count(&self) -> usize {
        self.list_count.load(Ordering::Relaxed)
    }

    /// Get the store read count
    pub fn get_list_batch_count(&self) -> usize {
        self.list_batch_count.load(Ordering::Relaxed)
    }

    /// Get the trim count
    pub fn get_trim_count(&self) -> usize {
        self.trim_count.load(Ordering::Relaxed)
    }

    /// Get the info query count
    pub fn get_info_count(&self) -> usize {
        self.info_count.load(Ordering::Relaxed)
    }

    /// Get the number of entries returned to callers
    pub fn get_entries_listed(&self) -> usize {
        self.entries_listed.load(Ordering::Relaxed)
    }

    /// Get the number of entries removed by trims
    pub fn get_entries_trimmed(&self) -> usize {
        self.entries_trimmed.load(Ordering::Relaxed)
    }

    /// Get the number of granted leases
    pub fn get_locks_granted(&self) -> usize {
        self.locks_granted.load(Ordering::Relaxed)
    }

    /// Get the number of refused lock attempts
    pub fn get_lock_conflicts(&self) -> usize {
        self.lock_conflicts.load(Ordering::Relaxed)
    }

    /// Get the number of released leases
    pub fn get_unlocks(&self) -> usize {
        self.unlocks.load(Ordering::Relaxed)
    }

    /// Get the number of refused unlock attempts
    pub fn get_unlock_rejections(&self) -> usize {
        self.unlock_rejections.load(Ordering::Relaxed)
    }

    /// Get the number of stale leases reclaimed
    pub fn get_leases_expired(&self) -> usize {
        self.leases_expired.load(Ordering::Relaxed)
    }

    /// Get the number of requests rejected during validation
    pub fn get_invalid_requests(&self) -> usize {
        self.invalid_requests.load(Ordering::Relaxed)
    }

    /// Get the number of store failures
    pub fn get_store_failures(&self) -> usize {
        self.store_failures.load(Ordering::Relaxed)
    }

    /// Get the total list duration
    pub fn get_list_duration(&self) -> Duration {
        Duration::from_nanos(self.list_duration_ns.load(Ordering::Relaxed))
    }

    /// Get the total trim duration
    pub fn get_trim_duration(&self) -> Duration {
        Duration::from_nanos(self.trim_duration_ns.load(Ordering::Relaxed))
    }

    /// Get the average number of store reads per list call
    pub fn get_avg_batches_per_list(&self) -> f64 {
        let lists = self.get_list_count();
        if lists == 0 {
            return 0.0;
        }

        self.get_list_batch_count() as f64 / lists as f64
    }

    /// Get the uptime of the metrics collector
    pub fn get_uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.list_count.store(0, Ordering::Relaxed);
        self.list_batch_count.store(0, Ordering::Relaxed);
        self.trim_count.store(0, Ordering::Relaxed);
        self.info_count.store(0, Ordering::Relaxed);

        self.entries_listed.store(0, Ordering::Relaxed);
        self.entries_trimmed.store(0, Ordering::Relaxed);

        self.locks_granted.store(0, Ordering::Relaxed);
        self.lock_conflicts.store(0, Ordering::Relaxed);
        self.unlocks.store(0, Ordering::Relaxed);
        self.unlock_rejections.store(0, Ordering::Relaxed);
        self.leases_expired.store(0, Ordering::Relaxed);

        self.invalid_requests.store(0, Ordering::Relaxed);
        self.store_failures.store(0, Ordering::Relaxed);

        self.list_duration_ns.store(0, Ordering::Relaxed);
        self.trim_duration_ns.store(0, Ordering::Relaxed);
    }

    /// Get a report of all metrics
    pub fn get_report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Shard Log Metrics Report ===\n\n");

        report.push_str(&format!("Uptime: {:?}\n\n", self.get_uptime()));

        report.push_str("Operation Counts:\n");
        report.push_str(&format!("  Lists: {}\n", self.get_list_count()));
        report.push_str(&format!("  Store Reads: {}\n", self.get_list_batch_count()));
        report.push_str(&format!("  Trims: {}\n", self.get_trim_count()));
        report.push_str(&format!("  Info Queries: {}\n\n", self.get_info_count()));

        report.push_str("Data Metrics:\n");
        report.push_str(&format!("  Entries Listed: {}\n", self.get_entries_listed()));
        report.push_str(&format!("  Entries Trimmed: {}\n\n", self.get_entries_trimmed()));

        report.push_str("Lease Metrics:\n");
        report.push_str(&format!("  Granted: {}\n", self.get_locks_granted()));
        report.push_str(&format!("  Conflicts: {}\n", self.get_lock_conflicts()));
        report.push_str(&format!("  Released: {}\n", self.get_unlocks()));
        report.push_str(&format!("  Unlock Rejections: {}\n", self.get_unlock_rejections()));
        report.push_str(&format!("  Expired: {}\n\n", self.get_leases_expired()));

        report.push_str("Failures:\n");
        report.push_str(&format!("  Invalid Requests: {}\n", self.get_invalid_requests()));
        report.push_str(&format!("  Store Failures: {}\n\n", self.get_store_failures()));

        report.push_str("Performance Metrics:\n");
        if self.get_list_count() > 0 {
            let avg_list = self.get_list_duration().as_micros() / self.get_list_count() as u128;
            report.push_str(&format!("  Avg. List Time: {}µs\n", avg_list));
        }
        if self.get_trim_count() > 0 {
            let avg_trim = self.get_trim_duration().as_micros() / self.get_trim_count() as u128;
            report.push_str(&format!("  Avg. Trim Time: {}µs\n", avg_trim));
        }
        report.push_str(&format!("  Avg. Store Reads per List: {:.2}\n", self.get_avg_batches_per_list()));

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_metrics_basic_recording() {
        let metrics = MetricsCollector::new();

        metrics.increment_lists();
        metrics.increment_list_batches();
        metrics.increment_list_batches();
        metrics.increment_list_batches();
        metrics.add_entries_listed(250);
        metrics.increment_trims();
        metrics.add_entries_trimmed(40);

        assert_eq!(metrics.get_list_count(), 1);
        assert_eq!(metrics.get_list_batch_count(), 3);
        assert_eq!(metrics.get_entries_listed(), 250);
        assert_eq!(metrics.get_trim_count(), 1);
        assert_eq!(metrics.get_entries_trimmed(), 40);
        assert_eq!(metrics.get_avg_batches_per_list(), 3.0);
    }

    #[test]
    fn test_disabled_collector_records_nothing() {
        let metrics = MetricsCollector::with_enabled(false);
        assert!(!metrics.is_enabled());

        metrics.increment_lists();
        metrics.add_entries_listed(10);
        metrics.record_lock_granted();
        metrics.record_store_failure();
        metrics.record_trim_duration(Duration::from_millis(3));

        assert_eq!(metrics.get_list_count(), 0);
        assert_eq!(metrics.get_entries_listed(), 0);
        assert_eq!(metrics.get_locks_granted(), 0);
        assert_eq!(metrics.get_store_failures(), 0);
    }

    #[test]
    fn test_metrics_lease_recording() {
        let metrics = MetricsCollector::new();

        metrics.record_lock_granted();
        metrics.record_lock_conflict();
        metrics.record_lock_conflict();
        metrics.record_unlock();
        metrics.record_unlock_rejected();
        metrics.record_lease_expired();

        assert_eq!(metrics.get_locks_granted(), 1);
        assert_eq!(metrics.get_lock_conflicts(), 2);
        assert_eq!(metrics.get_unlocks(), 1);
        assert_eq!(metrics.get_unlock_rejections(), 1);
        assert_eq!(metrics.get_leases_expired(), 1);
    }

    #[test]
    fn test_metrics_timing_recording() {
        let metrics = MetricsCollector::new();

        let duration = Duration::from_millis(100);
        metrics.record_list_duration(duration);
        metrics.record_trim_duration(duration);

        assert_eq!(metrics.get_list_duration(), duration);
        assert_eq!(metrics.get_trim_duration(), duration);
    }

    #[test]
    fn test_metrics_report() {
        let metrics = MetricsCollector::new();

        metrics.increment_lists();
        metrics.record_list_duration(Duration::from_micros(500));
        metrics.record_invalid_request();

        let report = metrics.get_report();

        assert!(report.contains("Operation Counts:"));
        assert!(report.contains("Lease Metrics:"));
        assert!(report.contains("Invalid Requests: 1"));
        assert!(report.contains("Avg. List Time: 500µs"));
    }

    #[test]
    fn test_metrics_reset() {
        let metrics = MetricsCollector::new();

        metrics.increment_lists();
        metrics.record_store_failure();
        metrics.reset();

        assert_eq!(metrics.get_list_count(), 0);
        assert_eq!(metrics.get_store_failures(), 0);
    }

    #[test]
    fn test_metrics_thread_safety() {
        let metrics = Arc::new(MetricsCollector::new());

        let mut handles = Vec::new();
        for _ in 0..10 {
            let metrics_clone = metrics.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    metrics_clone.increment_lists();
                    metrics_clone.add_entries_listed(10);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.get_list_count(), 1000);
        assert_eq!(metrics.get_entries_listed(), 10000);
    }
}
