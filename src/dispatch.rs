//! Request routing and handlers
//!
//! A request names a log family with its `type` parameter. The method and the
//! presence of a few selector parameters (`id`, `info`, `lock`, `unlock`) pick
//! the operation. Each handler validates its parameters in a fixed order and
//! stops at the first failure, before touching any store.

use std::sync::Arc;
use std::time::{Duration, Instant};
use serde::{Serialize, Deserialize};
use tracing::{debug, info, warn};

use crate::bucket::{BucketId, BucketIndexLog, MemoryBucketIndex};
use crate::config::LogConfig;
use crate::cursor::Cursor;
use crate::error::{Result, Error};
use crate::family::LogFamily;
use crate::lease::LeaseManager;
use crate::lister::PaginatedLister;
use crate::metrics::MetricsCollector;
use crate::params::{self, Params};
use crate::response::{EntrySink, JsonResponse, RenderedResponse};
use crate::shard::{MemoryLogStore, ShardId, ShardInfo, ShardKey, ShardLogStore, StoreError};
use crate::time::{parse_date_str, Clock, SystemClock, TimeRange};

/// Request method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    /// Read entries, shard info or the shard count
    Get,
    /// Trim entries
    Delete,
    /// Take or release a lease
    Post,
}

/// An incoming log request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRequest {
    /// Request method
    pub method: Method,
    /// Request parameters
    pub params: Params,
}

impl LogRequest {
    /// Create a new request
    pub fn new(method: Method, params: Params) -> Self {
        Self { method, params }
    }

    /// Create a GET request
    pub fn get(params: Params) -> Self {
        Self::new(Method::Get, params)
    }

    /// Create a DELETE request
    pub fn delete(params: Params) -> Self {
        Self::new(Method::Delete, params)
    }

    /// Create a POST request
    pub fn post(params: Params) -> Self {
        Self::new(Method::Post, params)
    }
}

/// Operations on a log family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogOp {
    /// Paginated list
    List,
    /// Marker and last update time of one shard
    Info,
    /// Number of shards in the family
    Count,
    /// Trim
    Delete,
    /// Take a shard lease
    Lock,
    /// Release a shard lease
    Unlock,
}

/// A routed request: which family, which operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handler {
    /// Target log family
    pub family: LogFamily,
    /// Operation to run
    pub op: LogOp,
}

/// Result of a successful request
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Entries were emitted to the sink
    Listed {
        /// Entries emitted
        count: usize,
        /// Cursor for the next call
        marker: Cursor,
        /// More entries remain
        truncated: bool,
    },
    /// Configured shard count of the family
    ShardCount(u32),
    /// Summary of one shard
    Info(ShardInfo),
    /// Trim, lock or unlock completed
    Done,
}

#[derive(Debug, Clone, Copy)]
enum Selector {
    Always,
    Has(&'static [&'static str]),
}

impl Selector {
    fn matches(&self, params: &Params) -> bool {
        match self {
            Self::Always => true,
            Self::Has(keys) => keys.iter().all(|key| params.exists(key)),
        }
    }
}

/// Routing table. For each method and family the first matching row wins.
///
/// The `id` + `info` rows sit above the plain `id` rows, so a GET carrying
/// both selectors returns shard info and never lists.
const ROUTES: &[(Method, LogFamily, Selector, LogOp)] = &[
    // info takes precedence over list
    (Method::Get, LogFamily::Metadata, Selector::Has(&["id", "info"]), LogOp::Info),
    (Method::Get, LogFamily::Metadata, Selector::Has(&["id"]), LogOp::List),
    (Method::Get, LogFamily::Metadata, Selector::Always, LogOp::Count),
    (Method::Get, LogFamily::BucketIndex, Selector::Always, LogOp::List),
    (Method::Get, LogFamily::Data, Selector::Has(&["id", "info"]), LogOp::Info),
    (Method::Get, LogFamily::Data, Selector::Has(&["id"]), LogOp::List),
    (Method::Get, LogFamily::Data, Selector::Always, LogOp::Count),
    (Method::Delete, LogFamily::Metadata, Selector::Always, LogOp::Delete),
    (Method::Delete, LogFamily::BucketIndex, Selector::Always, LogOp::Delete),
    (Method::Delete, LogFamily::Data, Selector::Always, LogOp::Delete),
    (Method::Post, LogFamily::Metadata, Selector::Has(&["lock"]), LogOp::Lock),
    (Method::Post, LogFamily::Metadata, Selector::Has(&["unlock"]), LogOp::Unlock),
    (Method::Post, LogFamily::Data, Selector::Has(&["lock"]), LogOp::Lock),
    (Method::Post, LogFamily::Data, Selector::Has(&["unlock"]), LogOp::Unlock),
];

/// Pick the handler for a request, `None` if nothing applies
pub fn route(request: &LogRequest) -> Option<Handler> {
    if !request.params.exists("type") {
        return None;
    }
    let family = LogFamily::from_str(request.params.get("type")).ok()?;

    ROUTES
        .iter()
        .find(|(method, fam, selector, _)| {
            *method == request.method && *fam == family && selector.matches(&request.params)
        })
        .map(|&(_, family, _, op)| Handler { family, op })
}

/// Front end for log access: routes requests and runs their handlers
pub struct LogDispatcher {
    config: LogConfig,
    metadata: Arc<dyn ShardLogStore>,
    data: Arc<dyn ShardLogStore>,
    bucket_index: Arc<dyn BucketIndexLog>,
    leases: LeaseManager,
    lister: PaginatedLister,
    metrics: Arc<MetricsCollector>,
}

impl LogDispatcher {
    /// Create a dispatcher over the three log stores
    pub fn new(
        config: LogConfig,
        metadata: Arc<dyn ShardLogStore>,
        data: Arc<dyn ShardLogStore>,
        bucket_index: Arc<dyn BucketIndexLog>,
    ) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(MetricsCollector::with_enabled(config.collect_metrics));

        let dispatcher = Self {
            leases: LeaseManager::new(Arc::new(SystemClock), metrics.clone()),
            lister: PaginatedLister::new(metrics.clone()),
            config,
            metadata,
            data,
            bucket_index,
            metrics,
        };

        for family in LogFamily::all().into_iter().filter(LogFamily::is_shard_indexed) {
            let configured = dispatcher.config.shard_count(family).unwrap_or_default();
            let store_shards = dispatcher.store(family)?.num_shards();
            if store_shards != configured {
                warn!(%family, configured, store_shards, "configured shard count differs from store");
            }
        }

        Ok(dispatcher)
    }

    /// Create a dispatcher over in-memory stores laid out as `config` describes
    pub fn in_memory(config: LogConfig) -> Result<Self> {
        config.validate()?;
        let metadata = MemoryLogStore::from_config(&config, LogFamily::Metadata)?;
        let data = MemoryLogStore::from_config(&config, LogFamily::Data)?;
        let bucket_index = MemoryBucketIndex::from_config(&config);

        Self::new(config, Arc::new(metadata), Arc::new(data), Arc::new(bucket_index))
    }

    /// Use `clock` for lease expiry. Existing leases are dropped.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.leases = LeaseManager::new(clock, self.metrics.clone());
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Get the lease table
    pub fn leases(&self) -> &LeaseManager {
        &self.leases
    }

    /// Get the metrics collector
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Metrics report, if metrics collection is enabled
    pub fn metrics_report(&self) -> Option<String> {
        self.config.collect_metrics.then(|| self.metrics.get_report())
    }

    /// Route and run a request, emitting listed entries to `sink`
    pub fn handle(&self, request: &LogRequest, sink: &mut dyn EntrySink) -> Result<Outcome> {
        let handler = route(request).ok_or_else(|| {
            debug!(method = ?request.method, log_type = request.params.get("type"), "no handler for request");
            Error::not_found("No handler for request")
        })?;

        let result = self.execute(handler, &request.params, sink);

        if let Err(err) = &result {
            if err.is_invalid_argument() {
                self.metrics.record_invalid_request();
            }
            debug!(family = %handler.family, op = ?handler.op, status = err.status(), error = %err, "request failed");
        }

        result
    }

    /// Route and run a request, rendering the JSON response
    pub fn handle_json(&self, request: &LogRequest) -> RenderedResponse {
        let mut response = JsonResponse::new();
        let result = self.handle(request, &mut response);
        response.finish(&result)
    }

    fn execute(&self, handler: Handler, params: &Params, sink: &mut dyn EntrySink) -> Result<Outcome> {
        match (handler.family, handler.op) {
            (LogFamily::BucketIndex, LogOp::List) => self.list_bucket_index(params, sink),
            (LogFamily::BucketIndex, LogOp::Delete) => self.trim_bucket_index(params),
            (family, LogOp::List) => self.list_shard(family, params, sink),
            (family, LogOp::Info) => self.shard_info(family, params),
            (family, LogOp::Count) => self.shard_count(family),
            (family, LogOp::Delete) => self.trim_shard(family, params),
            (family, LogOp::Lock) => self.lock(family, params),
            (family, LogOp::Unlock) => self.unlock(family, params),
        }
    }

    fn store(&self, family: LogFamily) -> Result<&dyn ShardLogStore> {
        match family {
            LogFamily::Metadata => Ok(self.metadata.as_ref()),
            LogFamily::Data => Ok(self.data.as_ref()),
            LogFamily::BucketIndex => Err(Error::not_found("bucket-index log is not shard-indexed")),
        }
    }

    /// Key for a lease on one of the configured shards of `family`
    fn lease_key(&self, family: LogFamily, shard_id: ShardId) -> Result<ShardKey> {
        if !family.supports_leases() {
            return Err(Error::not_found(format!("{} log does not support leases", family)));
        }

        let num_shards = self.config.shard_count(family).unwrap_or_default();
        if shard_id >= num_shards {
            debug!(%family, shard_id, num_shards, "lease on shard out of range");
            return Err(Error::invalid_argument(format!(
                "Shard {} out of range ({} log has {} shards)",
                shard_id, family, num_shards
            )));
        }

        Ok(ShardKey::new(family, shard_id))
    }

    fn store_failed(&self, err: StoreError) -> Error {
        self.metrics.record_store_failure();
        warn!(code = err.code(), error = %err, "log store failure");
        Error::Store(err)
    }

    fn list_shard(&self, family: LogFamily, params: &Params, sink: &mut dyn EntrySink) -> Result<Outcome> {
        let store = self.store(family)?;

        let shard_id = params::parse_shard_id(params.get("id"))?;
        let start = parse_date_str(params.get("start-time"))?;
        let end = parse_date_str(params.get("end-time"))?;
        let max_entries = params::parse_max_entries(params.get("max-entries"), self.config.default_max_entries)?;
        let range = TimeRange::new(start, end);
        let cursor = Cursor::after(params.get("marker"));

        let page = self.lister.list(store, shard_id, &range, cursor, max_entries)?;

        // Entries only become visible once every read has succeeded
        for entry in &page.entries {
            sink.emit(entry)?;
        }

        Ok(Outcome::Listed {
            count: page.entries.len(),
            marker: page.next_cursor,
            truncated: page.truncated,
        })
    }

    fn shard_info(&self, family: LogFamily, params: &Params) -> Result<Outcome> {
        let store = self.store(family)?;
        let shard_id = params::parse_shard_id(params.get("id"))?;

        self.metrics.increment_info_queries();
        let info = store.shard_info(shard_id).map_err(|e| self.store_failed(e))?;

        Ok(Outcome::Info(info))
    }

    fn shard_count(&self, family: LogFamily) -> Result<Outcome> {
        self.metrics.increment_info_queries();
        self.config
            .shard_count(family)
            .map(Outcome::ShardCount)
            .ok_or_else(|| Error::not_found(format!("{} log is not shard-indexed", family)))
    }

    fn trim_shard(&self, family: LogFamily, params: &Params) -> Result<Outcome> {
        let store = self.store(family)?;

        let shard_id = params::parse_shard_id(params.get("id"))?;
        let (start_time, end_time) = (params.get("start-time"), params.get("end-time"));
        if start_time.is_empty() || end_time.is_empty() {
            return Err(Error::invalid_argument("Trim requires start-time and end-time"));
        }
        let range = TimeRange::parse_explicit(start_time, end_time)?;

        let start = Instant::now();
        self.metrics.increment_trims();
        let removed = store.trim(shard_id, &range).map_err(|e| self.store_failed(e))?;
        self.metrics.add_entries_trimmed(removed);
        self.metrics.record_trim_duration(start.elapsed());

        info!(%family, shard_id, %range, removed, "trimmed shard");
        Ok(Outcome::Done)
    }

    fn lock(&self, family: LogFamily, params: &Params) -> Result<Outcome> {
        if let Some(missing) = params.first_missing(&["id", "length", "locker-id", "zone-id"]) {
            debug!(param = missing, "invalid parameter list for lock");
            return Err(Error::invalid_argument(format!("Missing parameter: {}", missing)));
        }

        let shard_id = params::parse_shard_id(params.get("id"))?;
        let length = params::parse_positive("length", params.get("length"))?;
        let key = self.lease_key(family, shard_id)?;

        self.leases.acquire(
            key,
            params.get("zone-id"),
            params.get("locker-id"),
            Duration::from_secs(length),
        )?;

        Ok(Outcome::Done)
    }

    fn unlock(&self, family: LogFamily, params: &Params) -> Result<Outcome> {
        if let Some(missing) = params.first_missing(&["id", "locker-id", "zone-id"]) {
            debug!(param = missing, "invalid parameter list for unlock");
            return Err(Error::invalid_argument(format!("Missing parameter: {}", missing)));
        }

        let shard_id = params::parse_shard_id(params.get("id"))?;
        let key = self.lease_key(family, shard_id)?;

        self.leases.release(
            key,
            params.get("zone-id"),
            params.get("locker-id"),
        )?;

        Ok(Outcome::Done)
    }

    fn resolve_bucket(&self, name: &str) -> Result<BucketId> {
        self.bucket_index.resolve_bucket(name).map_err(|e| {
            debug!(bucket = name, "could not resolve bucket");
            self.store_failed(e)
        })
    }

    fn list_bucket_index(&self, params: &Params, sink: &mut dyn EntrySink) -> Result<Outcome> {
        let bucket_name = params.get("bucket");
        if bucket_name.is_empty() {
            return Err(Error::invalid_argument("Bucket not specified"));
        }

        let bucket = self.resolve_bucket(bucket_name)?;
        let max_entries = params::max_entries_or_default(params.get("max-entries"), self.config.default_max_entries);
        let marker = Cursor::after(params.get("marker"));

        let summary = self
            .lister
            .list_streaming(self.bucket_index.as_ref(), &bucket, marker, max_entries, sink)?;

        Ok(Outcome::Listed {
            count: summary.count,
            marker: summary.marker,
            truncated: summary.truncated,
        })
    }

    fn trim_bucket_index(&self, params: &Params) -> Result<Outcome> {
        if let Some(missing) = params.first_missing(&["bucket", "start-marker", "end-marker"]) {
            debug!(param = missing, "bucket, start-marker and end-marker are mandatory");
            return Err(Error::invalid_argument(format!("Missing parameter: {}", missing)));
        }

        let bucket = self.resolve_bucket(params.get("bucket"))?;
        let (start_marker, end_marker) = (params.get("start-marker"), params.get("end-marker"));

        let start = Instant::now();
        self.metrics.increment_trims();
        let removed = self
            .bucket_index
            .trim(&bucket, start_marker, end_marker)
            .map_err(|e| self.store_failed(e))?;
        self.metrics.add_entries_trimmed(removed);
        self.metrics.record_trim_duration(start.elapsed());

        info!(bucket = %bucket.name, start_marker, end_marker, removed, "trimmed bucket index log");
        Ok(Outcome::Done)
    }
}
