//! # shardlog
//!
//! Administrative access to the change logs that zones of a multi-site object
//! store use to stay in sync. Three log families are exposed:
//!
//! - the **metadata** log and the **data** log, each split into a fixed number
//!   of shards,
//! - the **bucket-index** log, kept per bucket.
//!
//! Peers page through a shard with opaque cursors, trim the ranges they have
//! consumed, and take short exclusive leases on a shard so that two zones do
//! not trim it at once.
//!
//! ```
//! use std::sync::Arc;
//! use shardlog_rs::{LogConfig, LogDispatcher, LogRequest, MemoryBucketIndex, MemoryLogStore, Params};
//!
//! let config = LogConfig::new().with_metadata_log_shards(4).with_data_log_shards(4);
//! let dispatcher = LogDispatcher::new(
//!     config,
//!     Arc::new(MemoryLogStore::new(4)),
//!     Arc::new(MemoryLogStore::new(4)),
//!     Arc::new(MemoryBucketIndex::new()),
//! ).unwrap();
//!
//! let count = dispatcher.handle_json(&LogRequest::get(Params::new().with("type", "metadata")));
//! assert_eq!(count.body, r#"{"num_objects":4}"#);
//! ```

pub mod bucket;
pub mod config;
pub mod cursor;
pub mod dispatch;
pub mod entry;
pub mod error;
pub mod family;
pub mod lease;
pub mod lister;
pub mod metrics;
pub mod params;
pub mod response;
pub mod shard;
pub mod time;

pub use bucket::{BucketId, BucketIndexLog, MemoryBucketIndex};
pub use config::LogConfig;
pub use cursor::Cursor;
pub use dispatch::{route, Handler, LogDispatcher, LogOp, LogRequest, Method, Outcome};
pub use entry::LogEntry;
pub use error::{Error, Result};
pub use family::LogFamily;
pub use lease::{Lease, LeaseManager, LeaseOwner};
pub use lister::{ListPage, PaginatedLister, StreamSummary};
pub use metrics::MetricsCollector;
pub use params::Params;
pub use response::{EntrySink, JsonResponse, RenderedResponse};
pub use shard::{
    FileLogStore, ListBatch, MemoryLogStore, ShardId, ShardInfo, ShardKey, ShardLogStore, ShardStats,
    StoreError,
};
pub use time::{Clock, ManualClock, SystemClock, TimeRange};
