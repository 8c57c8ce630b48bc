//! Narrow interfaces to the durable services the pipeline coordinates
//! through: the event stream, the trip key-value store, the blob store,
//! and the failure notification sink.

mod blob;
mod memory;
mod notify;

pub use blob::{DirBlobStore, S3BlobStore};
pub use memory::{MemoryBlobStore, MemoryNotifier, MemoryStream, MemoryTripStore};
pub use notify::LogNotifier;

use anyhow::Result;
use async_trait::async_trait;

use crate::event::Trip;

/// One serialized event staged for bulk publication. The partition key
/// routes all events of a trip to the same shard so per-trip order holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    pub data: Vec<u8>,
    pub partition_key: String,
}

/// Result of a bulk publish. The transport may accept the call while
/// failing a subset of records; those are reported here, never retried.
#[derive(Debug, Clone, Copy, Default)]
pub struct PutOutcome {
    pub failed_count: usize,
}

/// One record as delivered to the consumer: base64-encoded JSON payload.
#[derive(Debug, Clone)]
pub struct DeliveredRecord {
    pub data: String,
    pub partition_key: String,
}

/// Continuation token for paginated trip scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanToken(pub String);

#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    pub trips: Vec<Trip>,
    pub next: Option<ScanToken>,
}

#[async_trait]
pub trait EventStream: Send + Sync {
    /// Publishes a set of records in one bulk call, returning how many
    /// the transport rejected.
    async fn put_records(&self, records: Vec<StreamRecord>) -> Result<PutOutcome>;
}

#[async_trait]
pub trait TripStore: Send + Sync {
    async fn get(&self, trip_id: &str) -> Result<Option<Trip>>;

    /// Idempotent full-record upsert keyed by `trip_id`.
    async fn put(&self, trip: Trip) -> Result<()>;

    /// One page of a full-table scan; pass the returned token to continue.
    async fn scan_page(&self, start: Option<ScanToken>) -> Result<ScanPage>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Overwrite-put of an object under `key`.
    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;
}

/// Fire-and-forget failure notifications. Implementations must not let a
/// notification failure escalate; callers log and move on regardless.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, message: &str) -> Result<()>;
}
