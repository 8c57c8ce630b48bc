//! Stream publisher: deduplicates, validates, and bulk-publishes event
//! batches, bookkeeping partial failures without retrying them.

use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::batch::{BatchPolicy, batches};
use crate::event::{RawRecord, trip_id};
use crate::identity::EventId;
use crate::runlog::SessionLog;
use crate::schema::EventSchema;
use crate::store::{EventStream, StreamRecord};

/// Session-scoped deduplication state, owned by the caller so a run's
/// dedup window is explicit. Never persisted; a restart starts fresh and
/// relies on the store's idempotent upsert downstream.
#[derive(Debug, Default)]
pub struct DedupContext {
    seen: HashSet<EventId>,
}

impl DedupContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_seen(&self, id: &EventId) -> bool {
        self.seen.contains(id)
    }

    fn mark_seen(&mut self, id: EventId) {
        self.seen.insert(id);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub staged: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped_duplicate: usize,
    pub skipped_invalid: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub batches: usize,
    pub staged: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped_duplicate: usize,
    pub skipped_invalid: usize,
}

impl RunOutcome {
    fn absorb(&mut self, batch: BatchOutcome) {
        self.batches += 1;
        self.staged += batch.staged;
        self.sent += batch.sent;
        self.failed += batch.failed;
        self.skipped_duplicate += batch.skipped_duplicate;
        self.skipped_invalid += batch.skipped_invalid;
    }
}

pub struct Publisher {
    stream: Arc<dyn EventStream>,
    schema: EventSchema,
}

impl Publisher {
    pub fn new(stream: Arc<dyn EventStream>, schema: EventSchema) -> Self {
        Self { stream, schema }
    }

    /// Publishes one batch. Records are handled in order: identity first
    /// (silent skip when already seen this session), then schema
    /// validation (logged skip), then staging keyed by `trip_id`. The
    /// staged set goes out as one bulk call; records the transport
    /// rejects are counted, logged, and left for the external redrive
    /// mechanism. A transport-level error fails the whole batch locally
    /// but never aborts the run.
    pub async fn publish_batch(
        &self,
        batch: &[RawRecord],
        dedup: &mut DedupContext,
        log: &mut SessionLog,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let mut staged = Vec::new();

        for record in batch {
            let Some(id) = EventId::from_record(record) else {
                // No identity means an invariant field is missing or
                // malformed; the validator owns logging the detail.
                self.schema.validate(record);
                outcome.skipped_invalid += 1;
                log.record(
                    "warning",
                    "event has no usable trip_id/event_type pair",
                    json!({ "record": record }),
                );
                continue;
            };

            if dedup.is_seen(&id) {
                debug!(event_id = %id, "duplicate event skipped");
                outcome.skipped_duplicate += 1;
                continue;
            }

            if !self.schema.validate(record) {
                outcome.skipped_invalid += 1;
                log.record(
                    "warning",
                    "event failed schema validation",
                    json!({ "record": record }),
                );
                continue;
            }

            let key = match trip_id(record) {
                Some(k) => k.to_string(),
                None => {
                    outcome.skipped_invalid += 1;
                    continue;
                }
            };

            match serde_json::to_vec(record) {
                Ok(data) => {
                    dedup.mark_seen(id);
                    staged.push(StreamRecord {
                        data,
                        partition_key: key,
                    });
                }
                Err(e) => {
                    error!(trip_id = %key, error = %e, "failed to serialize event");
                    log.record(
                        "error",
                        "failed to serialize event",
                        json!({ "trip_id": key, "error": e.to_string() }),
                    );
                    outcome.skipped_invalid += 1;
                }
            }
        }

        outcome.staged = staged.len();
        if staged.is_empty() {
            return outcome;
        }

        match self.stream.put_records(staged).await {
            Ok(put) => {
                outcome.failed = put.failed_count.min(outcome.staged);
                outcome.sent = outcome.staged - outcome.failed;
                info!(
                    sent = outcome.sent,
                    failed = outcome.failed,
                    "batch published"
                );
                log.record(
                    "info",
                    "batch published",
                    json!({ "sent": outcome.sent, "failed": outcome.failed }),
                );
            }
            Err(e) => {
                // Throttling and outages surface here; the run carries on
                // with the next batch.
                outcome.failed = outcome.staged;
                outcome.sent = 0;
                error!(staged = outcome.staged, error = ?e, "bulk publish failed");
                log.record(
                    "error",
                    "bulk publish failed",
                    json!({ "staged": outcome.staged, "error": format!("{e:#}") }),
                );
            }
        }

        outcome
    }

    /// Publishes all events as sequential batches under `policy`, pacing
    /// with a fixed delay between batches to bound downstream load.
    pub async fn run(
        &self,
        events: &[RawRecord],
        policy: BatchPolicy,
        delay: Duration,
        dedup: &mut DedupContext,
        log: &mut SessionLog,
    ) -> RunOutcome {
        let mut run = RunOutcome::default();
        let mut batch_iter = batches(events, policy).peekable();

        while let Some(batch) = batch_iter.next() {
            let outcome = self.publish_batch(batch, dedup, log).await;
            run.absorb(outcome);

            if batch_iter.peek().is_some() {
                tokio::time::sleep(delay).await;
            }
        }

        info!(
            batches = run.batches,
            sent = run.sent,
            failed = run.failed,
            duplicates = run.skipped_duplicate,
            invalid = run.skipped_invalid,
            "publishing run complete"
        );
        run
    }
}
