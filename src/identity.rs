//! Content-based event identity used for in-session deduplication.

use sha2::{Digest, Sha256};

use crate::event::{EventType, RawRecord, event_type, trip_id};

/// Deterministic digest of an event's `(trip_id, event_type)` pair.
///
/// Two events with the same pair always hash identically regardless of
/// their other fields or field ordering; this collision is what makes
/// cross-variant deduplication work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId([u8; 32]);

impl EventId {
    pub fn of(trip_id: &str, event_type: EventType) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(trip_id.as_bytes());
        hasher.update(b"-");
        hasher.update(event_type.as_str().as_bytes());
        EventId(hasher.finalize().into())
    }

    /// Derives the identity of a raw record. `None` when either invariant
    /// field is missing or unrecognized.
    pub fn from_record(record: &RawRecord) -> Option<Self> {
        Some(EventId::of(trip_id(record)?, event_type(record)?))
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}
