//! Stream consumer: decodes delivered records, merges partial events into
//! trip state, and upserts the result idempotently.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use crate::event::{EventType, RawRecord, Trip, TripEvent, TripFields, TripStatus};
use crate::store::{DeliveredRecord, Notifier, TripStore};

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("record payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("record payload is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("event is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("unknown event type `{0}`")]
    UnknownEventType(String),
    #[error("trip store rejected upsert: {0}")]
    Store(#[source] anyhow::Error),
}

/// Decodes one delivered stream record into a typed event. Monetary and
/// distance numbers become exact decimals at this boundary.
pub fn decode_event(record: &DeliveredRecord) -> Result<TripEvent, MergeError> {
    let payload = BASE64.decode(&record.data)?;
    let raw: RawRecord = serde_json::from_slice(&payload)?;
    typed_event(&raw)
}

fn typed_event(raw: &RawRecord) -> Result<TripEvent, MergeError> {
    let trip_id = field_str(raw, "trip_id").ok_or(MergeError::MissingField("trip_id"))?;
    let type_str = field_str(raw, "event_type").ok_or(MergeError::MissingField("event_type"))?;
    let event_type =
        EventType::parse(&type_str).ok_or(MergeError::UnknownEventType(type_str.clone()))?;

    Ok(TripEvent {
        trip_id,
        event_type,
        fields: TripFields {
            vendor_id: field_int(raw, "vendor_id"),
            pickup_location_id: field_int(raw, "pickup_location_id"),
            dropoff_location_id: field_int(raw, "dropoff_location_id"),
            pickup_datetime: field_str(raw, "pickup_datetime"),
            estimated_dropoff_datetime: field_str(raw, "estimated_dropoff_datetime"),
            estimated_fare_amount: field_decimal(raw, "estimated_fare_amount"),
            dropoff_datetime: field_str(raw, "dropoff_datetime"),
            rate_code: field_int(raw, "rate_code"),
            passenger_count: field_int(raw, "passenger_count"),
            trip_distance: field_decimal(raw, "trip_distance"),
            fare_amount: field_decimal(raw, "fare_amount"),
            tip_amount: field_decimal(raw, "tip_amount"),
            payment_type: field_int(raw, "payment_type"),
            trip_type: field_int(raw, "trip_type"),
        },
    })
}

fn field_str(raw: &RawRecord, name: &str) -> Option<String> {
    raw.get(name).and_then(|v| v.as_str()).map(str::to_string)
}

fn field_int(raw: &RawRecord, name: &str) -> Option<i64> {
    raw.get(name).and_then(|v| v.as_i64())
}

/// Exact-decimal conversion of a scalar. Goes through the number's
/// decimal string form rather than an f64 round trip, so "27.75" stays
/// 27.75 instead of drifting.
fn field_decimal(raw: &RawRecord, name: &str) -> Option<Decimal> {
    match raw.get(name)? {
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        serde_json::Value::String(s) => Decimal::from_str(s).ok(),
        _ => None,
    }
}

/// Field-level merge of an incoming event into existing trip state.
///
/// Status is recomputed after every merge, not only when the dropoff
/// arrives, so out-of-order delivery still completes the trip once both
/// lifecycle timestamps are present.
pub fn merge(existing: Option<Trip>, event: &TripEvent) -> Trip {
    let fields = match &existing {
        Some(trip) => trip.fields.merged_with(&event.fields),
        None => event.fields.clone(),
    };

    let status = if fields.pickup_datetime.is_some() && fields.dropoff_datetime.is_some() {
        Some(TripStatus::Completed)
    } else {
        existing.and_then(|t| t.status)
    };

    Trip {
        trip_id: event.trip_id.clone(),
        fields,
        status,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkOutcome {
    pub upserted: usize,
    pub failed: usize,
}

/// Consumes delivered chunks and maintains trip state in the store.
pub struct Consumer {
    store: Arc<dyn TripStore>,
    notifier: Arc<dyn Notifier>,
}

impl Consumer {
    pub fn new(store: Arc<dyn TripStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Processes a chunk record by record. A failing record is logged,
    /// reported to the notification sink, and skipped; it never aborts
    /// the rest of the chunk.
    pub async fn handle_chunk(&self, records: &[DeliveredRecord]) -> ChunkOutcome {
        let mut outcome = ChunkOutcome::default();

        for record in records {
            match self.apply(record).await {
                Ok(trip_id) => {
                    info!(trip_id = %trip_id, "trip upserted");
                    outcome.upserted += 1;
                }
                Err(e) => {
                    outcome.failed += 1;
                    let message =
                        format!("Error processing record: {e}\nRaw record: {}", record.data);
                    error!(error = %e, payload = %record.data, "failed to process stream record");
                    if let Err(notify_err) = self
                        .notifier
                        .notify("Trip Event Processing Error", &message)
                        .await
                    {
                        error!(error = %notify_err, "failed to publish error notification");
                    }
                }
            }
        }

        outcome
    }

    async fn apply(&self, record: &DeliveredRecord) -> Result<String, MergeError> {
        let event = decode_event(record)?;

        let existing = self
            .store
            .get(&event.trip_id)
            .await
            .map_err(MergeError::Store)?;
        let updated = merge(existing, &event);
        let trip_id = updated.trip_id.clone();

        self.store.put(updated).await.map_err(MergeError::Store)?;
        Ok(trip_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryNotifier, MemoryTripStore};
    use serde_json::json;

    fn delivered(fields: serde_json::Value) -> DeliveredRecord {
        let payload = serde_json::to_vec(&fields).unwrap();
        DeliveredRecord {
            data: BASE64.encode(payload),
            partition_key: fields["trip_id"].as_str().unwrap_or("?").to_string(),
        }
    }

    fn start_event(trip: &str) -> DeliveredRecord {
        delivered(json!({
            "trip_id": trip,
            "event_type": "trip_start",
            "pickup_datetime": "2025-07-10T10:00:00",
            "estimated_fare_amount": 25.50
        }))
    }

    fn end_event(trip: &str) -> DeliveredRecord {
        delivered(json!({
            "trip_id": trip,
            "event_type": "trip_end",
            "dropoff_datetime": "2025-07-10T10:35:00",
            "fare_amount": 27.75,
            "tip_amount": 3.00
        }))
    }

    fn consumer() -> (Consumer, Arc<MemoryTripStore>, Arc<MemoryNotifier>) {
        let store = Arc::new(MemoryTripStore::new());
        let notifier = Arc::new(MemoryNotifier::new());
        (
            Consumer::new(store.clone(), notifier.clone()),
            store,
            notifier,
        )
    }

    #[test]
    fn test_decode_event_converts_money_to_decimal() {
        let event = decode_event(&end_event("T1")).unwrap();
        assert_eq!(
            event.fields.fare_amount,
            Some(Decimal::from_str("27.75").unwrap())
        );
        assert_eq!(
            event.fields.tip_amount,
            Some(Decimal::from_str("3.0").unwrap())
        );
    }

    #[test]
    fn test_decode_rejects_bad_base64_and_json() {
        let bad_b64 = DeliveredRecord {
            data: "not base64!!".to_string(),
            partition_key: "T1".to_string(),
        };
        assert!(matches!(decode_event(&bad_b64), Err(MergeError::Decode(_))));

        let bad_json = DeliveredRecord {
            data: BASE64.encode(b"{truncated"),
            partition_key: "T1".to_string(),
        };
        assert!(matches!(decode_event(&bad_json), Err(MergeError::Parse(_))));
    }

    #[test]
    fn test_decode_rejects_missing_invariants() {
        let no_trip = delivered(json!({ "event_type": "trip_start" }));
        assert!(matches!(
            decode_event(&no_trip),
            Err(MergeError::MissingField("trip_id"))
        ));

        let odd_type = delivered(json!({ "trip_id": "T1", "event_type": "trip_paused" }));
        assert!(matches!(
            decode_event(&odd_type),
            Err(MergeError::UnknownEventType(_))
        ));
    }

    #[tokio::test]
    async fn test_out_of_order_completion() {
        let (consumer, store, _) = consumer();

        // Dropoff arrives first; the trip must not be completed yet.
        consumer.handle_chunk(&[end_event("T1")]).await;
        let trip = store.get("T1").await.unwrap().unwrap();
        assert_eq!(trip.status, None);

        // Pickup arrives second; the status recheck completes the trip.
        consumer.handle_chunk(&[start_event("T1")]).await;
        let trip = store.get("T1").await.unwrap().unwrap();
        assert_eq!(trip.status, Some(TripStatus::Completed));
        assert_eq!(
            trip.fields.fare_amount,
            Some(Decimal::from_str("27.75").unwrap())
        );
    }

    #[tokio::test]
    async fn test_merge_is_idempotent() {
        let (consumer, store, _) = consumer();

        consumer
            .handle_chunk(&[start_event("T1"), end_event("T1")])
            .await;
        let once = store.get("T1").await.unwrap().unwrap();

        consumer.handle_chunk(&[end_event("T1")]).await;
        let twice = store.get("T1").await.unwrap().unwrap();

        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_bad_record_notifies_and_continues() {
        let (consumer, store, notifier) = consumer();

        let bad = DeliveredRecord {
            data: BASE64.encode(b"not json"),
            partition_key: "T9".to_string(),
        };
        let outcome = consumer.handle_chunk(&[bad, start_event("T2")]).await;

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.upserted, 1);
        assert!(store.get("T2").await.unwrap().is_some());

        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, "Trip Event Processing Error");
        assert!(messages[0].1.contains("Raw record:"));
    }

    #[test]
    fn test_merge_overwrites_with_incoming_fields() {
        let first = decode_event(&delivered(json!({
            "trip_id": "T1",
            "event_type": "trip_start",
            "pickup_datetime": "2025-07-10T10:00:00",
            "estimated_fare_amount": 25.50
        })))
        .unwrap();
        let revised = decode_event(&delivered(json!({
            "trip_id": "T1",
            "event_type": "trip_start",
            "pickup_datetime": "2025-07-10T10:05:00"
        })))
        .unwrap();

        let trip = merge(None, &first);
        let trip = merge(Some(trip), &revised);

        assert_eq!(
            trip.fields.pickup_datetime.as_deref(),
            Some("2025-07-10T10:05:00")
        );
        // Fields absent from the incoming event keep their values.
        assert_eq!(
            trip.fields.estimated_fare_amount,
            Some(Decimal::from_str("25.5").unwrap())
        );
    }
}
