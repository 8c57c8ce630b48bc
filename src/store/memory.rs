//! In-memory service implementations backing the local simulation and tests.

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Mutex;

use super::{
    BlobStore, DeliveredRecord, EventStream, Notifier, PutOutcome, ScanPage, ScanToken,
    StreamRecord, TripStore,
};
use crate::event::Trip;

/// Stream stand-in: accepted records queue up for chunked delivery in
/// base64-encoded form, matching the wire contract of the real stream.
/// Tests can inject a failure count for the next bulk call.
#[derive(Default)]
pub struct MemoryStream {
    records: Mutex<Vec<StreamRecord>>,
    fail_next: Mutex<usize>,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `put_records` call report `count` records as failed.
    pub fn fail_next(&self, count: usize) {
        *self.fail_next.lock().unwrap() = count;
    }

    /// Drains up to `max` records as a delivered chunk.
    pub fn take_chunk(&self, max: usize) -> Vec<DeliveredRecord> {
        let mut records = self.records.lock().unwrap();
        let take = max.min(records.len());
        records
            .drain(..take)
            .map(|r| DeliveredRecord {
                data: BASE64.encode(&r.data),
                partition_key: r.partition_key,
            })
            .collect()
    }

    pub fn pending(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl EventStream for MemoryStream {
    async fn put_records(&self, records: Vec<StreamRecord>) -> Result<PutOutcome> {
        let mut fail_next = self.fail_next.lock().unwrap();
        let failed_count = (*fail_next).min(records.len());
        *fail_next = 0;

        let accepted = records.len() - failed_count;
        self.records
            .lock()
            .unwrap()
            .extend(records.into_iter().take(accepted));

        Ok(PutOutcome { failed_count })
    }
}

/// Key-value store stand-in with paginated scans over sorted keys.
pub struct MemoryTripStore {
    trips: Mutex<BTreeMap<String, Trip>>,
    page_size: usize,
}

impl MemoryTripStore {
    pub fn new() -> Self {
        Self::with_page_size(100)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            trips: Mutex::new(BTreeMap::new()),
            page_size: page_size.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.trips.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryTripStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TripStore for MemoryTripStore {
    async fn get(&self, trip_id: &str) -> Result<Option<Trip>> {
        Ok(self.trips.lock().unwrap().get(trip_id).cloned())
    }

    async fn put(&self, trip: Trip) -> Result<()> {
        self.trips
            .lock()
            .unwrap()
            .insert(trip.trip_id.clone(), trip);
        Ok(())
    }

    async fn scan_page(&self, start: Option<ScanToken>) -> Result<ScanPage> {
        let trips = self.trips.lock().unwrap();

        let range = match &start {
            Some(token) => {
                trips.range::<str, _>((Bound::Excluded(token.0.as_str()), Bound::Unbounded))
            }
            None => trips.range::<str, _>(..),
        };

        let page: Vec<Trip> = range.take(self.page_size).map(|(_, t)| t.clone()).collect();
        let next = if page.len() == self.page_size {
            page.last().map(|t| ScanToken(t.trip_id.clone()))
        } else {
            None
        };

        Ok(ScanPage { trips: page, next })
    }
}

/// Blob store stand-in keyed by object name.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_object(&self, key: &str, body: Vec<u8>, _content_type: &str) -> Result<()> {
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }
}

/// Notification sink that records messages so tests can assert on them.
#[derive(Default)]
pub struct MemoryNotifier {
    messages: Mutex<Vec<(String, String)>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, subject: &str, message: &str) -> Result<()> {
        self.messages
            .lock()
            .unwrap()
            .push((subject.to_string(), message.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TripFields;

    fn trip(id: &str) -> Trip {
        Trip {
            trip_id: id.to_string(),
            fields: TripFields::default(),
            status: None,
        }
    }

    #[tokio::test]
    async fn test_stream_delivers_base64_chunks() {
        let stream = MemoryStream::new();
        stream
            .put_records(vec![StreamRecord {
                data: br#"{"trip_id":"T1"}"#.to_vec(),
                partition_key: "T1".to_string(),
            }])
            .await
            .unwrap();

        let chunk = stream.take_chunk(10);
        assert_eq!(chunk.len(), 1);
        let decoded = BASE64.decode(&chunk[0].data).unwrap();
        assert_eq!(decoded, br#"{"trip_id":"T1"}"#);
        assert_eq!(stream.pending(), 0);
    }

    #[tokio::test]
    async fn test_stream_injected_failures() {
        let stream = MemoryStream::new();
        stream.fail_next(2);

        let records: Vec<StreamRecord> = (0..5)
            .map(|i| StreamRecord {
                data: vec![i],
                partition_key: format!("T{i}"),
            })
            .collect();
        let outcome = stream.put_records(records).await.unwrap();

        assert_eq!(outcome.failed_count, 2);
        assert_eq!(stream.pending(), 3);

        // Failure injection is one-shot.
        let outcome = stream
            .put_records(vec![StreamRecord {
                data: vec![9],
                partition_key: "T9".to_string(),
            }])
            .await
            .unwrap();
        assert_eq!(outcome.failed_count, 0);
    }

    #[tokio::test]
    async fn test_trip_store_scan_pagination() {
        let store = MemoryTripStore::with_page_size(2);
        for i in 0..5 {
            store.put(trip(&format!("T{i}"))).await.unwrap();
        }

        let mut seen = Vec::new();
        let mut token = None;
        loop {
            let page = store.scan_page(token).await.unwrap();
            seen.extend(page.trips.into_iter().map(|t| t.trip_id));
            match page.next {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        assert_eq!(seen, vec!["T0", "T1", "T2", "T3", "T4"]);
    }

    #[tokio::test]
    async fn test_trip_store_put_overwrites() {
        let store = MemoryTripStore::new();
        store.put(trip("T1")).await.unwrap();

        let mut updated = trip("T1");
        updated.fields.pickup_datetime = Some("2025-07-10T10:00:00".to_string());
        store.put(updated.clone()).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("T1").await.unwrap(), Some(updated));
    }
}
