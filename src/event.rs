//! Core data model for trip events and merged trip state.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A raw event as it travels the wire: a flat JSON object that always
/// carries `trip_id` and `event_type`, with the remaining scalar fields
/// varying by event type.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Returns the `trip_id` of a raw record, if present.
pub fn trip_id(record: &RawRecord) -> Option<&str> {
    record.get("trip_id").and_then(|v| v.as_str())
}

/// Returns the `event_type` of a raw record, if present and recognized.
pub fn event_type(record: &RawRecord) -> Option<EventType> {
    record
        .get("event_type")
        .and_then(|v| v.as_str())
        .and_then(EventType::parse)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TripStart,
    TripEnd,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::TripStart => "trip_start",
            EventType::TripEnd => "trip_end",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "trip_start" => Some(EventType::TripStart),
            "trip_end" => Some(EventType::TripEnd),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The union of payload fields a trip can accumulate, each optional.
///
/// Monetary and distance values are [`Decimal`] so that merged state is
/// never stored with floating-point drift; floats appear again only in
/// the rounded KPI output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_location_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropoff_location_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_datetime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_dropoff_datetime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_fare_amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropoff_datetime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passenger_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trip_distance: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fare_amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tip_amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_type: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trip_type: Option<i64>,
}

impl TripFields {
    /// Last-write-wins merge: every field present on `incoming` replaces
    /// the value on `self`; absent fields keep their existing value.
    pub fn merged_with(&self, incoming: &TripFields) -> TripFields {
        TripFields {
            vendor_id: incoming.vendor_id.or(self.vendor_id),
            pickup_location_id: incoming.pickup_location_id.or(self.pickup_location_id),
            dropoff_location_id: incoming.dropoff_location_id.or(self.dropoff_location_id),
            pickup_datetime: incoming
                .pickup_datetime
                .clone()
                .or_else(|| self.pickup_datetime.clone()),
            estimated_dropoff_datetime: incoming
                .estimated_dropoff_datetime
                .clone()
                .or_else(|| self.estimated_dropoff_datetime.clone()),
            estimated_fare_amount: incoming.estimated_fare_amount.or(self.estimated_fare_amount),
            dropoff_datetime: incoming
                .dropoff_datetime
                .clone()
                .or_else(|| self.dropoff_datetime.clone()),
            rate_code: incoming.rate_code.or(self.rate_code),
            passenger_count: incoming.passenger_count.or(self.passenger_count),
            trip_distance: incoming.trip_distance.or(self.trip_distance),
            fare_amount: incoming.fare_amount.or(self.fare_amount),
            tip_amount: incoming.tip_amount.or(self.tip_amount),
            payment_type: incoming.payment_type.or(self.payment_type),
            trip_type: incoming.trip_type.or(self.trip_type),
        }
    }
}

/// A typed trip event, decoded from a delivered stream record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripEvent {
    pub trip_id: String,
    pub event_type: EventType,
    #[serde(flatten)]
    pub fields: TripFields,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Completed,
}

/// Merged aggregate state of one ride, keyed by `trip_id` in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub trip_id: String,
    #[serde(flatten)]
    pub fields: TripFields,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TripStatus>,
}

impl Trip {
    pub fn is_completed(&self) -> bool {
        self.status == Some(TripStatus::Completed)
    }

    /// The calendar-date portion of the dropoff timestamp, if the trip
    /// has one and its prefix parses as an ISO date.
    pub fn dropoff_date(&self) -> Option<NaiveDate> {
        let raw = self.fields.dropoff_datetime.as_deref()?;
        parse_date_prefix(raw)
    }
}

/// Parses the leading `YYYY-MM-DD` of a timestamp string, tolerating both
/// `T`-separated and space-separated datetime formats.
pub fn parse_date_prefix(raw: &str) -> Option<NaiveDate> {
    let prefix = raw.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn test_event_type_round_trip() {
        assert_eq!(EventType::parse("trip_start"), Some(EventType::TripStart));
        assert_eq!(EventType::parse("trip_end"), Some(EventType::TripEnd));
        assert_eq!(EventType::parse("trip_cancelled"), None);
        assert_eq!(EventType::TripEnd.as_str(), "trip_end");
    }

    #[test]
    fn test_merged_with_prefers_incoming() {
        let existing = TripFields {
            fare_amount: Some(Decimal::from_str("10.00").unwrap()),
            pickup_datetime: Some("2025-07-10T10:00:00".to_string()),
            ..Default::default()
        };
        let incoming = TripFields {
            fare_amount: Some(Decimal::from_str("12.50").unwrap()),
            dropoff_datetime: Some("2025-07-10T10:30:00".to_string()),
            ..Default::default()
        };

        let merged = existing.merged_with(&incoming);

        assert_eq!(merged.fare_amount, Some(Decimal::from_str("12.50").unwrap()));
        assert_eq!(merged.pickup_datetime.as_deref(), Some("2025-07-10T10:00:00"));
        assert_eq!(merged.dropoff_datetime.as_deref(), Some("2025-07-10T10:30:00"));
    }

    #[test]
    fn test_parse_date_prefix_variants() {
        assert_eq!(
            parse_date_prefix("2025-07-10T10:35:00"),
            NaiveDate::from_ymd_opt(2025, 7, 10)
        );
        assert_eq!(
            parse_date_prefix("2025-07-10 10:35:00"),
            NaiveDate::from_ymd_opt(2025, 7, 10)
        );
        assert_eq!(parse_date_prefix("not-a-date"), None);
        assert_eq!(parse_date_prefix("2025"), None);
    }

    #[test]
    fn test_trip_fields_serde_skips_absent() {
        let fields = TripFields {
            fare_amount: Some(Decimal::from_str("27.75").unwrap()),
            ..Default::default()
        };
        let json = serde_json::to_value(&fields).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 1);
        // Decimal serializes as an exact string, not a float.
        assert_eq!(obj["fare_amount"], serde_json::json!("27.75"));
    }
}
