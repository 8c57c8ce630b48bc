//! Daily KPI aggregation over completed trips.
//!
//! Scans the trip store, groups completed trips by dropoff date, and
//! writes one `kpis/<date>.json` object per day. Every run is a full
//! recompute: a day's KPI depends only on the current trip set, never on
//! prior aggregation runs.

use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::event::Trip;
use crate::store::{BlobStore, TripStore};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyKpi {
    pub date: NaiveDate,
    pub count_trips: usize,
    pub total_fare: f64,
    pub average_fare: f64,
    pub max_fare: f64,
    pub min_fare: f64,
}

/// Groups completed trips by dropoff date and computes per-day fare
/// statistics. Trips that are not completed, have no fare, or whose
/// dropoff timestamp does not carry a parseable date are skipped.
///
/// All arithmetic stays in [`Decimal`]; values become rounded floats
/// only in the returned records.
pub fn compute_daily_kpis(trips: &[Trip]) -> Vec<DailyKpi> {
    let mut fares_by_date: BTreeMap<NaiveDate, Vec<Decimal>> = BTreeMap::new();

    for trip in trips {
        if !trip.is_completed() {
            continue;
        }
        let Some(fare) = trip.fields.fare_amount else {
            continue;
        };
        let Some(date) = trip.dropoff_date() else {
            warn!(trip_id = %trip.trip_id, "skipping completed trip with unparseable dropoff date");
            continue;
        };
        fares_by_date.entry(date).or_default().push(fare);
    }

    fares_by_date
        .into_iter()
        .map(|(date, fares)| {
            let count = fares.len();
            let total: Decimal = fares.iter().sum();
            let average = total / Decimal::from(count);
            let max = fares.iter().max().copied().unwrap_or_default();
            let min = fares.iter().min().copied().unwrap_or_default();

            DailyKpi {
                date,
                count_trips: count,
                total_fare: round2(total),
                average_fare: round2(average),
                max_fare: round2(max),
                min_fare: round2(min),
            }
        })
        .collect()
}

fn round2(value: Decimal) -> f64 {
    value.round_dp(2).to_f64().unwrap_or(0.0)
}

/// Scans the full trip store page by page, computes daily KPIs, and
/// overwrite-puts one JSON object per date into the blob store.
pub async fn aggregate(store: &dyn TripStore, blob: &dyn BlobStore) -> Result<Vec<DailyKpi>> {
    let mut trips = Vec::new();
    let mut token = None;

    loop {
        let page = store.scan_page(token).await?;
        trips.extend(page.trips);
        match page.next {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    info!(scanned = trips.len(), "trip scan complete");

    let kpis = compute_daily_kpis(&trips);
    for kpi in &kpis {
        let key = format!("kpis/{}.json", kpi.date);
        let body = serde_json::to_vec(kpi)?;
        blob.put_object(&key, body, "application/json").await?;
        info!(key = %key, trips = kpi.count_trips, "daily KPI written");
    }

    info!(days = kpis.len(), "KPI aggregation complete");
    Ok(kpis)
}
