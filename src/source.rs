//! CSV source extractor for the ingestion simulation.
//!
//! Reads the `trip_start.csv` and `trip_end.csv` exports, labels each row
//! with its event type, and shuffles the combined set so downstream
//! components see realistically interleaved (and out-of-order) events.

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::thread_rng;
use serde_json::Value;
use std::path::Path;
use tracing::info;

use crate::event::{EventType, RawRecord};

/// Loads both source files from `data_dir` and returns the shuffled union.
pub fn load_events(data_dir: &str) -> Result<Vec<RawRecord>> {
    let dir = Path::new(data_dir);

    let mut events = load_csv(&dir.join("trip_start.csv"), EventType::TripStart)?;
    let mut end_events = load_csv(&dir.join("trip_end.csv"), EventType::TripEnd)?;
    events.append(&mut end_events);

    events.shuffle(&mut thread_rng());

    info!(total = events.len(), data_dir, "source events loaded");
    Ok(events)
}

/// Reads one CSV file into raw records labeled with `event_type`.
/// Blank cells are dropped rather than carried as nulls.
pub fn load_csv(path: &Path, event_type: EventType) -> Result<Vec<RawRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open source file {}", path.display()))?;
    let headers = reader.headers()?.clone();

    let mut events = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut record = RawRecord::new();

        for (name, cell) in headers.iter().zip(row.iter()) {
            if let Some(value) = cell_value(cell) {
                record.insert(name.to_string(), value);
            }
        }
        record.insert(
            "event_type".to_string(),
            Value::String(event_type.as_str().to_string()),
        );

        events.push(record);
    }

    Ok(events)
}

/// Sniffs a CSV cell into a JSON scalar: integer, then float, then
/// string. Empty cells become `None` so absent fields stay absent.
fn cell_value(cell: &str) -> Option<Value> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    if let Ok(i) = cell.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    if let Ok(f) = cell.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Some(Value::Number(n));
        }
    }
    Some(Value::String(cell.to_string()))
}

/// Column summary of one source file, for the `inspect-data` job.
#[derive(Debug)]
pub struct CsvDescription {
    pub rows: usize,
    pub columns: Vec<(String, &'static str)>,
}

/// Describes a source CSV: row count plus each column's inferred scalar
/// type, taken from the first non-empty cell.
pub fn describe_csv(path: &Path) -> Result<CsvDescription> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open source file {}", path.display()))?;
    let headers = reader.headers()?.clone();

    let mut rows = 0;
    let mut types: Vec<Option<&'static str>> = vec![None; headers.len()];

    for row in reader.records() {
        let row = row?;
        rows += 1;
        for (i, cell) in row.iter().enumerate() {
            if types[i].is_none() {
                types[i] = cell_value(cell).map(|v| match v {
                    Value::Number(n) if n.is_i64() => "integer",
                    Value::Number(_) => "number",
                    _ => "string",
                });
            }
        }
    }

    let columns = headers
        .iter()
        .zip(types)
        .map(|(name, t)| (name.to_string(), t.unwrap_or("empty")))
        .collect();

    Ok(CsvDescription { rows, columns })
}
