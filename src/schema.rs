//! Structural schema validation for raw trip events.
//!
//! The schema is a flat document of field declarations:
//!
//! ```json
//! {
//!   "fields": {
//!     "trip_id":   { "type": "string", "required": true },
//!     "fare_amount": { "type": "number" }
//!   }
//! }
//! ```
//!
//! Validation failures are never fatal: the validator logs a structured
//! warning with the offending field and returns `false`.

use anyhow::Result;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::warn;

use crate::event::RawRecord;

const BUILTIN_SCHEMA: &str = include_str!("../schemas/trip_event_schema.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
}

impl FieldType {
    fn matches(&self, value: &serde_json::Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            // Integers are acceptable where a number is declared.
            FieldType::Number => value.is_number(),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
}

/// Declared structure of a trip event: field name to type and requiredness.
#[derive(Debug, Clone, Deserialize)]
pub struct EventSchema {
    pub fields: BTreeMap<String, FieldSpec>,
}

impl EventSchema {
    /// Loads a schema document from a JSON file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// The schema shipped with the crate, covering both trip event variants.
    pub fn builtin() -> Result<Self> {
        Ok(serde_json::from_str(BUILTIN_SCHEMA)?)
    }

    /// Checks `record` against the schema. Extra undeclared fields are
    /// accepted. Each failure emits a warning carrying the field, the
    /// reason, and the raw record, then the record is reported invalid.
    pub fn validate(&self, record: &RawRecord) -> bool {
        for (name, spec) in &self.fields {
            match record.get(name) {
                None => {
                    if spec.required {
                        warn!(
                            field = %name,
                            reason = "missing required field",
                            record = %serde_json::Value::Object(record.clone()),
                            "event failed schema validation"
                        );
                        return false;
                    }
                }
                Some(value) => {
                    if !spec.field_type.matches(value) {
                        warn!(
                            field = %name,
                            expected = spec.field_type.as_str(),
                            reason = "field has wrong type",
                            record = %serde_json::Value::Object(record.clone()),
                            "event failed schema validation"
                        );
                        return false;
                    }
                }
            }
        }
        true
    }
}
