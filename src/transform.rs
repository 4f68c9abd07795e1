//! Log batch to bulk NDJSON payload.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::naming::{daily_index, event_time};
use crate::types::{LogBatch, LogEvent};

// Largest integer an f64 carries exactly.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, Clone, Serialize)]
pub struct IndexAction {
    pub index: IndexTarget,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexTarget {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_id")]
    pub id: String,
}

#[derive(Debug, Clone, Default)]
pub struct BulkPayload {
    pub body: String,
    pub actions: usize,
}

impl BulkPayload {
    pub fn is_empty(&self) -> bool {
        self.actions == 0
    }
}

/// Build the bulk body for a DATA batch, one action/document pair per event in input order.
pub fn transform_batch(batch: &LogBatch, index_prefix: &str) -> Result<BulkPayload> {
    let mut body = String::with_capacity(batch.log_events.len() * 512);
    for event in &batch.log_events {
        let (action, source) = to_index_pair(batch, event, index_prefix);
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&source)?);
        body.push('\n');
    }
    Ok(BulkPayload {
        body,
        actions: batch.log_events.len(),
    })
}

pub fn to_index_pair(
    batch: &LogBatch,
    event: &LogEvent,
    index_prefix: &str,
) -> (IndexAction, Map<String, Value>) {
    let mut source = build_source(&event.message, event.extracted_fields.as_ref());

    // Lineage always wins over content keys.
    let ts = event_time(event.timestamp).to_rfc3339_opts(SecondsFormat::Millis, true);
    source.insert("@id".into(), Value::String(event.id.clone()));
    source.insert("@timestamp".into(), Value::String(ts));
    source.insert("@message".into(), Value::String(event.message.clone()));
    source.insert("@owner".into(), Value::String(batch.owner.clone()));
    source.insert("@log_group".into(), Value::String(batch.log_group.clone()));
    source.insert("@log_stream".into(), Value::String(batch.log_stream.clone()));

    let action = IndexAction {
        index: IndexTarget {
            index: daily_index(index_prefix, event.timestamp),
            id: event.id.clone(),
        },
    };
    (action, source)
}

pub fn build_source(
    message: &str,
    extracted_fields: Option<&BTreeMap<String, String>>,
) -> Map<String, Value> {
    let Some(fields) = extracted_fields else {
        return match extract_json(message) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
    };

    let mut source = Map::new();
    for (key, value) in fields {
        if value.is_empty() {
            continue;
        }
        // Numeric values are stored only as numbers.
        if let Some(number) = coerce_number(value) {
            source.insert(key.clone(), number);
            continue;
        }
        if let Some(json) = extract_json(value) {
            source.insert(format!("${key}"), json);
        }
        source.insert(key.clone(), Value::String(value.clone()));
    }
    source
}

/// Parse everything from the first `{` to the end as JSON.
pub fn extract_json(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    serde_json::from_str(&text[start..]).ok()
}

pub fn coerce_number(value: &str) -> Option<Value> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed: f64 = trimmed.parse().ok()?;
    if !parsed.is_finite() {
        return None;
    }
    if parsed.fract() == 0.0 && parsed.abs() < MAX_EXACT_INT {
        return Some(Value::from(parsed as i64));
    }
    serde_json::Number::from_f64(parsed).map(Value::Number)
}
