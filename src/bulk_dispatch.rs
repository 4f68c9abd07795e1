use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::search_http::truncate_body_snippet;
use crate::sigv4::{RequestSigner, SignedRequest};
use crate::transform::BulkPayload;

pub const BULK_PATH: &str = "/_bulk";

#[derive(Clone, Debug)]
pub struct BulkDispatchConfig {
    /// Domain host name the request is signed for.
    pub host: String,
    /// Base URL requests are sent to; defaults to `https://<host>`.
    pub endpoint: Option<String>,
    pub timeout: Duration,
    pub log_failed_items: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BulkSummary {
    pub attempted: usize,
    pub successful: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("bulk request failed status={status_code:?} body={response_body}")]
pub struct BulkFailure {
    /// `None` when the request never produced a response.
    pub status_code: Option<u16>,
    /// Response body with the per-item array removed.
    pub response_body: Value,
    pub failed_items: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BulkOutcome {
    Indexed(BulkSummary),
    Failed(BulkFailure),
}

pub struct BulkDispatcher {
    client: Client,
    signer: RequestSigner,
    host: String,
    url: String,
    log_failed_items: bool,
}

impl BulkDispatcher {
    pub fn new(cfg: BulkDispatchConfig, signer: RequestSigner) -> Result<Self> {
        let client = Client::builder().timeout(cfg.timeout).build()?;
        let base = cfg
            .endpoint
            .unwrap_or_else(|| format!("https://{}", cfg.host));
        Ok(Self {
            client,
            signer,
            url: format!("{}{}", base.trim_end_matches('/'), BULK_PATH),
            host: cfg.host,
            log_failed_items: cfg.log_failed_items,
        })
    }

    pub fn sign_payload(&self, payload: &BulkPayload, now: DateTime<Utc>) -> SignedRequest {
        let headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Host".to_string(), self.host.clone()),
            ("Content-Length".to_string(), payload.body.len().to_string()),
        ];
        self.signer
            .sign("POST", BULK_PATH, headers, payload.body.clone(), now)
    }

    pub async fn dispatch(&self, payload: &BulkPayload) -> BulkOutcome {
        self.dispatch_at(payload, Utc::now()).await
    }

    pub async fn dispatch_at(&self, payload: &BulkPayload, now: DateTime<Utc>) -> BulkOutcome {
        let signed = self.sign_payload(payload, now);
        let mut req = self.client.post(&self.url);
        for (name, value) in &signed.headers {
            // reqwest derives the length from the body.
            if name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            req = req.header(name.as_str(), value.as_str());
        }

        let outcome = match req.body(signed.body).send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                match resp.text().await {
                    Ok(text) => check_item_count(classify_response(status, &text), status, payload),
                    Err(err) => BulkOutcome::Failed(BulkFailure {
                        status_code: Some(status),
                        response_body: Value::String(format!("reading bulk response: {err}")),
                        failed_items: Vec::new(),
                    }),
                }
            }
            Err(err) => {
                warn!("bulk connection error: {err}");
                BulkOutcome::Failed(BulkFailure {
                    status_code: None,
                    response_body: Value::String(err.to_string()),
                    failed_items: Vec::new(),
                })
            }
        };
        self.log_outcome(&outcome);
        outcome
    }

    fn log_outcome(&self, outcome: &BulkOutcome) {
        match outcome {
            BulkOutcome::Indexed(s) => info!(
                "bulk indexed attempted={} successful={} failed={}",
                s.attempted, s.successful, s.failed
            ),
            BulkOutcome::Failed(f) => {
                warn!(
                    "bulk failed status={:?} body_sample={}",
                    f.status_code,
                    truncate_body_snippet(&f.response_body.to_string(), 500)
                );
                if self.log_failed_items && !f.failed_items.is_empty() {
                    warn!(
                        "bulk failed items: {}",
                        serde_json::to_string(&f.failed_items).unwrap_or_default()
                    );
                }
            }
        }
    }
}

/// A response accounting for fewer or more items than actions sent cannot be trusted
/// to have indexed the batch.
fn check_item_count(outcome: BulkOutcome, status: u16, payload: &BulkPayload) -> BulkOutcome {
    match outcome {
        BulkOutcome::Indexed(summary) if summary.attempted != payload.actions => {
            BulkOutcome::Failed(BulkFailure {
                status_code: Some(status),
                response_body: json!({
                    "error": format!(
                        "bulk response covered {} of {} actions",
                        summary.attempted, payload.actions
                    )
                }),
                failed_items: Vec::new(),
            })
        }
        other => other,
    }
}

/// Classify a bulk response from its HTTP status and body. Only a 2xx body that is a
/// JSON object with an `items` array and no `errors` flag counts as indexed.
pub fn classify_response(status: u16, body: &str) -> BulkOutcome {
    let mut info: Value =
        serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()));
    let errors = info.get("errors").and_then(Value::as_bool).unwrap_or(false);
    let failed_items: Vec<Value> = info
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|item| item_status(item).is_some_and(|s| s >= 300))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    let item_count = info.get("items").and_then(Value::as_array).map(Vec::len);
    let accepted = (200..299).contains(&status) && !errors;
    if let Some(attempted) = item_count.filter(|_| accepted) {
        return BulkOutcome::Indexed(BulkSummary {
            attempted,
            successful: attempted - failed_items.len(),
            failed: failed_items.len(),
        });
    }

    if let Some(obj) = info.as_object_mut() {
        obj.remove("items");
    }
    BulkOutcome::Failed(BulkFailure {
        status_code: Some(status),
        response_body: info,
        failed_items,
    })
}

/// Per-item status; each item is keyed by its operation (`index`, `create`, ...).
fn item_status(item: &Value) -> Option<u64> {
    item.as_object()?
        .values()
        .next()?
        .get("status")
        .and_then(Value::as_u64)
}
