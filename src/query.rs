//! Paginated retrieval of a user's API call records.

use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::api_log::{parse_log_line, ApiCallRecord};
use crate::search_http::SearchHttp;
use crate::types::{ApiRequest, ApiResponse};

pub const ERROR_MISSING_USER_ID: &str = "Missing userId parameter";
pub const ERROR_MISSING_PAGE_NO: &str = "Missing pageNo parameter";
pub const ERROR_PROCESSING_REQUEST: &str = "An error occurred while processing your request.";
pub const ERROR_SEARCH_CREDENTIALS: &str =
    "OPENSEARCH_USERNAME and OPENSEARCH_PASSWORD must be defined in environment variables.";

pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Full `_search` URL of the log indices.
    pub search_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub page_size: u32,
    pub timeout: Duration,
}

pub fn search_body(user_id: &str, page_no: u32, page_size: u32) -> Value {
    let from = u64::from(page_size) * u64::from(page_no.saturating_sub(1));
    json!({
        "from": from,
        "size": page_size,
        "query": {
            "bool": {
                "must": [
                    { "match_phrase": { "@message": "endpointUrl" } },
                    { "match_phrase": { "@message": format!("userId: {user_id}") } }
                ]
            }
        },
        "sort": [{ "@timestamp": { "order": "desc" } }]
    })
}

fn page_number(raw: Option<&str>) -> Option<u32> {
    raw?.trim().parse::<u32>().ok().filter(|n| *n >= 1)
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

pub async fn get_api_call_logs(cfg: &QueryConfig, request: &ApiRequest) -> ApiResponse {
    let Some(user_id) = request.query_param("userId").filter(|u| !u.is_empty()) else {
        return ApiResponse::json(400, &ERROR_MISSING_USER_ID);
    };
    let Some(page_no) = page_number(request.query_param("pageNo")) else {
        return ApiResponse::json(400, &ERROR_MISSING_PAGE_NO);
    };
    let (Some(username), Some(password)) =
        (non_empty(cfg.username.as_ref()), non_empty(cfg.password.as_ref()))
    else {
        return ApiResponse::json(500, &ERROR_SEARCH_CREDENTIALS);
    };

    match fetch_records(cfg, username, password, user_id, page_no).await {
        Ok(records) => {
            info!(
                "api call logs user={} page={} records={}",
                user_id,
                page_no,
                records.len()
            );
            ApiResponse::json(200, &records)
        }
        Err(err) => {
            error!("api call log query failed: {err:#}");
            ApiResponse::json(500, &ERROR_PROCESSING_REQUEST)
        }
    }
}

async fn fetch_records(
    cfg: &QueryConfig,
    username: &str,
    password: &str,
    user_id: &str,
    page_no: u32,
) -> Result<Vec<ApiCallRecord>> {
    let url = cfg
        .search_url
        .as_deref()
        .context("OPENSEARCH_SEARCH_URL is not configured")?;
    let http = SearchHttp::new(username, password, cfg.timeout)?;
    let body = search_body(user_id, page_no, cfg.page_size);
    let resp: Value = http.post_json(url, &body, "search api call logs").await?;

    let hits = resp
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .context("search response has no hits")?;
    Ok(hits
        .iter()
        .filter_map(|hit| hit.pointer("/_source/@message").and_then(Value::as_str))
        .filter_map(parse_log_line)
        .collect())
}
