//! Recovers API call records from indexed access-log lines.
//!
//! Every field is matched independently on the text after the `Response: ` marker;
//! a field whose pattern does not match is `None`. The response body is nested twice
//! (`responseBody: { ..., body: '<escaped json>' }`), so it is cut out in stages:
//! the wrapper object first, then the quoted `body:` span inside it, then unescaped
//! and parsed.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

pub const RESPONSE_MARKER: &str = "Response: ";

static REQUEST_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"requestId: '([^']*)'").unwrap());
static DATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"date: '([^']*)'").unwrap());
static TIME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"time: (\d+)").unwrap());
static METHOD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"method: '([^']*)'").unwrap());
static ENDPOINT_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"endpointUrl: '([^']*)'").unwrap());
static STATUS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"status: '?(\d+)'?").unwrap());
static REQUEST_BODY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)requestBody: '(\{.*?\})'").unwrap());
static RESPONSE_WRAPPER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"responseBody:\s*(\{[\s\S]*?\}\s*\})").unwrap());
static INNER_BODY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"body: ('\{.*\}')").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCallRecord {
    pub request_id: Option<String>,
    pub date: Option<String>,
    pub time: Option<i64>,
    pub method: Option<String>,
    pub endpoint_url: Option<String>,
    pub status: Option<u32>,
    pub request_body: Option<Value>,
    pub response_body: Option<Value>,
}

impl ApiCallRecord {
    fn is_empty(&self) -> bool {
        self.request_id.is_none()
            && self.date.is_none()
            && self.time.is_none()
            && self.method.is_none()
            && self.endpoint_url.is_none()
            && self.status.is_none()
            && self.request_body.is_none()
            && self.response_body.is_none()
    }
}

/// `None` when the line has no response marker or no recognizable field.
pub fn parse_log_line(message: &str) -> Option<ApiCallRecord> {
    let start = message.find(RESPONSE_MARKER)?;
    let rest = &message[start + RESPONSE_MARKER.len()..];

    let record = ApiCallRecord {
        request_id: capture(&REQUEST_ID, rest).map(str::to_string),
        date: capture(&DATE, rest).map(str::to_string),
        time: capture(&TIME, rest).and_then(|v| v.parse().ok()),
        method: capture(&METHOD, rest).map(str::to_string),
        endpoint_url: capture(&ENDPOINT_URL, rest).map(str::to_string),
        status: capture(&STATUS, rest).and_then(|v| v.parse().ok()),
        request_body: capture(&REQUEST_BODY, rest).and_then(parse_escaped_json),
        response_body: response_body_span(rest).and_then(parse_escaped_json),
    };
    if record.is_empty() {
        return None;
    }
    Some(record)
}

pub fn parse_log_lines<'a, I>(messages: I) -> Vec<ApiCallRecord>
where
    I: IntoIterator<Item = &'a str>,
{
    messages.into_iter().filter_map(parse_log_line).collect()
}

fn capture<'t>(pattern: &Regex, text: &'t str) -> Option<&'t str> {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// The quoted `body:` span, cut from the `responseBody` wrapper when it matches.
/// Bodies holding nested objects close the wrapper pattern early, so the span is
/// then taken from the text following `responseBody:` instead.
fn response_body_span(rest: &str) -> Option<&str> {
    if let Some(body) = capture(&RESPONSE_WRAPPER, rest).and_then(|w| capture(&INNER_BODY, w)) {
        return Some(body);
    }
    let tail = rest.find("responseBody:").map_or(rest, |i| &rest[i..]);
    capture(&INNER_BODY, tail)
}

/// Strip surrounding quotes, undo the log escaping and parse.
pub fn parse_escaped_json(raw: &str) -> Option<Value> {
    let raw = raw.strip_prefix('\'').unwrap_or(raw);
    let raw = raw.strip_suffix('\'').unwrap_or(raw);
    let unescaped = raw
        .replace("\\r\\n", "")
        .replace("\\'", "'")
        .replace("\\\"", "\"")
        .replace("\\\\", "\\");
    match serde_json::from_str(&unescaped) {
        Ok(v) => Some(v),
        Err(err) => {
            debug!("embedded json did not parse: {err}");
            None
        }
    }
}
