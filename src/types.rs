use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "DATA_MESSAGE")]
    Data,
    #[serde(rename = "CONTROL_MESSAGE")]
    Control,
}

/// One decoded subscription delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogBatch {
    pub message_type: MessageType,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub log_group: String,
    #[serde(default)]
    pub log_stream: String,
    #[serde(default)]
    pub subscription_filters: Vec<String>,
    #[serde(default)]
    pub log_events: Vec<LogEvent>,
}

impl LogBatch {
    pub fn is_control(&self) -> bool {
        self.message_type == MessageType::Control
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub id: String,
    /// Epoch millis.
    pub timestamp: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_fields: Option<BTreeMap<String, String>>,
}

/// Ingestion invocation payload. Native subscription deliveries nest the blob
/// under `awslogs`; direct invocations may pass `data` at the top level.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IngestInput {
    AwsLogs { awslogs: EncodedData },
    Direct(EncodedData),
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncodedData {
    pub data: String,
}

impl IngestInput {
    pub fn data(&self) -> &str {
        match self {
            IngestInput::AwsLogs { awslogs } => &awslogs.data,
            IngestInput::Direct(inner) => &inner.data,
        }
    }
}

/// Minimal view of an API gateway proxy request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRequest {
    #[serde(default)]
    pub query_string_parameters: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub request_context: Option<RequestContext>,
    #[serde(default)]
    pub body: Option<String>,
}

impl ApiRequest {
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_string_parameters
            .as_ref()
            .and_then(|q| q.get(name))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub request_id: Option<String>,
    pub request_time: Option<String>,
    /// Epoch millis of the request; preferred over `request_time` in access logs.
    pub request_time_epoch: Option<i64>,
    pub http_method: Option<String>,
    pub domain_name: Option<String>,
    pub path: Option<String>,
    pub authorizer: Option<Authorizer>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Authorizer {
    #[serde(default)]
    pub claims: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub status_code: u16,
    pub body: String,
}

impl ApiResponse {
    /// Response whose body is the JSON encoding of `body`.
    pub fn json<T: Serialize>(status_code: u16, body: &T) -> Self {
        Self {
            status_code,
            body: serde_json::to_string(body).unwrap_or_else(|_| "null".into()),
        }
    }
}
