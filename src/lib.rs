//! Logforward - CloudWatch Logs subscription to OpenSearch bulk forwarding.

pub mod api_log;
pub mod bulk_dispatch;
pub mod config;
pub mod envelope;
pub mod hit_counter;
pub mod naming;
pub mod pipeline;
pub mod query;
pub mod request_log;
pub mod search_http;
pub mod sigv4;
pub mod subscription;
pub mod transform;
pub mod types;
