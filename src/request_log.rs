//! Access logging around API handlers.
//!
//! [`RequestLogLayer`] is built once by the composition root and shared by handle;
//! each wrapped call emits one line
//! ` userId: <user> ,  Response: { requestId: '..', time: <epoch ms>, ..., responseBody: { statusCode: .., body: '..' } }`
//! which is the shape [`crate::api_log`] reads back.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use crate::types::{ApiRequest, ApiResponse, RequestContext};

pub const ANONYMOUS_USER: &str = "Anonymous";

/// Per-request logger handed to the wrapped handler.
#[derive(Debug, Clone)]
pub struct RequestLogger {
    user_id: Arc<str>,
}

impl RequestLogger {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn prefix(&self) -> String {
        format!(" userId: {} , ", self.user_id)
    }

    pub fn log(&self, message: &str) {
        info!("{} {}", self.prefix(), message);
    }

    pub fn error(&self, message: &str) {
        error!("{} {}", self.prefix(), message);
    }
}

#[derive(Debug)]
pub struct RequestLogLayer {
    /// Authorizer claims tried in order for the user id.
    user_claims: Vec<String>,
}

impl RequestLogLayer {
    pub fn new() -> Arc<Self> {
        Self::with_user_claims(["cognito:username", "username"])
    }

    pub fn with_user_claims<I, S>(claims: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            user_claims: claims.into_iter().map(Into::into).collect(),
        })
    }

    pub fn user_id_of(&self, request: &ApiRequest) -> String {
        let claims = request
            .request_context
            .as_ref()
            .and_then(|ctx| ctx.authorizer.as_ref())
            .map(|auth| &auth.claims);
        claims
            .and_then(|claims| {
                self.user_claims
                    .iter()
                    .filter_map(|name| claims.get(name))
                    .find(|v| !v.is_empty())
            })
            .cloned()
            .unwrap_or_else(|| ANONYMOUS_USER.to_string())
    }

    pub fn logger_for(&self, request: &ApiRequest) -> RequestLogger {
        RequestLogger {
            user_id: self.user_id_of(request).into(),
        }
    }

    /// Run `handler` and log the request/response pair. Handler errors are logged
    /// and returned unchanged.
    pub async fn wrap<F, Fut>(&self, request: ApiRequest, handler: F) -> Result<ApiResponse>
    where
        F: FnOnce(ApiRequest, RequestLogger) -> Fut,
        Fut: Future<Output = Result<ApiResponse>>,
    {
        let logger = self.logger_for(&request);
        match handler(request.clone(), logger.clone()).await {
            Ok(response) => {
                info!("{}", format_response_line(&logger, &request, &response));
                Ok(response)
            }
            Err(err) => {
                logger.error(&format!("An error occurred: {err:#}"));
                Err(err)
            }
        }
    }
}

pub fn format_response_line(
    logger: &RequestLogger,
    request: &ApiRequest,
    response: &ApiResponse,
) -> String {
    let ctx = request.request_context.clone().unwrap_or_default();
    let endpoint_url = format!(
        "{}{}",
        ctx.domain_name.as_deref().unwrap_or_default(),
        ctx.path.as_deref().unwrap_or_default()
    );
    format!(
        "{} Response: {{ requestId: {}, time: {}, method: {}, endpointUrl: {}, status: {}, requestBody: {}, responseBody: {{ statusCode: {}, body: {} }} }}",
        logger.prefix(),
        quoted(ctx.request_id.as_deref()),
        request_time(&ctx),
        quoted(ctx.http_method.as_deref()),
        quoted(Some(&endpoint_url)),
        response.status_code,
        quoted(request.body.as_deref()),
        response.status_code,
        quoted(Some(&response.body)),
    )
}

/// Epoch millis when known, else the quoted request time.
fn request_time(ctx: &RequestContext) -> String {
    match ctx.request_time_epoch {
        Some(epoch) => epoch.to_string(),
        None => quoted(ctx.request_time.as_deref()),
    }
}

fn quoted(value: Option<&str>) -> String {
    match value {
        Some(v) => format!(
            "'{}'",
            v.replace('\\', "\\\\")
                .replace('\'', "\\'")
                .replace('\n', "\\n")
        ),
        None => "null".to_string(),
    }
}
