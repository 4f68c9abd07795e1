use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Basic-auth JSON client for the search store's query API.
#[derive(Clone)]
pub struct SearchHttp {
    client: Client,
    user: Arc<str>,
    pass: Arc<str>,
}

impl SearchHttp {
    pub fn new(
        user: impl Into<Arc<str>>,
        pass: impl Into<Arc<str>>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            user: user.into(),
            pass: pass.into(),
        })
    }

    /// POST `body` to `url` and decode a 2xx JSON response. Other statuses fail with
    /// a sample of the response body.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        body: &Value,
        context: &'static str,
    ) -> Result<T> {
        let resp = self
            .client
            .post(url)
            .basic_auth(&*self.user, Some(&*self.pass))
            .json(body)
            .send()
            .await
            .context(context)?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!(
                "{context} status={status} body_sample={}",
                truncate_body_snippet(&text, 500)
            );
        }
        resp.json().await.context(context)
    }
}

/// Cut `s` to at most `max_len` bytes on a char boundary.
pub(crate) fn truncate_body_snippet(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}
