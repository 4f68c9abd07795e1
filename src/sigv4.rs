//! AWS Signature Version 4 request signing, built directly on SHA-256.
//!
//! The signing key is derived as a chain of HMACs
//! `secret -> date -> region -> service -> "aws4_request"` and the final signature is
//! the HMAC of the string-to-sign under that key. Nothing here logs the secret or a
//! derived key; transcripts (canonical request, string-to-sign) are logged at debug
//! level only when explicitly enabled.

use std::env;
use std::fmt;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const TERMINATOR: &str = "aws4_request";
const HMAC_BLOCK: usize = 64;
const HOST_SUFFIX: &str = ".amazonaws.com";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignerError {
    #[error("endpoint host `{0}` is not of the form <domain>.<region>.<service>.amazonaws.com")]
    MalformedHost(String),
    #[error("{0} is required for request signing")]
    MissingCredential(&'static str),
}

#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    secret_access_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        }
    }

    /// Ambient credentials of the execution role. All three values must be present.
    pub fn from_env() -> Result<Self, SignerError> {
        Ok(Self::new(
            env_credential("AWS_ACCESS_KEY_ID")?,
            env_credential("AWS_SECRET_ACCESS_KEY")?,
            Some(env_credential("AWS_SESSION_TOKEN")?),
        ))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn env_credential(key: &'static str) -> Result<String, SignerError> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(SignerError::MissingCredential(key)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl SignedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct RequestSigner {
    credentials: Credentials,
    region: String,
    service: String,
    debug_transcripts: bool,
}

impl RequestSigner {
    pub fn with_scope(
        credentials: Credentials,
        region: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            region: region.into(),
            service: service.into(),
            debug_transcripts: false,
        }
    }

    /// Signer whose region and service come from the endpoint host name.
    pub fn for_host(credentials: Credentials, host: &str) -> Result<Self, SignerError> {
        let (region, service) = scope_from_host(host)?;
        Ok(Self::with_scope(credentials, region, service))
    }

    pub fn debug_transcripts(mut self, enabled: bool) -> Self {
        self.debug_transcripts = enabled;
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Sign a request. `X-Amz-Date` is set from `now`, and the session token header is
    /// added when the credentials carry one.
    pub fn sign(
        &self,
        method: &str,
        path: &str,
        headers: Vec<(String, String)>,
        body: impl Into<String>,
        now: DateTime<Utc>,
    ) -> SignedRequest {
        let body = body.into();
        let datetime = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = &datetime[..8];

        let mut headers: Vec<(String, String)> = headers
            .into_iter()
            .filter(|(k, _)| !k.eq_ignore_ascii_case("x-amz-date"))
            .collect();
        headers.push(("X-Amz-Date".into(), datetime.clone()));
        if let Some(token) = &self.credentials.session_token {
            if !headers
                .iter()
                .any(|(k, _)| k.eq_ignore_ascii_case("x-amz-security-token"))
            {
                headers.push(("X-Amz-Security-Token".into(), token.clone()));
            }
        }

        let (canonical, signed_headers) = canonical_request(method, path, &headers, &body);
        let scope = format!("{}/{}/{}/{}", date, self.region, self.service, TERMINATOR);
        let to_sign = string_to_sign(&datetime, &scope, &canonical);
        if self.debug_transcripts {
            debug!("sigv4 canonical request:\n{canonical}");
            debug!("sigv4 string to sign:\n{to_sign}");
        }

        let key = derive_signing_key(
            &self.credentials.secret_access_key,
            date,
            &self.region,
            &self.service,
        );
        let signature = hex::encode(hmac_sha256(&key, to_sign.as_bytes()));
        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, self.credentials.access_key_id, scope, signed_headers, signature
        );
        headers.push(("Authorization".into(), authorization));

        SignedRequest {
            method: method.to_string(),
            path: path.to_string(),
            headers,
            body,
        }
    }
}

/// `<domain>.<region>.<service>.amazonaws.com` -> `(region, service)`.
pub fn scope_from_host(host: &str) -> Result<(String, String), SignerError> {
    let malformed = || SignerError::MalformedHost(host.to_string());
    let prefix = host.strip_suffix(HOST_SUFFIX).ok_or_else(malformed)?;
    let parts: Vec<&str> = prefix.split('.').collect();
    match parts.as_slice() {
        [domain, region, service]
            if !domain.is_empty() && !region.is_empty() && !service.is_empty() =>
        {
            Ok((region.to_string(), service.to_string()))
        }
        _ => Err(malformed()),
    }
}

/// Returns the canonical request and the signed header list.
pub fn canonical_request(
    method: &str,
    path: &str,
    headers: &[(String, String)],
    body: &str,
) -> (String, String) {
    let mut lowered: Vec<(String, &str)> = headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.as_str()))
        .collect();
    lowered.sort_by(|a, b| a.0.cmp(&b.0));

    let canonical_headers = lowered
        .iter()
        .map(|(k, v)| format!("{k}:{v}"))
        .collect::<Vec<_>>()
        .join("\n");
    let signed_headers = lowered
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical = [
        method,
        path,
        "",
        &canonical_headers,
        "",
        &signed_headers,
        &sha256_hex(body.as_bytes()),
    ]
    .join("\n");
    (canonical, signed_headers)
}

pub fn string_to_sign(datetime: &str, scope: &str, canonical_request: &str) -> String {
    [
        ALGORITHM,
        datetime,
        scope,
        &sha256_hex(canonical_request.as_bytes()),
    ]
    .join("\n")
}

pub fn derive_signing_key(secret: &str, date: &str, region: &str, service: &str) -> [u8; 32] {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, TERMINATOR.as_bytes())
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// HMAC-SHA256 (RFC 2104).
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut block = [0u8; HMAC_BLOCK];
    if key.len() > HMAC_BLOCK {
        block[..32].copy_from_slice(&Sha256::digest(key));
    } else {
        block[..key.len()].copy_from_slice(key);
    }

    let mut inner = Sha256::new();
    inner.update(block.map(|b| b ^ 0x36));
    inner.update(data);
    let inner_hash = inner.finalize();

    let mut outer = Sha256::new();
    outer.update(block.map(|b| b ^ 0x5c));
    outer.update(inner_hash);

    let mut out = [0u8; 32];
    out.copy_from_slice(&outer.finalize());
    out
}
