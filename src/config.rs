use std::str::FromStr;
use std::sync::Arc;
use std::{env, fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;

use crate::bulk_dispatch::BulkDispatchConfig;
use crate::hit_counter::HitCounterBackend;
use crate::query::{QueryConfig, DEFAULT_PAGE_SIZE};

#[derive(Debug, Clone)]
pub struct Config {
    pub region: Arc<str>,
    pub index_prefix: Arc<str>,
    /// Domain host the bulk request is signed for.
    pub opensearch_host: Option<Arc<str>>,
    pub opensearch_endpoint: Option<Arc<str>>,
    pub http_timeout_secs: u64,
    pub signing_debug: bool,
    pub log_failed_items: bool,
    pub log_processor_arn: Option<Arc<str>>,
    pub exclude_log_groups: Vec<Arc<str>>,
    pub search_url: Option<Arc<str>>,
    pub search_username: Option<Arc<str>>,
    pub search_password: Option<Arc<str>>,
    pub page_size: u32,
    pub hit_counter_backend: HitCounterBackend,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    region: String,
    #[serde(default = "default_index_prefix")]
    index_prefix: String,
    opensearch_host: Option<String>,
    opensearch_endpoint: Option<String>,
    #[serde(default = "default_http_timeout_secs")]
    http_timeout_secs: u64,
    #[serde(default)]
    signing_debug: bool,
    #[serde(default)]
    log_failed_items: bool,
    log_processor_arn: Option<String>,
    #[serde(default)]
    exclude_log_groups: Vec<String>,
    search_url: Option<String>,
    #[serde(default = "default_page_size")]
    page_size: u32,
    hit_counter_backend: Option<String>,
}

fn default_index_prefix() -> String {
    "cwl".into()
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl TryFrom<RawConfig> for Config {
    type Error = anyhow::Error;

    fn try_from(raw: RawConfig) -> Result<Self> {
        let hit_counter_backend = match raw.hit_counter_backend.as_deref() {
            Some(v) => v.parse()?,
            None => HitCounterBackend::default(),
        };
        Ok(Self {
            region: raw.region.into(),
            index_prefix: raw.index_prefix.into(),
            opensearch_host: non_empty(raw.opensearch_host),
            opensearch_endpoint: non_empty(raw.opensearch_endpoint),
            http_timeout_secs: raw.http_timeout_secs,
            signing_debug: raw.signing_debug,
            log_failed_items: raw.log_failed_items,
            log_processor_arn: non_empty(raw.log_processor_arn),
            exclude_log_groups: collect_list(raw.exclude_log_groups),
            search_url: non_empty(raw.search_url),
            search_username: None,
            search_password: None,
            page_size: raw.page_size,
            hit_counter_backend,
        })
    }
}

impl Config {
    /// File (explicit path, else the per-user default if present), else environment;
    /// environment variables override either way. Search credentials only ever come
    /// from the environment.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut cfg = if let Some(path) = path {
            Self::from_file(path)?
        } else {
            let default_path = default_config_path();
            if default_path.exists() {
                Self::from_file(default_path)?
            } else {
                Self::default_from_env()?
            }
        };

        if let Ok(v) = env::var("AWS_REGION") {
            cfg.region = v.into();
        }
        if let Ok(v) = env::var("INDEX_PREFIX") {
            cfg.index_prefix = v.into();
        }
        maybe_env_str(&mut cfg.opensearch_host, "OPENSEARCH_URL");
        maybe_env_str(&mut cfg.opensearch_endpoint, "OPENSEARCH_ENDPOINT");
        maybe_env_str(&mut cfg.log_processor_arn, "LOG_PROCESSOR_LAMBDA_ARN");
        maybe_env_str(&mut cfg.search_url, "OPENSEARCH_SEARCH_URL");
        maybe_env_str(&mut cfg.search_username, "OPENSEARCH_USERNAME");
        maybe_env_str(&mut cfg.search_password, "OPENSEARCH_PASSWORD");
        maybe_env_parse(&mut cfg.http_timeout_secs, "HTTP_TIMEOUT_SECS");
        maybe_env_parse(&mut cfg.page_size, "PAGE_SIZE");
        maybe_env_bool(&mut cfg.signing_debug, "SIGNING_DEBUG");
        maybe_env_bool(&mut cfg.log_failed_items, "LOG_FAILED_ITEMS");
        if let Ok(v) = env::var("SUBSCRIPTION_EXCLUDE_LOG_GROUPS") {
            cfg.exclude_log_groups = parse_list(&v);
        }
        if let Ok(v) = env::var("HIT_COUNTER_BACKEND") {
            cfg.hit_counter_backend = v.parse()?;
        }
        validate_required(&cfg)?;
        Ok(cfg)
    }

    fn from_file(path: PathBuf) -> Result<Self> {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Config::try_from(toml::from_str::<RawConfig>(&raw)?)
    }

    fn default_from_env() -> Result<Self> {
        Ok(Self {
            region: env_required("AWS_REGION")?.into(),
            index_prefix: env::var("INDEX_PREFIX")
                .unwrap_or_else(|_| default_index_prefix())
                .into(),
            opensearch_host: None,
            opensearch_endpoint: None,
            http_timeout_secs: default_http_timeout_secs(),
            signing_debug: false,
            log_failed_items: false,
            log_processor_arn: None,
            exclude_log_groups: Vec::new(),
            search_url: None,
            search_username: None,
            search_password: None,
            page_size: DEFAULT_PAGE_SIZE,
            hit_counter_backend: HitCounterBackend::default(),
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn bulk_dispatch(&self) -> Result<BulkDispatchConfig> {
        let host = self
            .opensearch_host
            .as_deref()
            .context("OPENSEARCH_URL is required for ingestion")?;
        Ok(BulkDispatchConfig {
            host: host.to_string(),
            endpoint: self.opensearch_endpoint.as_deref().map(str::to_string),
            timeout: self.http_timeout(),
            log_failed_items: self.log_failed_items,
        })
    }

    pub fn query(&self) -> QueryConfig {
        QueryConfig {
            search_url: self.search_url.as_deref().map(str::to_string),
            username: self.search_username.as_deref().map(str::to_string),
            password: self.search_password.as_deref().map(str::to_string),
            page_size: self.page_size,
            timeout: self.http_timeout(),
        }
    }
}

fn default_config_path() -> PathBuf {
    ProjectDirs::from("com", "logforward", "logforward")
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".logforward"))
        .join("config.toml")
}

fn validate_required(cfg: &Config) -> Result<()> {
    if cfg.region.trim().is_empty() {
        anyhow::bail!("AWS_REGION is required (set via env or config)");
    }
    if cfg.index_prefix.trim().is_empty() {
        anyhow::bail!("INDEX_PREFIX is required (set via env or config)");
    }
    if cfg.page_size == 0 {
        anyhow::bail!("PAGE_SIZE must be positive");
    }
    Ok(())
}

fn non_empty(v: Option<String>) -> Option<Arc<str>> {
    v.map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(Arc::from)
}

fn maybe_env_str(val: &mut Option<Arc<str>>, key: &str) {
    if let Ok(v) = env::var(key) {
        if !v.trim().is_empty() {
            *val = Some(v.trim().into());
        }
    }
}

/// Unparseable values leave the current setting in place.
fn maybe_env_parse<T: FromStr>(val: &mut T, key: &str) {
    if let Some(parsed) = env::var(key).ok().and_then(|v| v.trim().parse().ok()) {
        *val = parsed;
    }
}

fn maybe_env_bool(val: &mut bool, key: &str) {
    if let Ok(v) = env::var(key) {
        *val = matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
    }
}

fn env_required(key: &str) -> Result<String> {
    let val = env::var(key).unwrap_or_default();
    if val.trim().is_empty() {
        anyhow::bail!("{key} is required");
    }
    Ok(val)
}

fn collect_list(items: Vec<String>) -> Vec<Arc<str>> {
    items
        .into_iter()
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty())
        .map(Arc::from)
        .collect()
}

fn parse_list(raw: &str) -> Vec<Arc<str>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Arc::from)
        .collect()
}
