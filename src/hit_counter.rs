//! Hit counter with a pluggable backend.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::types::ApiResponse;

pub const HITS_KEY: &str = "0";

/// Persistent counter storage. Relational or table-backed stores implement this.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<u64>>;
    async fn put(&self, key: &str, value: u64) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    values: Mutex<HashMap<String, u64>>,
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<u64>> {
        let values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("counter store lock poisoned"))?;
        Ok(values.get(key).copied())
    }

    async fn put(&self, key: &str, value: u64) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("counter store lock poisoned"))?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

#[async_trait]
pub trait HitCounter: Send + Sync {
    /// Count one hit and return the new total.
    async fn record_hit(&self) -> Result<u64>;
}

pub struct KeyValueHitCounter {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl KeyValueHitCounter {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            key: HITS_KEY.to_string(),
        }
    }
}

#[async_trait]
impl HitCounter for KeyValueHitCounter {
    async fn record_hit(&self) -> Result<u64> {
        let next = self.store.get(&self.key).await?.unwrap_or(0) + 1;
        self.store.put(&self.key, next).await?;
        Ok(next)
    }
}

/// Fixed count, for environments without a counter store.
#[derive(Debug, Clone, Copy)]
pub struct StubHitCounter {
    pub value: u64,
}

#[async_trait]
impl HitCounter for StubHitCounter {
    async fn record_hit(&self) -> Result<u64> {
        Ok(self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HitCounterBackend {
    #[default]
    KeyValue,
    Stub,
}

impl FromStr for HitCounterBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "key_value" | "kv" | "dynamo" => Ok(Self::KeyValue),
            "stub" => Ok(Self::Stub),
            other => anyhow::bail!("unknown hit counter backend `{other}`"),
        }
    }
}

pub fn build_hit_counter(
    backend: HitCounterBackend,
    store: Arc<dyn KeyValueStore>,
) -> Arc<dyn HitCounter> {
    match backend {
        HitCounterBackend::KeyValue => Arc::new(KeyValueHitCounter::new(store)),
        HitCounterBackend::Stub => Arc::new(StubHitCounter { value: 1 }),
    }
}

pub async fn hit_handler(counter: &dyn HitCounter) -> Result<ApiResponse> {
    let hits = counter.record_hit().await?;
    info!("hit counter at {hits}");
    Ok(ApiResponse {
        status_code: 200,
        body: format!("You've hit URL {hits} times!"),
    })
}
