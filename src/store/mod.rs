mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::{sleep, Duration};

/// Blob keys used by the orchestrator. The store itself is key-agnostic;
/// these are the names the controller reads and writes.
pub const KEY_SESSION: &str = "session";
pub const KEY_CONFIG: &str = "config";
pub const KEY_HISTORY: &str = "history";
pub const KEY_TIMEOUT_PROFILES: &str = "timeout_profiles";

const RETRY_BACKOFF_MS: u64 = 250;

/// Async key-value persistence of named blobs. No transactional
/// guarantees: concurrent external mutation is last-write-wins.
#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>>;
    async fn set_raw(&self, key: &str, value: String) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Load and deserialize a blob; `None` when the key is absent.
pub async fn load<T, S>(store: &S, key: &str) -> Result<Option<T>>
where
    T: DeserializeOwned,
    S: StateStore + ?Sized,
{
    match store.get_raw(key).await? {
        Some(raw) => {
            let value = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse stored blob '{}'", key))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Serialize and store a blob. Failures propagate; use for
/// session-critical state.
pub async fn save<T, S>(store: &S, key: &str, value: &T) -> Result<()>
where
    T: Serialize + Sync,
    S: StateStore + ?Sized,
{
    let raw = serde_json::to_string(value)
        .with_context(|| format!("Failed to serialize blob '{}'", key))?;
    store.set_raw(key, raw).await
}

/// Best-effort write for telemetry-grade blobs (history, timeout
/// profiles): one retry after a short backoff, then a warning. Never
/// fails the caller.
pub async fn save_with_retry<T, S>(store: &S, key: &str, value: &T)
where
    T: Serialize + Sync,
    S: StateStore + ?Sized,
{
    if let Err(first) = save(store, key, value).await {
        tracing::debug!("Write of '{}' failed, retrying: {}", key, first);
        sleep(Duration::from_millis(RETRY_BACKOFF_MS)).await;
        if let Err(second) = save(store, key, value).await {
            tracing::warn!("Dropping write of '{}' after retry: {}", key, second);
        }
    }
}
