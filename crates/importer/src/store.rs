//! Durable storage of imported MCP server configurations.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use unrelated_openapi_tools::McpServerConfig;

#[derive(Error, Debug)]
pub enum StoreError {
    /// A configuration with this name already exists. `create` never overwrites.
    #[error("MCP server '{name}' already exists")]
    Conflict { name: String },

    /// The store refused the configuration.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// The backend could not be reached or failed.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl StoreError {
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Keyed storage of configurations (key = configuration name).
///
/// `create` must be safe to call concurrently; for the same name the first successful writer
/// wins and every other caller gets [`StoreError::Conflict`].
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn create(
        &self,
        ctx: &CancellationToken,
        config: &McpServerConfig,
    ) -> Result<(), StoreError>;

    async fn get(&self, name: &str) -> Result<Option<McpServerConfig>, StoreError>;

    /// All stored configurations, ordered by name.
    async fn list(&self) -> Result<Vec<McpServerConfig>, StoreError>;
}

pub(crate) fn validate_for_store(config: &McpServerConfig) -> Result<(), StoreError> {
    if config.name.trim().is_empty() {
        return Err(StoreError::Invalid("name must be non-empty".to_string()));
    }
    Ok(())
}

/// In-process store for single-node deployments and tests.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    configs: RwLock<HashMap<String, McpServerConfig>>,
}

impl MemoryConfigStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.configs.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.configs.read().is_empty()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn create(
        &self,
        ctx: &CancellationToken,
        config: &McpServerConfig,
    ) -> Result<(), StoreError> {
        if ctx.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        validate_for_store(config)?;

        let mut configs = self.configs.write();
        if configs.contains_key(&config.name) {
            return Err(StoreError::Conflict {
                name: config.name.clone(),
            });
        }
        configs.insert(config.name.clone(), config.clone());
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<McpServerConfig>, StoreError> {
        Ok(self.configs.read().get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<McpServerConfig>, StoreError> {
        let mut out: Vec<_> = self.configs.read().values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn cfg(name: &str) -> McpServerConfig {
        McpServerConfig {
            name: name.to_string(),
            tenant: "default".to_string(),
            prefix: format!("/{name}"),
            base_url: None,
            tools: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn create_rejects_existing_name_without_overwriting() {
        let store = MemoryConfigStore::new();
        let ctx = CancellationToken::new();

        store.create(&ctx, &cfg("a")).await.unwrap();
        let mut other = cfg("a");
        other.tenant = "other".to_string();
        let err = store.create(&ctx, &other).await.unwrap_err();
        assert!(err.is_conflict());

        let stored = store.get("a").await.unwrap().unwrap();
        assert_eq!(stored.tenant, "default");
    }

    #[tokio::test]
    async fn cancelled_context_writes_nothing() {
        let store = MemoryConfigStore::new();
        let ctx = CancellationToken::new();
        ctx.cancel();

        let err = store.create(&ctx, &cfg("a")).await.unwrap_err();
        assert!(matches!(err, StoreError::Cancelled));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn rejects_blank_names() {
        let store = MemoryConfigStore::new();
        let err = store
            .create(&CancellationToken::new(), &cfg(" "))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[tokio::test]
    async fn list_is_sorted_by_name() {
        let store = MemoryConfigStore::new();
        let ctx = CancellationToken::new();
        for name in ["c", "a", "b"] {
            store.create(&ctx, &cfg(name)).await.unwrap();
        }
        let names: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_of_same_name_have_one_winner() {
        let store = Arc::new(MemoryConfigStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.create(&CancellationToken::new(), &cfg("same")).await
            }));
        }

        let mut ok = 0;
        let mut conflicts = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(()) => ok += 1,
                Err(e) if e.is_conflict() => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(conflicts, 15);
        assert_eq!(store.len(), 1);
    }
}
