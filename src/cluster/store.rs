//! Persistence seam for the cluster info a driver returns
//!
//! The facade keeps the [`ClusterInfo`] produced by `Create`/`PostCheck` so
//! later `Update` and `Remove` calls can hand it back to the driver.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::proto::ClusterInfo;
use crate::Result;

/// Storage for per-cluster driver state, keyed by cluster name
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Load the stored info for `cluster`, if any
    async fn get(&self, cluster: &str) -> Result<Option<ClusterInfo>>;

    /// Store (or replace) the info for `cluster`
    async fn store(&self, cluster: &str, info: ClusterInfo) -> Result<()>;

    /// Forget `cluster`; removing an unknown cluster is not an error
    async fn remove(&self, cluster: &str) -> Result<()>;
}

/// Process-local store
#[derive(Default)]
pub struct MemoryClusterStore {
    clusters: Mutex<HashMap<String, ClusterInfo>>,
}

impl MemoryClusterStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClusterStore for MemoryClusterStore {
    async fn get(&self, cluster: &str) -> Result<Option<ClusterInfo>> {
        Ok(self.clusters.lock().get(cluster).cloned())
    }

    async fn store(&self, cluster: &str, info: ClusterInfo) -> Result<()> {
        self.clusters.lock().insert(cluster.to_string(), info);
        Ok(())
    }

    async fn remove(&self, cluster: &str) -> Result<()> {
        self.clusters.lock().remove(cluster);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_get_remove() {
        let store = MemoryClusterStore::new();
        assert_eq!(store.get("c1").await.unwrap(), None);

        let info = ClusterInfo {
            endpoint: "https://10.0.0.1".to_string(),
            ..Default::default()
        };
        store.store("c1", info.clone()).await.unwrap();
        assert_eq!(store.get("c1").await.unwrap(), Some(info));

        store.remove("c1").await.unwrap();
        store.remove("c1").await.unwrap();
        assert_eq!(store.get("c1").await.unwrap(), None);
    }
}
