//! Per-worker durable storage: checkpoints and keyed data

use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

use hive_kv::{KvStore, KvStoreExt};

use crate::error::KernelResult;
use crate::keys;

/// KV access for worker checkpoints and arbitrary keyed rows
///
/// Everything is namespaced by worker id, so sub-workers of a composite get
/// isolated storage through their composite ids.
#[derive(Clone)]
pub struct WorkerStore {
    cluster: String,
    kv: Arc<dyn KvStore>,
}

impl WorkerStore {
    pub fn new(cluster: impl Into<String>, kv: Arc<dyn KvStore>) -> Self {
        Self {
            cluster: cluster.into(),
            kv,
        }
    }

    pub async fn put_checkpoint<T: Serialize + Sync>(&self, worker_id: &str, checkpoint: &T) -> KernelResult<()> {
        self.kv
            .put_json(&keys::checkpoint(&self.cluster, worker_id), checkpoint)
            .await?;
        Ok(())
    }

    pub async fn get_checkpoint<T: DeserializeOwned>(&self, worker_id: &str) -> KernelResult<Option<T>> {
        Ok(self.kv.get_json(&keys::checkpoint(&self.cluster, worker_id)).await?)
    }

    pub async fn put_data<T: Serialize + Sync>(&self, worker_id: &str, row_id: &str, data: &T) -> KernelResult<()> {
        self.kv
            .put_json(&keys::data(&self.cluster, worker_id, row_id), data)
            .await?;
        Ok(())
    }

    pub async fn get_data<T: DeserializeOwned>(&self, worker_id: &str, row_id: &str) -> KernelResult<Option<T>> {
        Ok(self.kv.get_json(&keys::data(&self.cluster, worker_id, row_id)).await?)
    }

    pub async fn delete_data(&self, worker_id: &str, row_id: &str) -> KernelResult<bool> {
        Ok(self.kv.delete(&keys::data(&self.cluster, worker_id, row_id)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_kv::MemoryStore;

    #[tokio::test]
    async fn test_checkpoint_survives_worker_restart() {
        let store = WorkerStore::new("c1", Arc::new(MemoryStore::new()));

        store.put_checkpoint("w1", &(12u64, 3u32)).await.unwrap();

        // A restarted worker with the same id resumes from the cursor.
        let resumed: Option<(u64, u32)> = store.get_checkpoint("w1").await.unwrap();
        assert_eq!(resumed, Some((12, 3)));

        let other: Option<(u64, u32)> = store.get_checkpoint("w2").await.unwrap();
        assert_eq!(other, None);
    }

    #[tokio::test]
    async fn test_data_rows_are_isolated_per_worker() {
        let store = WorkerStore::new("c1", Arc::new(MemoryStore::new()));

        store.put_data("w1", "r1", &"one").await.unwrap();
        store.put_data("w2", "r1", &"two").await.unwrap();

        let w1: Option<String> = store.get_data("w1", "r1").await.unwrap();
        assert_eq!(w1, Some("one".to_string()));

        assert!(store.delete_data("w1", "r1").await.unwrap());
        let gone: Option<String> = store.get_data("w1", "r1").await.unwrap();
        assert_eq!(gone, None);

        let w2: Option<String> = store.get_data("w2", "r1").await.unwrap();
        assert_eq!(w2, Some("two".to_string()));
    }
}
