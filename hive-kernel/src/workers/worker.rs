//! Worker trait and capability scope

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

use hive_kv::KvStore;

use crate::error::KernelResult;
use crate::workers::store::WorkerStore;

/// The runtime execution of one job on one member
///
/// Created when the job id appears in the local ledger entry, stopped and
/// dropped when it disappears or the member shuts down. Implementations
/// track their own started flag; `start` and `stop` must be idempotent
/// enough to tolerate the supervisor's self-healing restart pass.
#[async_trait]
pub trait Worker: Send + Sync {
    fn id(&self) -> &str;
    async fn start(&self) -> KernelResult<()>;
    async fn stop(&self) -> KernelResult<()>;
    fn is_started(&self) -> bool;
}

/// Capability object handed to a worker at creation
///
/// Carries the worker's id and payload plus its private durable facilities:
/// a job-scoped checkpoint and an arbitrary keyed data namespace, both
/// backed by the KV facade. Composite workers derive isolated child scopes
/// with [`WorkerScope::child`].
#[derive(Clone)]
pub struct WorkerScope {
    worker_id: String,
    payload: Vec<u8>,
    kv: Arc<dyn KvStore>,
    store: WorkerStore,
}

impl WorkerScope {
    pub fn new(cluster: impl Into<String>, worker_id: impl Into<String>, payload: Vec<u8>, kv: Arc<dyn KvStore>) -> Self {
        let cluster = cluster.into();
        Self {
            worker_id: worker_id.into(),
            payload,
            store: WorkerStore::new(cluster, Arc::clone(&kv)),
            kv,
        }
    }

    pub fn id(&self) -> &str {
        &self.worker_id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Direct access to the shared store, for workers that manage keys of
    /// their own
    pub fn kv(&self) -> &Arc<dyn KvStore> {
        &self.kv
    }

    /// Same worker, different payload (used by dispatching factories after
    /// stripping the envelope prefix)
    pub(crate) fn with_payload(&self, payload: Vec<u8>) -> Self {
        let mut scope = self.clone();
        scope.payload = payload;
        scope
    }

    /// Scope for a named sub-worker of a composite, with isolated
    /// checkpoint/data namespaces
    pub fn child(&self, sub_id: &str, payload: Vec<u8>) -> Self {
        let mut scope = self.clone();
        scope.worker_id = format!("{}-{}", self.worker_id, sub_id);
        scope.payload = payload;
        scope
    }

    pub async fn put_checkpoint<T: Serialize + Sync>(&self, checkpoint: &T) -> KernelResult<()> {
        self.store.put_checkpoint(&self.worker_id, checkpoint).await
    }

    pub async fn get_checkpoint<T: DeserializeOwned>(&self) -> KernelResult<Option<T>> {
        self.store.get_checkpoint(&self.worker_id).await
    }

    pub async fn put_data<T: Serialize + Sync>(&self, row_id: &str, data: &T) -> KernelResult<()> {
        self.store.put_data(&self.worker_id, row_id, data).await
    }

    pub async fn get_data<T: DeserializeOwned>(&self, row_id: &str) -> KernelResult<Option<T>> {
        self.store.get_data(&self.worker_id, row_id).await
    }

    pub async fn delete_data(&self, row_id: &str) -> KernelResult<bool> {
        self.store.delete_data(&self.worker_id, row_id).await
    }
}
