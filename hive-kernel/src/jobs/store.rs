//! Durable job and assignment-ledger records

use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use hive_kv::{KvStore, KvStoreExt, Watch};

use crate::error::KernelResult;
use crate::jobs::job::Job;
use crate::keys;

/// KV access for job definitions and per-member assignment lists
///
/// Job payloads are stored raw; assignment lists are JSON id arrays.
#[derive(Clone)]
pub struct JobStore {
    cluster: String,
    kv: Arc<dyn KvStore>,
}

impl JobStore {
    pub fn new(cluster: impl Into<String>, kv: Arc<dyn KvStore>) -> Self {
        Self {
            cluster: cluster.into(),
            kv,
        }
    }

    pub async fn put_job(&self, job: &Job) -> KernelResult<()> {
        self.kv
            .put(&keys::job(&self.cluster, &job.id), job.payload.clone())
            .await?;
        Ok(())
    }

    pub async fn get_job(&self, job_id: &str) -> KernelResult<Option<Job>> {
        let value = self.kv.get(&keys::job(&self.cluster, job_id)).await?;
        Ok(value.map(|payload| Job::with_id(job_id, payload)))
    }

    pub async fn remove_job(&self, job_id: &str) -> KernelResult<bool> {
        Ok(self.kv.delete(&keys::job(&self.cluster, job_id)).await?)
    }

    pub async fn get_all_job_ids(&self) -> KernelResult<Vec<String>> {
        let prefix = keys::jobs_prefix(&self.cluster);
        let pairs = self.kv.get_prefix(&prefix).await?;
        Ok(pairs.into_iter().map(|p| p.key[prefix.len()..].to_string()).collect())
    }

    pub async fn get_all_jobs(&self) -> KernelResult<HashMap<String, Job>> {
        let prefix = keys::jobs_prefix(&self.cluster);
        let pairs = self.kv.get_prefix(&prefix).await?;
        Ok(pairs
            .into_iter()
            .map(|p| {
                let id = p.key[prefix.len()..].to_string();
                (id.clone(), Job::with_id(id, p.value))
            })
            .collect())
    }

    pub async fn get_member_job_ids(&self, member_id: &str) -> KernelResult<Vec<String>> {
        let ids: Option<Vec<String>> = self
            .kv
            .get_json(&keys::assignment(&self.cluster, member_id))
            .await?;
        Ok(ids.unwrap_or_default())
    }

    pub async fn get_all_member_job_ids(&self) -> KernelResult<HashMap<String, Vec<String>>> {
        let prefix = keys::assignments_prefix(&self.cluster);
        let pairs = self.kv.get_prefix(&prefix).await?;

        let mut ledger = HashMap::with_capacity(pairs.len());
        for pair in pairs {
            let member_id = pair.key[prefix.len()..].to_string();
            match serde_json::from_slice::<Vec<String>>(&pair.value) {
                Ok(ids) => {
                    ledger.insert(member_id, ids);
                }
                Err(e) => warn!("Skipping unparsable assignment list for {}: {}", member_id, e),
            }
        }
        Ok(ledger)
    }

    pub async fn put_member_job_ids(&self, member_id: &str, job_ids: &[String]) -> KernelResult<()> {
        self.kv
            .put_json(&keys::assignment(&self.cluster, member_id), &job_ids)
            .await?;
        Ok(())
    }

    pub async fn watch_jobs(&self) -> KernelResult<Watch> {
        Ok(self.kv.watch_prefix(&keys::jobs_prefix(&self.cluster)).await?)
    }

    pub async fn watch_member_jobs(&self, member_id: &str) -> KernelResult<Watch> {
        Ok(self.kv.watch(&keys::assignment(&self.cluster, member_id)).await?)
    }

    pub(crate) fn jobs_prefix(&self) -> String {
        keys::jobs_prefix(&self.cluster)
    }
}
