//! Watch-driven job registry

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use hive_kv::{KvEventKind, KvStore};

use crate::error::KernelResult;
use crate::jobs::job::Job;
use crate::jobs::store::JobStore;

/// Asynchronous notification from the registry's watches
///
/// Delivery is at-least-once and best-effort ordered: a consumer must
/// tolerate an event describing state it already observed via a direct read.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// A job was created or its payload updated
    JobPut { id: String, payload: Vec<u8> },
    /// A job record was deleted
    JobRemoved { id: String },
    /// The local member's assignment-ledger entry changed
    AssignmentsChanged(Vec<String>),
}

/// Durable storage of job definitions and the assignment ledger,
/// with watch-driven notification of both
///
/// The registry is the sole writer of canonical job state; other components
/// read. `start()` installs a watch on the jobs namespace and one on the
/// local member's ledger entry and returns the event stream.
pub struct JobRegistry {
    store: JobStore,
    local_member_id: String,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl JobRegistry {
    pub fn new(cluster: impl Into<String>, local_member_id: impl Into<String>, kv: Arc<dyn KvStore>) -> Self {
        Self {
            store: JobStore::new(cluster, kv),
            local_member_id: local_member_id.into(),
            tasks: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Generate an id, durably store the job, and return it
    pub async fn add_job(&self, payload: Vec<u8>) -> KernelResult<Job> {
        let job = Job::new(payload);
        self.store.put_job(&job).await?;
        info!("Registered job {}", job.id);
        Ok(job)
    }

    /// Delete the durable job record
    pub async fn remove_job(&self, job_id: &str) -> KernelResult<bool> {
        let removed = self.store.remove_job(job_id).await?;
        if removed {
            info!("Removed job {}", job_id);
        }
        Ok(removed)
    }

    pub async fn get_job(&self, job_id: &str) -> KernelResult<Option<Job>> {
        self.store.get_job(job_id).await
    }

    pub async fn get_all_jobs(&self) -> KernelResult<HashMap<String, Job>> {
        self.store.get_all_jobs().await
    }

    pub async fn get_all_job_ids(&self) -> KernelResult<Vec<String>> {
        self.store.get_all_job_ids().await
    }

    pub async fn get_member_job_ids(&self, member_id: &str) -> KernelResult<Vec<String>> {
        self.store.get_member_job_ids(member_id).await
    }

    pub async fn get_all_member_job_ids(&self) -> KernelResult<HashMap<String, Vec<String>>> {
        self.store.get_all_member_job_ids().await
    }

    /// Overwrite a member's ledger entry; called by the leader only
    pub async fn set_member_job_ids(&self, member_id: &str, job_ids: &[String]) -> KernelResult<()> {
        self.store.put_member_job_ids(member_id, job_ids).await
    }

    /// Resolve a member's assigned ids to stored jobs, skipping ids whose
    /// record has been removed since assignment
    pub async fn get_member_jobs(&self, member_id: &str) -> KernelResult<Vec<Job>> {
        let ids = self.store.get_member_job_ids(member_id).await?;
        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            match self.store.get_job(&id).await? {
                Some(job) => jobs.push(job),
                None => warn!("Assigned job {} has no stored record", id),
            }
        }
        Ok(jobs)
    }

    /// Install both watches and return the event stream
    pub async fn start(&self) -> KernelResult<mpsc::UnboundedReceiver<RegistryEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut job_watch = self.store.watch_jobs().await?;
        let jobs_prefix = self.store.jobs_prefix();
        let job_tx = tx.clone();
        let jobs_task = tokio::spawn(async move {
            while let Some(event) = job_watch.next().await {
                if !event.key.starts_with(&jobs_prefix) {
                    continue;
                }
                let id = event.key[jobs_prefix.len()..].to_string();
                let mapped = match event.kind {
                    KvEventKind::Put => RegistryEvent::JobPut {
                        id,
                        payload: event.value.unwrap_or_default(),
                    },
                    KvEventKind::Delete => RegistryEvent::JobRemoved { id },
                };
                if job_tx.send(mapped).is_err() {
                    break;
                }
            }
            debug!("Job watch task stopped");
        });

        let mut assignment_watch = self.store.watch_member_jobs(&self.local_member_id).await?;
        let member_id = self.local_member_id.clone();
        let assignment_tx = tx;
        let assignments_task = tokio::spawn(async move {
            while let Some(event) = assignment_watch.next().await {
                let ids = match event.value {
                    Some(bytes) => match serde_json::from_slice::<Vec<String>>(&bytes) {
                        Ok(ids) => ids,
                        Err(e) => {
                            warn!("Unparsable assignment list for {}: {}", member_id, e);
                            continue;
                        }
                    },
                    // Entry deleted: nothing assigned.
                    None => Vec::new(),
                };
                if assignment_tx.send(RegistryEvent::AssignmentsChanged(ids)).is_err() {
                    break;
                }
            }
            debug!("Assignment watch task stopped");
        });

        let mut tasks = self.tasks.lock();
        tasks.push(jobs_task);
        tasks.push(assignments_task);

        info!("Job registry watches installed for member {}", self.local_member_id);
        Ok(rx)
    }

    /// Cancel both watches; events already queued are still delivered
    pub fn stop(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        info!("Job registry watches cancelled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_kv::MemoryStore;

    fn registry(kv: Arc<MemoryStore>) -> JobRegistry {
        JobRegistry::new("c1", "m1", kv)
    }

    #[tokio::test]
    async fn test_add_then_get_returns_identical_payload() {
        let registry = registry(Arc::new(MemoryStore::new()));

        let stored = registry.add_job(b"#echo:hello".to_vec()).await.unwrap();
        let loaded = registry.get_job(&stored.id).await.unwrap().unwrap();

        assert_eq!(loaded, stored);
        assert_eq!(loaded.payload, b"#echo:hello".to_vec());
    }

    #[tokio::test]
    async fn test_remove_job() {
        let registry = registry(Arc::new(MemoryStore::new()));
        let job = registry.add_job(b"x".to_vec()).await.unwrap();

        assert!(registry.remove_job(&job.id).await.unwrap());
        assert!(registry.get_job(&job.id).await.unwrap().is_none());
        assert!(!registry.remove_job(&job.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_ledger_roundtrip() {
        let registry = registry(Arc::new(MemoryStore::new()));

        registry
            .set_member_job_ids("m1", &["j1".to_string(), "j2".to_string()])
            .await
            .unwrap();
        registry.set_member_job_ids("m2", &[]).await.unwrap();

        assert_eq!(
            registry.get_member_job_ids("m1").await.unwrap(),
            vec!["j1".to_string(), "j2".to_string()]
        );
        assert_eq!(registry.get_member_job_ids("unknown").await.unwrap(), Vec::<String>::new());

        let ledger = registry.get_all_member_job_ids().await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger["m2"], Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_watch_events() {
        let registry = registry(Arc::new(MemoryStore::new()));
        let mut events = registry.start().await.unwrap();

        let job = registry.add_job(b"payload".to_vec()).await.unwrap();
        match events.recv().await.unwrap() {
            RegistryEvent::JobPut { id, payload } => {
                assert_eq!(id, job.id);
                assert_eq!(payload, b"payload".to_vec());
            }
            other => panic!("unexpected event: {:?}", other),
        }

        registry.set_member_job_ids("m1", &[job.id.clone()]).await.unwrap();
        match events.recv().await.unwrap() {
            RegistryEvent::AssignmentsChanged(ids) => assert_eq!(ids, vec![job.id.clone()]),
            other => panic!("unexpected event: {:?}", other),
        }

        registry.remove_job(&job.id).await.unwrap();
        match events.recv().await.unwrap() {
            RegistryEvent::JobRemoved { id } => assert_eq!(id, job.id),
            other => panic!("unexpected event: {:?}", other),
        }

        registry.stop();
    }

    #[tokio::test]
    async fn test_assignment_watch_ignores_other_members() {
        let registry = registry(Arc::new(MemoryStore::new()));
        let mut events = registry.start().await.unwrap();

        registry.set_member_job_ids("m2", &["j9".to_string()]).await.unwrap();
        registry.set_member_job_ids("m1", &["j1".to_string()]).await.unwrap();

        // Only the local member's entry produces an event.
        match events.recv().await.unwrap() {
            RegistryEvent::AssignmentsChanged(ids) => assert_eq!(ids, vec!["j1".to_string()]),
            other => panic!("unexpected event: {:?}", other),
        }

        registry.stop();
    }

    #[tokio::test]
    async fn test_get_member_jobs_skips_missing_records() {
        let registry = registry(Arc::new(MemoryStore::new()));
        let job = registry.add_job(b"keep".to_vec()).await.unwrap();

        registry
            .set_member_job_ids("m1", &[job.id.clone(), "gone".to_string()])
            .await
            .unwrap();

        let jobs = registry.get_member_jobs("m1").await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, job.id);
    }
}
