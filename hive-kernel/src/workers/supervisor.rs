//! Worker-set reconciliation

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use hive_kv::KvStore;

use crate::workers::factory::WorkerFactory;
use crate::workers::worker::{Worker, WorkerScope};

/// Converges the running worker set to the jobs assigned to this member
///
/// [`WorkerSupervisor::set_assigned_jobs`] is the sole externally driven
/// mutation, invoked from the assignment-watch handler; the worker map has a
/// single writer by construction.
pub struct WorkerSupervisor {
    cluster: String,
    member_id: String,
    kv: Arc<dyn KvStore>,
    factory: Arc<dyn WorkerFactory>,
    workers: Mutex<HashMap<String, Box<dyn Worker>>>,
}

impl WorkerSupervisor {
    pub fn new(
        cluster: impl Into<String>,
        member_id: impl Into<String>,
        kv: Arc<dyn KvStore>,
        factory: Arc<dyn WorkerFactory>,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            member_id: member_id.into(),
            kv,
            factory,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Reconcile the running worker set against the new assignment
    ///
    /// Jobs in both the old and new set keep their worker untouched; workers
    /// for jobs no longer assigned are stopped and dropped; new jobs get a
    /// worker instantiated and started. A factory error skips that job until
    /// the next reconciliation; a start error leaves the worker in the set,
    /// to be retried by the self-healing pass of a later reconciliation.
    pub async fn set_assigned_jobs(&self, jobs: HashMap<String, Vec<u8>>) {
        info!("Reconciling worker set of {}: {} assigned jobs", self.member_id, jobs.len());

        let mut workers = self.workers.lock().await;
        let mut previous = std::mem::take(&mut *workers);

        for (job_id, payload) in jobs {
            if let Some(worker) = previous.remove(&job_id) {
                workers.insert(job_id, worker);
                continue;
            }

            let scope = WorkerScope::new(self.cluster.clone(), job_id.clone(), payload, Arc::clone(&self.kv));
            match self.factory.create(scope).await {
                Ok(worker) => {
                    info!("Created worker for job {}", job_id);
                    workers.insert(job_id, worker);
                }
                Err(e) => {
                    // Skipped for this pass; the next assignment change or
                    // redistribution retries.
                    error!("Cannot create worker for job {}: {}", job_id, e);
                }
            }
        }

        for (job_id, worker) in previous {
            if let Err(e) = worker.stop().await {
                warn!("Worker for job {} failed to stop: {}", job_id, e);
            }
            info!("Disposed worker for job {}", job_id);
        }

        // Self-healing: (re)start anything not currently running, including
        // retained workers left stopped by an earlier failure.
        for (job_id, worker) in workers.iter() {
            if !worker.is_started() {
                match worker.start().await {
                    Ok(()) => info!("Started worker for job {}", job_id),
                    Err(e) => error!("Worker for job {} failed to start, will retry: {}", job_id, e),
                }
            }
        }
    }

    /// Stop and drop every running worker
    pub async fn shutdown(&self) {
        let mut workers = self.workers.lock().await;
        for (job_id, worker) in workers.drain() {
            if worker.is_started() {
                if let Err(e) = worker.stop().await {
                    warn!("Worker for job {} failed to stop: {}", job_id, e);
                }
            }
        }
        info!("Worker supervisor for {} shut down", self.member_id);
    }

    /// Ids of jobs with a live worker, sorted
    pub async fn running_job_ids(&self) -> Vec<String> {
        let workers = self.workers.lock().await;
        let mut ids: Vec<String> = workers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }
}
