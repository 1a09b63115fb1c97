//! Kernel wiring
//!
//! Constructs the coordinator, registry, and supervisor around one shared KV
//! handle and one member identity, and runs the event loop that connects
//! them: membership changes and job changes trigger leader-side
//! redistribution, local assignment changes trigger supervisor convergence.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use hive_config::HiveConfig;
use hive_kv::KvStore;

use crate::cluster::{ClusterCoordinator, ClusterHandle, Member, MemberHealthCheck, MembershipChange};
use crate::error::KernelResult;
use crate::jobs::{BalancedDistributor, JobDistributor, JobRegistry, RegistryEvent};
use crate::workers::{WorkerFactory, WorkerSupervisor};

const MEMBER_ID_FILE: &str = "member-id";

/// Builder for a [`Kernel`]
///
/// All shared dependencies are injected here so several kernels (e.g. in
/// tests) can coexist in one process.
pub struct KernelBuilder {
    config: HiveConfig,
    kv: Arc<dyn KvStore>,
    factory: Arc<dyn WorkerFactory>,
    distributor: Arc<dyn JobDistributor>,
    health_check: Option<Arc<dyn MemberHealthCheck>>,
}

impl KernelBuilder {
    pub fn new(config: HiveConfig, kv: Arc<dyn KvStore>, factory: Arc<dyn WorkerFactory>) -> Self {
        Self {
            config,
            kv,
            factory,
            distributor: Arc::new(BalancedDistributor),
            health_check: None,
        }
    }

    /// Replace the default balanced distributor
    pub fn distributor(mut self, distributor: Arc<dyn JobDistributor>) -> Self {
        self.distributor = distributor;
        self
    }

    /// Install a peer liveness delegate
    pub fn health_check(mut self, health_check: Arc<dyn MemberHealthCheck>) -> Self {
        self.health_check = Some(health_check);
        self
    }

    pub fn build(self) -> KernelResult<Kernel> {
        let member_id = load_or_create_member_id(&self.config.cluster.data_dir)?;
        info!("Member instance id: {}", member_id);

        let local = Member::new(
            self.config.cluster.name.clone(),
            member_id.clone(),
            self.config.cluster.member_name.clone(),
            self.config.daemon_url(),
        );

        let mut coordinator =
            ClusterCoordinator::new(self.config.cluster.clone(), Arc::clone(&self.kv), local);
        if let Some(health_check) = self.health_check {
            coordinator.set_health_check(health_check);
        }

        let registry = Arc::new(JobRegistry::new(
            self.config.cluster.name.clone(),
            member_id.clone(),
            Arc::clone(&self.kv),
        ));

        let supervisor = Arc::new(WorkerSupervisor::new(
            self.config.cluster.name.clone(),
            member_id.clone(),
            Arc::clone(&self.kv),
            self.factory,
        ));

        Ok(Kernel {
            member_id,
            cluster: coordinator.handle(),
            coordinator,
            registry,
            distributor: self.distributor,
            supervisor,
            shutdown: None,
            wiring: None,
        })
    }
}

/// One coordination kernel instance
pub struct Kernel {
    member_id: String,
    cluster: ClusterHandle,
    coordinator: ClusterCoordinator,
    registry: Arc<JobRegistry>,
    distributor: Arc<dyn JobDistributor>,
    supervisor: Arc<WorkerSupervisor>,
    shutdown: Option<oneshot::Sender<()>>,
    wiring: Option<JoinHandle<()>>,
}

impl Kernel {
    pub fn builder(config: HiveConfig, kv: Arc<dyn KvStore>, factory: Arc<dyn WorkerFactory>) -> KernelBuilder {
        KernelBuilder::new(config, kv, factory)
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    pub fn is_leader(&self) -> bool {
        self.cluster.is_leader()
    }

    pub fn cluster(&self) -> ClusterHandle {
        self.cluster.clone()
    }

    pub fn registry(&self) -> Arc<JobRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn supervisor(&self) -> Arc<WorkerSupervisor> {
        Arc::clone(&self.supervisor)
    }

    /// Start coordination and the wiring loop
    pub async fn start(&mut self) -> KernelResult<()> {
        let membership_rx = self.coordinator.start().await?;
        let registry_rx = self.registry.start().await?;

        let wiring = Wiring {
            cluster: self.cluster.clone(),
            registry: Arc::clone(&self.registry),
            distributor: Arc::clone(&self.distributor),
            supervisor: Arc::clone(&self.supervisor),
        };

        // Converge to the current ledger entry before any watch fires, so a
        // restarted member picks its workers back up immediately.
        wiring.apply_assignments(self.registry.get_member_job_ids(&self.member_id).await?).await;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown = Some(shutdown_tx);
        self.wiring = Some(tokio::spawn(wiring.run(membership_rx, registry_rx, shutdown_rx)));

        info!("Kernel started for member {}", self.member_id);
        Ok(())
    }

    /// Stop watches, loops, and all running workers
    pub async fn stop(&mut self) {
        self.registry.stop();
        self.coordinator.stop().await;

        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.wiring.take() {
            if timeout(Duration::from_secs(5), handle).await.is_err() {
                warn!("Kernel wiring loop did not stop in time");
            }
        }

        self.supervisor.shutdown().await;
        info!("Kernel stopped for member {}", self.member_id);
    }
}

struct Wiring {
    cluster: ClusterHandle,
    registry: Arc<JobRegistry>,
    distributor: Arc<dyn JobDistributor>,
    supervisor: Arc<WorkerSupervisor>,
}

impl Wiring {
    async fn run(
        self,
        mut membership_rx: tokio::sync::mpsc::UnboundedReceiver<MembershipChange>,
        mut registry_rx: tokio::sync::mpsc::UnboundedReceiver<RegistryEvent>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                change = membership_rx.recv() => match change {
                    Some(change) => self.redistribute(change.alive_members).await,
                    None => break,
                },
                event = registry_rx.recv() => match event {
                    Some(RegistryEvent::JobPut { id, .. }) => {
                        info!("Job {} changed", id);
                        self.redistribute_if_leader().await;
                    }
                    Some(RegistryEvent::JobRemoved { id }) => {
                        info!("Job {} removed", id);
                        self.redistribute_if_leader().await;
                    }
                    Some(RegistryEvent::AssignmentsChanged(ids)) => {
                        self.apply_assignments(ids).await;
                    }
                    None => break,
                },
                _ = &mut shutdown_rx => break,
            }
        }
        info!("Kernel wiring loop stopped");
    }

    async fn redistribute_if_leader(&self) {
        if self.cluster.is_leader() {
            self.redistribute(self.cluster.alive_member_ids()).await;
        }
    }

    /// Leader-side rebalancing: compute a new ledger and write every entry
    async fn redistribute(&self, alive_members: Vec<String>) {
        if alive_members.is_empty() {
            warn!("Skipping distribution: no alive members");
            return;
        }

        let all_jobs = match self.registry.get_all_jobs().await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!("Cannot read job set for distribution: {}", e);
                return;
            }
        };
        let current = match self.registry.get_all_member_job_ids().await {
            Ok(ledger) => ledger,
            Err(e) => {
                error!("Cannot read assignment ledger for distribution: {}", e);
                return;
            }
        };

        info!(
            "Distributing {} jobs across {} alive members",
            all_jobs.len(),
            alive_members.len()
        );

        let ledger = self.distributor.distribute(&all_jobs, &alive_members, &current);

        for (member_id, job_ids) in ledger {
            if current.get(&member_id) == Some(&job_ids) {
                continue; // unchanged entry, avoid a spurious watch event
            }
            if let Err(e) = self.registry.set_member_job_ids(&member_id, &job_ids).await {
                error!("Cannot write assignment for {}: {}", member_id, e);
            }
        }
    }

    /// Local-side convergence: resolve payloads and reconcile the worker set
    async fn apply_assignments(&self, job_ids: Vec<String>) {
        let mut jobs = HashMap::with_capacity(job_ids.len());
        for id in job_ids {
            match self.registry.get_job(&id).await {
                Ok(Some(job)) => {
                    jobs.insert(job.id, job.payload);
                }
                Ok(None) => warn!("Assigned job {} has no stored record", id),
                Err(e) => warn!("Cannot resolve assigned job {}: {}", id, e),
            }
        }
        self.supervisor.set_assigned_jobs(jobs).await;
    }
}

/// Load the persisted member id, generating one on first start
///
/// The id must survive restarts so a restarted daemon re-joins as the same
/// member instead of leaking a new identity per boot.
fn load_or_create_member_id(data_dir: &str) -> KernelResult<String> {
    let dir = PathBuf::from(data_dir);
    std::fs::create_dir_all(&dir)?;

    let path = dir.join(MEMBER_ID_FILE);
    match std::fs::read_to_string(&path) {
        Ok(existing) => {
            let id = existing.trim().to_string();
            if !id.is_empty() {
                return Ok(id);
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let id = Uuid::new_v4().to_string();
    std::fs::write(&path, &id)?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_id_persists_across_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_str().unwrap();

        let first = load_or_create_member_id(data_dir).unwrap();
        let second = load_or_create_member_id(data_dir).unwrap();

        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_member_ids_differ_per_data_dir() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();

        let a = load_or_create_member_id(dir_a.path().to_str().unwrap()).unwrap();
        let b = load_or_create_member_id(dir_b.path().to_str().unwrap()).unwrap();

        assert_ne!(a, b);
    }
}
