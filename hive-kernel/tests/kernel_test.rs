//! End-to-end kernel tests over the in-memory store
//!
//! Several kernels share one store and converge through the same watch and
//! heartbeat machinery a real deployment uses against etcd.

use async_trait::async_trait;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hive_config::HiveConfig;
use hive_kernel::{Kernel, KernelResult, Worker, WorkerFactory, WorkerScope};
use hive_kv::MemoryStore;

struct SinkWorker {
    id: String,
    started: AtomicBool,
}

#[async_trait]
impl Worker for SinkWorker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(&self) -> KernelResult<()> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> KernelResult<()> {
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

struct SinkFactory;

#[async_trait]
impl WorkerFactory for SinkFactory {
    fn name(&self) -> &str {
        "sink"
    }

    async fn create(&self, scope: WorkerScope) -> KernelResult<Box<dyn Worker>> {
        Ok(Box::new(SinkWorker {
            id: scope.id().to_string(),
            started: AtomicBool::new(false),
        }))
    }
}

fn test_config(cluster: &str, member: &str, data_dir: &str) -> HiveConfig {
    let mut config = HiveConfig::default();
    config.cluster.name = cluster.to_string();
    config.cluster.member_name = member.to_string();
    config.cluster.data_dir = data_dir.to_string();
    config.cluster.heartbeat_interval = Duration::from_millis(100);
    config.cluster.check_heartbeat_interval = Duration::from_millis(150);
    config.cluster.alive_threshold = Duration::from_secs(1);
    config
}

async fn spawn_members(
    cluster: &str,
    kv: Arc<MemoryStore>,
    count: usize,
) -> (Vec<Kernel>, Vec<tempfile::TempDir>) {
    let mut kernels = Vec::with_capacity(count);
    let mut dirs = Vec::with_capacity(count);

    for i in 0..count {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(cluster, &format!("member-{}", i), dir.path().to_str().unwrap());
        let mut kernel = Kernel::builder(config, kv.clone(), Arc::new(SinkFactory))
            .build()
            .unwrap();
        kernel.start().await.unwrap();
        kernels.push(kernel);
        dirs.push(dir);
    }

    (kernels, dirs)
}

async fn wait_for<F, Fut>(deadline: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

async fn running_ids(kernels: &[Kernel]) -> Vec<Vec<String>> {
    let mut per_member = Vec::with_capacity(kernels.len());
    for kernel in kernels {
        per_member.push(kernel.supervisor().running_job_ids().await);
    }
    per_member
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ten_jobs_spread_across_three_members() {
    let kv = Arc::new(MemoryStore::new());
    let (kernels, _dirs) = spawn_members("spread", kv, 3).await;

    let registry = kernels[0].registry();
    for i in 0..10 {
        registry.add_job(format!("job-{}", i).into_bytes()).await.unwrap();
    }

    let converged = wait_for(Duration::from_secs(10), || {
        let kernels = &kernels;
        async move {
            let per_member = running_ids(kernels).await;
            let total: usize = per_member.iter().map(Vec::len).sum();
            total == 10 && per_member.iter().all(|ids| (3..=4).contains(&ids.len()))
        }
    })
    .await;
    assert!(converged, "jobs did not spread across members in time");

    // No job runs twice.
    let per_member = running_ids(&kernels).await;
    let all: Vec<String> = per_member.iter().flatten().cloned().collect();
    let unique: HashSet<&String> = all.iter().collect();
    assert_eq!(unique.len(), 10);

    // Exactly one leader.
    let leaders = kernels.iter().filter(|k| k.is_leader()).count();
    assert_eq!(leaders, 1);

    for mut kernel in kernels {
        kernel.stop().await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dropped_member_jobs_are_redistributed() {
    let kv = Arc::new(MemoryStore::new());
    let (mut kernels, _dirs) = spawn_members("failover", kv, 3).await;

    let registry = kernels[0].registry();
    for i in 0..10 {
        registry.add_job(format!("job-{}", i).into_bytes()).await.unwrap();
    }

    let converged = wait_for(Duration::from_secs(10), || {
        let kernels = &kernels;
        async move {
            let per_member = running_ids(kernels).await;
            per_member.iter().map(Vec::len).sum::<usize>() == 10
                && per_member.iter().all(|ids| !ids.is_empty())
        }
    })
    .await;
    assert!(converged, "initial distribution did not converge");

    // Stop a non-leader member; its heartbeat slot goes stale.
    let victim_index = kernels
        .iter()
        .position(|k| !k.is_leader())
        .expect("a follower exists");
    let mut victim = kernels.remove(victim_index);
    let victim_id = victim.member_id().to_string();
    victim.stop().await;

    let redistributed = wait_for(Duration::from_secs(10), || {
        let kernels = &kernels;
        async move {
            let per_member = running_ids(kernels).await;
            per_member.iter().map(Vec::len).sum::<usize>() == 10
        }
    })
    .await;
    assert!(redistributed, "surviving members did not absorb the dropped member's jobs");

    // The dropped member's ledger entry is emptied.
    let ledger = registry.get_all_member_job_ids().await.unwrap();
    assert_eq!(ledger[&victim_id], Vec::<String>::new());

    let per_member = running_ids(&kernels).await;
    let all: Vec<String> = per_member.iter().flatten().cloned().collect();
    let unique: HashSet<&String> = all.iter().collect();
    assert_eq!(unique.len(), 10);

    for mut kernel in kernels {
        kernel.stop().await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_removed_job_worker_is_stopped() {
    let kv = Arc::new(MemoryStore::new());
    let (kernels, _dirs) = spawn_members("removal", kv, 1).await;

    let registry = kernels[0].registry();
    let job = registry.add_job(b"short-lived".to_vec()).await.unwrap();

    let started = wait_for(Duration::from_secs(5), || {
        let kernels = &kernels;
        async move { running_ids(kernels).await[0].len() == 1 }
    })
    .await;
    assert!(started, "worker never started");

    registry.remove_job(&job.id).await.unwrap();

    let stopped = wait_for(Duration::from_secs(5), || {
        let kernels = &kernels;
        async move { running_ids(kernels).await[0].is_empty() }
    })
    .await;
    assert!(stopped, "worker for removed job kept running");

    for mut kernel in kernels {
        kernel.stop().await;
    }
}
