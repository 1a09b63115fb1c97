//! Built-in demo worker
//!
//! Logs its payload on a fixed cadence and checkpoints a tick counter, so a
//! fresh cluster exercises assignment, reconciliation, and checkpoint resume
//! without any external handler. Payload envelope: `#echo:<text>`.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use hive_kernel::{KernelResult, Worker, WorkerFactory, WorkerScope};

const TICK_INTERVAL: Duration = Duration::from_secs(10);

pub struct EchoFactory;

#[async_trait]
impl WorkerFactory for EchoFactory {
    fn name(&self) -> &str {
        "echo"
    }

    async fn create(&self, scope: WorkerScope) -> KernelResult<Box<dyn Worker>> {
        Ok(Box::new(EchoWorker {
            scope,
            started: AtomicBool::new(false),
            task: Mutex::new(None),
        }))
    }
}

pub struct EchoWorker {
    scope: WorkerScope,
    started: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl Worker for EchoWorker {
    fn id(&self) -> &str {
        self.scope.id()
    }

    async fn start(&self) -> KernelResult<()> {
        // Resume from the durable cursor; a restarted worker continues its
        // tick count instead of starting over.
        let mut ticks: u64 = self.scope.get_checkpoint().await?.unwrap_or(0);
        let scope = self.scope.clone();
        let text = String::from_utf8_lossy(scope.payload()).into_owned();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            loop {
                interval.tick().await;
                ticks += 1;
                info!("[echo {}] {} (tick {})", scope.id(), text, ticks);
                if let Err(e) = scope.put_checkpoint(&ticks).await {
                    warn!("[echo {}] cannot write checkpoint: {}", scope.id(), e);
                }
            }
        });

        if let Ok(mut task) = self.task.lock() {
            *task = Some(handle);
        }
        self.started.store(true, Ordering::SeqCst);
        info!("Echo worker {} started", self.scope.id());
        Ok(())
    }

    async fn stop(&self) -> KernelResult<()> {
        if let Ok(mut task) = self.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
        self.started.store(false, Ordering::SeqCst);
        info!("Echo worker {} stopped", self.scope.id());
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_kv::{KvStore, MemoryStore};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_echo_worker_lifecycle() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let scope = WorkerScope::new("c1", "j1", b"hello".to_vec(), kv);

        let worker = EchoFactory.create(scope).await.unwrap();
        assert!(!worker.is_started());

        worker.start().await.unwrap();
        assert!(worker.is_started());

        worker.stop().await.unwrap();
        assert!(!worker.is_started());
    }
}
