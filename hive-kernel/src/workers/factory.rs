//! Pluggable worker factories
//!
//! A job payload is either a flat blob for a single factory, or an envelope
//! of the form `#<factory-name>:<inner-payload>` routed through a
//! [`DispatchingFactory`]. A [`FanoutFactory`] fans one payload out to
//! several named sub-factories as a single all-or-nothing composite.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{KernelError, KernelResult};
use crate::workers::worker::{Worker, WorkerScope};

/// Constructs workers for the payloads it understands
#[async_trait]
pub trait WorkerFactory: Send + Sync {
    fn name(&self) -> &str;
    async fn create(&self, scope: WorkerScope) -> KernelResult<Box<dyn Worker>>;
}

/// Split an `#<factory-name>:<inner>` envelope
pub fn parse_envelope(payload: &[u8]) -> KernelResult<(&str, &[u8])> {
    if payload.first() != Some(&b'#') {
        return Err(KernelError::MalformedPayload(
            "payload must start with '#<factory-name>:'".to_string(),
        ));
    }

    let colon = payload
        .iter()
        .position(|b| *b == b':')
        .ok_or_else(|| KernelError::MalformedPayload("missing ':' after factory name".to_string()))?;

    if colon < 2 {
        return Err(KernelError::MalformedPayload("empty factory name".to_string()));
    }

    let name = std::str::from_utf8(&payload[1..colon])
        .map_err(|_| KernelError::MalformedPayload("factory name is not UTF-8".to_string()))?;

    Ok((name, &payload[colon + 1..]))
}

/// Routes enveloped payloads to a name-keyed factory registry
pub struct DispatchingFactory {
    name: String,
    factories: BTreeMap<String, Arc<dyn WorkerFactory>>,
}

impl DispatchingFactory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            factories: BTreeMap::new(),
        }
    }

    /// Register a sub-factory; names must be unique
    pub fn register(&mut self, factory: Arc<dyn WorkerFactory>) -> KernelResult<()> {
        let name = factory.name().to_string();
        if self.factories.contains_key(&name) {
            return Err(KernelError::DuplicateFactory(name));
        }
        info!("Registered worker factory '{}'", name);
        self.factories.insert(name, factory);
        Ok(())
    }

    pub fn get(&self, name: &str) -> KernelResult<Arc<dyn WorkerFactory>> {
        self.factories
            .get(name)
            .cloned()
            .ok_or_else(|| KernelError::UnknownHandler(name.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

#[async_trait]
impl WorkerFactory for DispatchingFactory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create(&self, scope: WorkerScope) -> KernelResult<Box<dyn Worker>> {
        let (factory_name, inner) = parse_envelope(scope.payload())?;
        let factory = self.get(factory_name)?;
        let inner = inner.to_vec();
        factory.create(scope.with_payload(inner)).await
    }
}

/// Fans one payload out to every registered sub-factory
///
/// Each sub-worker gets an isolated child scope keyed by
/// `<job-id>-<fanout-name>-<sub-name>`, all sharing the job payload.
pub struct FanoutFactory {
    name: String,
    factories: BTreeMap<String, Arc<dyn WorkerFactory>>,
}

impl FanoutFactory {
    pub fn new(name: impl Into<String>, factories: Vec<Arc<dyn WorkerFactory>>) -> KernelResult<Self> {
        let name = name.into();
        let mut map = BTreeMap::new();
        for factory in factories {
            let sub_name = factory.name().to_string();
            if map.insert(sub_name.clone(), factory).is_some() {
                return Err(KernelError::DuplicateFactory(sub_name));
            }
        }
        Ok(Self { name, factories: map })
    }
}

#[async_trait]
impl WorkerFactory for FanoutFactory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create(&self, scope: WorkerScope) -> KernelResult<Box<dyn Worker>> {
        let mut workers = Vec::with_capacity(self.factories.len());
        for (sub_name, factory) in &self.factories {
            let child = scope.child(&format!("{}-{}", self.name, sub_name), scope.payload().to_vec());
            let worker = factory.create(child).await.map_err(|e| {
                KernelError::Worker(format!("sub-worker '{}' of {}: {}", sub_name, scope.id(), e))
            })?;
            workers.push(worker);
        }

        Ok(Box::new(FanoutWorker {
            id: scope.id().to_string(),
            started: AtomicBool::new(false),
            workers,
        }))
    }
}

/// Composite worker whose sub-workers activate all-or-nothing
pub struct FanoutWorker {
    id: String,
    started: AtomicBool,
    workers: Vec<Box<dyn Worker>>,
}

#[async_trait]
impl Worker for FanoutWorker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(&self) -> KernelResult<()> {
        for worker in &self.workers {
            if let Err(e) = worker.start().await {
                warn!("Sub-worker {} failed to start, stopping siblings: {}", worker.id(), e);
                self.stop_started().await;
                return Err(KernelError::Worker(format!(
                    "sub-worker {} failed to start: {}",
                    worker.id(),
                    e
                )));
            }
        }
        self.started.store(true, Ordering::SeqCst);
        info!("Composite worker {} started ({} sub-workers)", self.id, self.workers.len());
        Ok(())
    }

    async fn stop(&self) -> KernelResult<()> {
        self.stop_started().await;
        self.started.store(false, Ordering::SeqCst);
        info!("Composite worker {} stopped", self.id);
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

impl FanoutWorker {
    async fn stop_started(&self) {
        for worker in &self.workers {
            if worker.is_started() {
                if let Err(e) = worker.stop().await {
                    warn!("Sub-worker {} failed to stop: {}", worker.id(), e);
                }
            }
        }
    }
}
