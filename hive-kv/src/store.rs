//! Core KV store trait and watch types

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::mpsc;

use crate::error::KvResult;

/// A key together with its stored bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    pub key: String,
    pub value: Vec<u8>,
}

/// What happened to a watched key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvEventKind {
    Put,
    Delete,
}

/// One committed mutation delivered through a watch
#[derive(Debug, Clone)]
pub struct KvEvent {
    pub key: String,
    /// `None` for deletes
    pub value: Option<Vec<u8>>,
    pub kind: KvEventKind,
}

/// A live watch subscription
///
/// Events for a given key arrive in the order the store committed the
/// corresponding writes. Delivery is at-least-once: consumers must tolerate
/// an event for state they already observed via a direct read. Dropping the
/// handle (or calling [`Watch::cancel`]) ends the subscription; in-flight
/// events already queued are still delivered.
pub struct Watch {
    rx: mpsc::UnboundedReceiver<KvEvent>,
    canceller: Option<Box<dyn FnOnce() + Send>>,
}

impl Watch {
    pub fn new(rx: mpsc::UnboundedReceiver<KvEvent>, canceller: Option<Box<dyn FnOnce() + Send>>) -> Self {
        Self { rx, canceller }
    }

    /// Wait for the next event; `None` once the subscription is torn down
    pub async fn next(&mut self) -> Option<KvEvent> {
        self.rx.recv().await
    }

    /// End the subscription
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.canceller.take() {
            cancel();
        }
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Abstract durable store: put/get, prefix scan, delete, change watches
///
/// Implementations must provide linearizable single-key reads and writes;
/// the coordination protocol built on top depends on it.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Durably store `value` under `key`, overwriting any previous value
    async fn put(&self, key: &str, value: Vec<u8>) -> KvResult<()>;

    /// Read one key; `None` if absent
    async fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>>;

    /// Read every key under `prefix`, in lexicographic key order
    async fn get_prefix(&self, prefix: &str) -> KvResult<Vec<KvPair>>;

    /// Delete one key; returns whether it existed
    async fn delete(&self, key: &str) -> KvResult<bool>;

    /// Delete every key under `prefix`; returns the number removed
    async fn delete_prefix(&self, prefix: &str) -> KvResult<u64>;

    /// Watch a single key for mutations
    async fn watch(&self, key: &str) -> KvResult<Watch>;

    /// Watch every key under `prefix` for mutations
    async fn watch_prefix(&self, prefix: &str) -> KvResult<Watch>;
}

/// JSON convenience layer over any [`KvStore`]
#[async_trait]
pub trait KvStoreExt: KvStore {
    /// Store `value` as JSON under `key`
    async fn put_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> KvResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.put(key, bytes).await
    }

    /// Read and decode a JSON value; `None` if the key is absent
    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> KvResult<Option<T>> {
        match self.get(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl<S: KvStore + ?Sized> KvStoreExt for S {}
