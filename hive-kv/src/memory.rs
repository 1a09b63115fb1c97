//! In-memory store implementation
//!
//! Backs tests and single-process development. Watch semantics mirror the
//! etcd implementation: events for one key are delivered in commit order.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::KvResult;
use crate::store::{KvEvent, KvEventKind, KvPair, KvStore, Watch};

struct Watcher {
    id: u64,
    prefix: String,
    exact: bool,
    tx: mpsc::UnboundedSender<KvEvent>,
}

impl Watcher {
    fn matches(&self, key: &str) -> bool {
        if self.exact {
            key == self.prefix
        } else {
            key.starts_with(&self.prefix)
        }
    }
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<String, Vec<u8>>,
    watchers: Vec<Watcher>,
    next_watch_id: u64,
}

impl Inner {
    fn notify(&mut self, event: KvEvent) {
        // Senders with a dropped receiver are pruned as they are encountered.
        self.watchers
            .retain(|w| !w.matches(&event.key) || w.tx.send(event.clone()).is_ok());
    }
}

/// In-memory [`KvStore`]
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribe(&self, prefix: &str, exact: bool) -> Watch {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self.inner.write();
            let id = inner.next_watch_id;
            inner.next_watch_id += 1;
            inner.watchers.push(Watcher {
                id,
                prefix: prefix.to_string(),
                exact,
                tx,
            });
            id
        };

        let inner = Arc::clone(&self.inner);
        let canceller = Box::new(move || {
            inner.write().watchers.retain(|w| w.id != id);
        });

        Watch::new(rx, Some(canceller))
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> KvResult<()> {
        let mut inner = self.inner.write();
        inner.entries.insert(key.to_string(), value.clone());
        inner.notify(KvEvent {
            key: key.to_string(),
            value: Some(value),
            kind: KvEventKind::Put,
        });
        Ok(())
    }

    async fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        Ok(self.inner.read().entries.get(key).cloned())
    }

    async fn get_prefix(&self, prefix: &str) -> KvResult<Vec<KvPair>> {
        let inner = self.inner.read();
        Ok(inner
            .entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| KvPair {
                key: k.clone(),
                value: v.clone(),
            })
            .collect())
    }

    async fn delete(&self, key: &str) -> KvResult<bool> {
        let mut inner = self.inner.write();
        let existed = inner.entries.remove(key).is_some();
        if existed {
            inner.notify(KvEvent {
                key: key.to_string(),
                value: None,
                kind: KvEventKind::Delete,
            });
        }
        Ok(existed)
    }

    async fn delete_prefix(&self, prefix: &str) -> KvResult<u64> {
        let mut inner = self.inner.write();
        let keys: Vec<String> = inner
            .entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();

        for key in &keys {
            inner.entries.remove(key);
            inner.notify(KvEvent {
                key: key.clone(),
                value: None,
                kind: KvEventKind::Delete,
            });
        }

        Ok(keys.len() as u64)
    }

    async fn watch(&self, key: &str) -> KvResult<Watch> {
        Ok(self.subscribe(key, true))
    }

    async fn watch_prefix(&self, prefix: &str) -> KvResult<Watch> {
        Ok(self.subscribe(prefix, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::KvStoreExt;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryStore::new();

        store.put("a/b", b"one".to_vec()).await.unwrap();
        assert_eq!(store.get("a/b").await.unwrap(), Some(b"one".to_vec()));

        assert!(store.delete("a/b").await.unwrap());
        assert!(!store.delete("a/b").await.unwrap());
        assert_eq!(store.get("a/b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_prefix_scan_is_ordered() {
        let store = MemoryStore::new();
        store.put("jobs/b", b"2".to_vec()).await.unwrap();
        store.put("jobs/a", b"1".to_vec()).await.unwrap();
        store.put("other/c", b"3".to_vec()).await.unwrap();

        let pairs = store.get_prefix("jobs/").await.unwrap();
        let keys: Vec<_> = pairs.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["jobs/a", "jobs/b"]);
    }

    #[tokio::test]
    async fn test_watch_delivers_puts_and_deletes() {
        let store = MemoryStore::new();
        let mut watch = store.watch("leader").await.unwrap();

        store.put("leader", b"m1".to_vec()).await.unwrap();
        store.put("unrelated", b"x".to_vec()).await.unwrap();
        store.delete("leader").await.unwrap();

        let first = watch.next().await.unwrap();
        assert_eq!(first.kind, KvEventKind::Put);
        assert_eq!(first.value, Some(b"m1".to_vec()));

        let second = watch.next().await.unwrap();
        assert_eq!(second.kind, KvEventKind::Delete);
        assert_eq!(second.key, "leader");
    }

    #[tokio::test]
    async fn test_prefix_watch() {
        let store = MemoryStore::new();
        let mut watch = store.watch_prefix("jobs/").await.unwrap();

        store.put("jobs/j1", b"payload".to_vec()).await.unwrap();

        let event = watch.next().await.unwrap();
        assert_eq!(event.key, "jobs/j1");
    }

    #[tokio::test]
    async fn test_cancelled_watch_stops_delivery() {
        let store = MemoryStore::new();
        let mut watch = store.watch("k").await.unwrap();
        watch.cancel();

        store.put("k", b"v".to_vec()).await.unwrap();
        assert!(watch.next().await.is_none());
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let store = MemoryStore::new();
        store.put_json("ids", &vec!["a", "b"]).await.unwrap();

        let ids: Option<Vec<String>> = store.get_json("ids").await.unwrap();
        assert_eq!(ids, Some(vec!["a".to_string(), "b".to_string()]));

        let missing: Option<Vec<String>> = store.get_json("nope").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_delete_prefix() {
        let store = MemoryStore::new();
        store.put("data/w1/r1", b"1".to_vec()).await.unwrap();
        store.put("data/w1/r2", b"2".to_vec()).await.unwrap();
        store.put("data/w2/r1", b"3".to_vec()).await.unwrap();

        assert_eq!(store.delete_prefix("data/w1/").await.unwrap(), 2);
        assert_eq!(store.get_prefix("data/").await.unwrap().len(), 1);
    }
}
