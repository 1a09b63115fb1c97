//! etcd-backed store implementation

use async_trait::async_trait;
use etcd_client::{Client, ConnectOptions, DeleteOptions, EventType, GetOptions, WatchOptions};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use hive_config::KvConfig;

use crate::error::{KvError, KvResult};
use crate::store::{KvEvent, KvEventKind, KvPair, KvStore, Watch};

/// [`KvStore`] backed by an etcd cluster
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
}

impl EtcdStore {
    /// Connect to etcd and verify the endpoints are reachable
    pub async fn connect(config: &KvConfig) -> KvResult<Self> {
        let options = ConnectOptions::new()
            .with_connect_timeout(config.connect_timeout)
            .with_timeout(config.request_timeout);

        let client = Client::connect(&config.endpoints, Some(options))
            .await
            .map_err(|e| KvError::Connection(format!("{:?}: {}", config.endpoints, e)))?;

        // Probe with a read so a dead cluster fails here, not on first use.
        let mut probe = client.clone();
        probe
            .get("/", Some(GetOptions::new().with_keys_only().with_limit(1)))
            .await
            .map_err(|e| KvError::Connection(format!("{:?}: {}", config.endpoints, e)))?;

        info!("Connected to KV store at {:?}", config.endpoints);
        Ok(Self { client })
    }

    async fn watch_with(&self, key: &str, options: Option<WatchOptions>) -> KvResult<Watch> {
        let mut client = self.client.clone();
        let (watcher, mut stream) = client
            .watch(key, options)
            .await
            .map_err(|e| KvError::Watch(format!("watch {}: {}", key, e)))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let watched_key = key.to_string();

        let handle = tokio::spawn(async move {
            // The watcher is moved in so the server-side watch lives exactly
            // as long as this forwarding task.
            let _watcher = watcher;
            loop {
                match stream.message().await {
                    Ok(Some(resp)) => {
                        for event in resp.events() {
                            let Some(kv) = event.kv() else { continue };
                            let key = match kv.key_str() {
                                Ok(k) => k.to_string(),
                                Err(e) => {
                                    warn!("Dropping watch event with non-UTF8 key: {}", e);
                                    continue;
                                }
                            };
                            let mapped = match event.event_type() {
                                EventType::Put => KvEvent {
                                    key,
                                    value: Some(kv.value().to_vec()),
                                    kind: KvEventKind::Put,
                                },
                                EventType::Delete => KvEvent {
                                    key,
                                    value: None,
                                    kind: KvEventKind::Delete,
                                },
                            };
                            if tx.send(mapped).is_err() {
                                return;
                            }
                        }
                    }
                    Ok(None) => {
                        debug!("Watch stream for {} ended", watched_key);
                        return;
                    }
                    Err(e) => {
                        warn!("Watch stream for {} failed: {}", watched_key, e);
                        return;
                    }
                }
            }
        });

        let canceller = Box::new(move || {
            handle.abort();
        });

        Ok(Watch::new(rx, Some(canceller)))
    }
}

#[async_trait]
impl KvStore for EtcdStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> KvResult<()> {
        let mut client = self.client.clone();
        client.put(key, value, None).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        let mut client = self.client.clone();
        let resp = client.get(key, None).await?;
        Ok(resp.kvs().first().map(|kv| kv.value().to_vec()))
    }

    async fn get_prefix(&self, prefix: &str) -> KvResult<Vec<KvPair>> {
        let mut client = self.client.clone();
        let resp = client.get(prefix, Some(GetOptions::new().with_prefix())).await?;

        let mut pairs = Vec::with_capacity(resp.kvs().len());
        for kv in resp.kvs() {
            let key = kv
                .key_str()
                .map_err(|e| KvError::Encoding(e.to_string()))?
                .to_string();
            pairs.push(KvPair {
                key,
                value: kv.value().to_vec(),
            });
        }
        Ok(pairs)
    }

    async fn delete(&self, key: &str) -> KvResult<bool> {
        let mut client = self.client.clone();
        let resp = client.delete(key, None).await?;
        Ok(resp.deleted() > 0)
    }

    async fn delete_prefix(&self, prefix: &str) -> KvResult<u64> {
        let mut client = self.client.clone();
        let resp = client
            .delete(prefix, Some(DeleteOptions::new().with_prefix()))
            .await?;
        Ok(resp.deleted() as u64)
    }

    async fn watch(&self, key: &str) -> KvResult<Watch> {
        self.watch_with(key, None).await
    }

    async fn watch_prefix(&self, prefix: &str) -> KvResult<Watch> {
        self.watch_with(prefix, Some(WatchOptions::new().with_prefix())).await
    }
}
