//! Durable cluster records: member info, heartbeats, leader

use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use tracing::warn;

use hive_kv::{KvStore, KvStoreExt};

use crate::cluster::member::Member;
use crate::error::KernelResult;
use crate::keys;

/// KV access for cluster coordination records
///
/// Heartbeats are stored as RFC3339 text so they stay readable with plain
/// etcdctl; everything else is JSON.
#[derive(Clone)]
pub struct ClusterStore {
    cluster: String,
    kv: Arc<dyn KvStore>,
}

impl ClusterStore {
    pub fn new(cluster: impl Into<String>, kv: Arc<dyn KvStore>) -> Self {
        Self {
            cluster: cluster.into(),
            kv,
        }
    }

    pub async fn get_leader(&self) -> KernelResult<Option<String>> {
        let bytes = self.kv.get(&keys::leader(&self.cluster)).await?;
        Ok(bytes.map(|b| String::from_utf8_lossy(&b).into_owned()).filter(|s| !s.is_empty()))
    }

    pub async fn put_leader(&self, member_id: &str) -> KernelResult<()> {
        self.kv
            .put(&keys::leader(&self.cluster), member_id.as_bytes().to_vec())
            .await?;
        Ok(())
    }

    pub async fn get_member_info(&self, member_id: &str) -> KernelResult<Option<Member>> {
        Ok(self.kv.get_json(&keys::member_info(&self.cluster, member_id)).await?)
    }

    pub async fn put_member_info(&self, member: &Member) -> KernelResult<()> {
        self.kv
            .put_json(&keys::member_info(&self.cluster, &member.id), member)
            .await?;
        Ok(())
    }

    pub async fn put_heartbeat(&self, member_id: &str) -> KernelResult<()> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        self.kv
            .put(&keys::heartbeat(&self.cluster, member_id), now.into_bytes())
            .await?;
        Ok(())
    }

    /// Scan every heartbeat slot under the cluster's heartbeat prefix
    ///
    /// Slots with unparsable timestamps are skipped with a warning; one
    /// corrupt record must not stall failure detection for the rest.
    pub async fn get_heartbeats(&self) -> KernelResult<Vec<(String, DateTime<Utc>)>> {
        let prefix = keys::heartbeat_prefix(&self.cluster);
        let pairs = self.kv.get_prefix(&prefix).await?;

        let mut heartbeats = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let member_id = pair.key[prefix.len()..].to_string();
            let text = String::from_utf8_lossy(&pair.value);
            match DateTime::parse_from_rfc3339(&text) {
                Ok(at) => heartbeats.push((member_id, at.with_timezone(&Utc))),
                Err(e) => warn!("Skipping unparsable heartbeat for {}: {}", member_id, e),
            }
        }
        Ok(heartbeats)
    }

    #[cfg(test)]
    pub(crate) async fn put_heartbeat_at(&self, member_id: &str, at: DateTime<Utc>) -> KernelResult<()> {
        let text = at.to_rfc3339_opts(SecondsFormat::Secs, true);
        self.kv
            .put(&keys::heartbeat(&self.cluster, member_id), text.into_bytes())
            .await?;
        Ok(())
    }
}
