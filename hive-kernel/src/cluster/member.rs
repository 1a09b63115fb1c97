//! Member identity and runtime state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One daemon instance participating in the cluster
///
/// The serialized fields form the durable member-info record; heartbeat,
/// liveness, and leadership are runtime state owned by the coordinator.
/// A member is never deleted: one that stops heartbeating is marked
/// not-alive so a later heartbeat can revive it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub cluster: String,
    pub id: String,
    pub name: String,
    #[serde(rename = "url")]
    pub daemon_url: String,

    #[serde(skip)]
    heartbeat: Option<DateTime<Utc>>,
    #[serde(skip)]
    leader: bool,
    #[serde(skip)]
    alive: bool,
    #[serde(skip)]
    local: bool,
}

impl Member {
    pub fn new(cluster: impl Into<String>, id: impl Into<String>, name: impl Into<String>, daemon_url: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            id: id.into(),
            name: name.into(),
            daemon_url: daemon_url.into(),
            heartbeat: None,
            leader: false,
            alive: false,
            local: false,
        }
    }

    /// Placeholder record for a member whose info record could not be read
    pub(crate) fn unknown(cluster: impl Into<String>, id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(cluster, id.clone(), id, String::new())
    }

    pub fn heartbeat(&self) -> Option<DateTime<Utc>> {
        self.heartbeat
    }

    pub(crate) fn set_heartbeat(&mut self, at: DateTime<Utc>) {
        self.heartbeat = Some(at);
    }

    pub fn is_leader(&self) -> bool {
        self.leader
    }

    pub(crate) fn set_leader(&mut self, leader: bool) {
        self.leader = leader;
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub(crate) fn set_alive(&mut self, alive: bool) {
        self.alive = alive;
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    pub(crate) fn set_local(&mut self, local: bool) {
        self.local = local;
    }
}
