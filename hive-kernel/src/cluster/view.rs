//! In-memory cluster projection

use std::collections::HashMap;

use crate::cluster::member::Member;

/// The local view of cluster membership
///
/// Holds a deduplicated, lexicographically sorted member-id sequence (the
/// deterministic election tie-break) and the id-to-member index. The two
/// always share the same key set.
#[derive(Debug, Clone)]
pub struct Cluster {
    name: String,
    member_ids: Vec<String>,
    members: HashMap<String, Member>,
    local_id: String,
    leader_id: Option<String>,
}

impl Cluster {
    pub fn new(name: impl Into<String>, local: Member) -> Self {
        let local_id = local.id.clone();
        let mut cluster = Self {
            name: name.into(),
            member_ids: Vec::new(),
            members: HashMap::new(),
            local_id,
            leader_id: None,
        };
        cluster.put_member(local);
        cluster
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn put_member(&mut self, member: Member) {
        if !self.members.contains_key(&member.id) {
            self.member_ids.push(member.id.clone());
            self.member_ids.sort();
        }
        self.members.insert(member.id.clone(), member);
    }

    pub fn member(&self, id: &str) -> Option<&Member> {
        self.members.get(id)
    }

    pub(crate) fn member_mut(&mut self, id: &str) -> Option<&mut Member> {
        self.members.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains_key(id)
    }

    /// All member ids in election order
    pub fn sorted_member_ids(&self) -> &[String] {
        &self.member_ids
    }

    /// Alive member ids, in election order
    pub fn alive_member_ids(&self) -> Vec<String> {
        self.member_ids
            .iter()
            .filter(|id| self.members.get(*id).map(Member::is_alive).unwrap_or(false))
            .cloned()
            .collect()
    }

    pub fn local(&self) -> &Member {
        // The local member is inserted at construction and never removed.
        &self.members[&self.local_id]
    }

    pub(crate) fn local_mut(&mut self) -> &mut Member {
        self.members.get_mut(&self.local_id).expect("local member always present")
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn leader_id(&self) -> Option<&str> {
        self.leader_id.as_deref()
    }

    pub fn leader(&self) -> Option<&Member> {
        self.leader_id.as_ref().and_then(|id| self.members.get(id))
    }

    pub(crate) fn set_leader_id(&mut self, id: Option<String>) {
        self.leader_id = id;
    }

    /// Whether the local member currently holds leadership
    pub fn local_is_leader(&self) -> bool {
        self.local().is_leader()
    }
}
