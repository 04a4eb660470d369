//! Cluster membership snapshots consumed by the dispatcher.
//!
//! Metadata discovery and refresh live outside this crate; the dispatcher
//! only reads point-in-time snapshots through `ClusterView`.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// Logical node identifier within the cluster.
pub type NodeId = u64;

/// One cluster member as reported by metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub host: String,
    pub port: u16,
}

impl Node {
    pub fn new(id: NodeId, host: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.id, self.host, self.port)
    }
}

/// Read-only view of the cluster, refreshed by an external collaborator.
pub trait ClusterView: Send + Sync + 'static {
    /// The node currently authorized for controller-scoped operations, if
    /// the latest snapshot knows one.
    fn controller(&self) -> Option<Node>;

    /// Look up a member by id.
    fn node_by_id(&self, id: NodeId) -> Option<Node>;

    /// Any reachable member, used for operations without affinity.
    fn any_node(&self) -> Option<Node>;
}

#[derive(Default)]
struct Snapshot {
    members: BTreeMap<NodeId, Node>,
    controller: Option<NodeId>,
}

/// In-memory `ClusterView` whose snapshot is swapped by whoever owns the
/// refresh loop. Also serves as the view for tests and the workload driver.
#[derive(Default)]
pub struct StaticClusterView {
    snapshot: RwLock<Snapshot>,
}

impl StaticClusterView {
    pub fn new() -> Self {
        Self::default()
    }

    /// View over the given members with no known controller.
    pub fn with_members(members: impl IntoIterator<Item = Node>) -> Self {
        let view = Self::new();
        for node in members {
            view.upsert_node(node);
        }
        view
    }

    /// Add or replace a member.
    pub fn upsert_node(&self, node: Node) {
        let mut snapshot = self.write();
        snapshot.members.insert(node.id, node);
    }

    /// Remove a member; clears the controller if it pointed at the member.
    pub fn remove_node(&self, id: NodeId) {
        let mut snapshot = self.write();
        snapshot.members.remove(&id);
        if snapshot.controller == Some(id) {
            snapshot.controller = None;
        }
    }

    /// Set or clear the controller. Setting an unknown id clears it.
    pub fn set_controller(&self, id: Option<NodeId>) {
        let mut snapshot = self.write();
        let known = id.filter(|id| snapshot.members.contains_key(id));
        snapshot.controller = known;
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Snapshot> {
        self.snapshot
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Snapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl ClusterView for StaticClusterView {
    fn controller(&self) -> Option<Node> {
        let snapshot = self.read();
        snapshot
            .controller
            .and_then(|id| snapshot.members.get(&id).cloned())
    }

    fn node_by_id(&self, id: NodeId) -> Option<Node> {
        self.read().members.get(&id).cloned()
    }

    fn any_node(&self) -> Option<Node> {
        self.read().members.values().next().cloned()
    }
}
