//! The graph store capability consumed by the access engine.
//!
//! A [`GraphStore`] hands out one [`GraphSession`] per request. The session
//! owns at most one open transaction; reads outside a transaction see the
//! latest committed state, writes outside a transaction are rejected.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use structures_core::{NodeId, NodeKind, Properties, Relation};

use crate::client::GraphError;

/// A node as stored in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub kind: NodeKind,
    /// All stored properties except `id`.
    pub properties: Properties,
}

impl NodeRecord {
    /// Soft-delete marker; absent means visible.
    pub fn is_deleted(&self) -> bool {
        self.properties
            .get("deleted")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn is_active(&self) -> bool {
        self.properties
            .get("active")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn str_prop(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(|v| v.as_str())
    }

    pub fn int_prop(&self, key: &str) -> Option<i64> {
        self.properties.get(key).and_then(|v| v.as_i64())
    }
}

/// A node to be inserted.
#[derive(Debug, Clone)]
pub struct NewNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub properties: Properties,
}

impl NewNode {
    /// A node with a freshly generated id.
    pub fn new(kind: NodeKind, properties: Properties) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            properties,
        }
    }
}

/// Factory for per-request sessions.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Open a new session. The caller must `close` it when the request ends.
    async fn session(&self) -> Result<Box<dyn GraphSession>, GraphError>;

    /// Create id constraints and the root organization unit if missing.
    async fn bootstrap(&self, root: &NodeId) -> Result<(), GraphError>;
}

/// One request's view of the graph.
#[async_trait]
pub trait GraphSession: Send {
    // ── Transactions ─────────────────────────────────────────────

    async fn begin(&mut self) -> Result<(), GraphError>;

    async fn commit(&mut self) -> Result<(), GraphError>;

    async fn rollback(&mut self) -> Result<(), GraphError>;

    fn in_transaction(&self) -> bool;

    /// Release the session. An open transaction is rolled back.
    async fn close(&mut self) -> Result<(), GraphError>;

    // ── Reads ────────────────────────────────────────────────────

    /// Fetch a node by id regardless of its deleted flag.
    async fn get_node(&mut self, id: &NodeId) -> Result<Option<NodeRecord>, GraphError>;

    /// Nodes reached by `(id)-[relation]->(n)`.
    async fn outgoing(
        &mut self,
        id: &NodeId,
        relation: Relation,
    ) -> Result<Vec<NodeRecord>, GraphError>;

    /// Nodes reaching `id` by `(n)-[relation]->(id)`.
    async fn incoming(
        &mut self,
        id: &NodeId,
        relation: Relation,
    ) -> Result<Vec<NodeRecord>, GraphError>;

    /// Ids along `(from)-[relation*0..max_hops]->(to)`, `from` first and
    /// `to` last. `None` when `to` is not reachable within the bound.
    ///
    /// The default walks one hop per query; adapters that can express
    /// variable-length paths natively should override it.
    async fn path_between(
        &mut self,
        from: &NodeId,
        relation: Relation,
        to: &NodeId,
        max_hops: u32,
    ) -> Result<Option<Vec<NodeId>>, GraphError> {
        let mut path = vec![from.clone()];
        if from == to {
            return Ok(Some(path));
        }

        let mut current = from.clone();
        for _ in 0..max_hops {
            let parents = self.outgoing(&current, relation).await?;
            let parent = match parents.as_slice() {
                [] => return Ok(None),
                [single] => single.id.clone(),
                _ => {
                    return Err(GraphError::Integrity(format!(
                        "{current} has {} {relation} edges",
                        parents.len()
                    )))
                }
            };
            if path.contains(&parent) {
                return Ok(None);
            }
            path.push(parent.clone());
            if &parent == to {
                return Ok(Some(path));
            }
            current = parent;
        }

        Ok(None)
    }

    /// Nodes reaching any of `roots` through 1..=max_hops `relation`
    /// edges. The roots themselves are not included.
    async fn descendants(
        &mut self,
        roots: &[NodeId],
        relation: Relation,
        max_hops: u32,
    ) -> Result<Vec<NodeRecord>, GraphError> {
        let mut seen: HashSet<NodeId> = roots.iter().cloned().collect();
        let mut frontier: Vec<NodeId> = roots.to_vec();
        let mut found = Vec::new();

        for _ in 0..max_hops {
            let mut next = Vec::new();
            for id in &frontier {
                for child in self.incoming(id, relation).await? {
                    if seen.insert(child.id.clone()) {
                        next.push(child.id.clone());
                        found.push(child);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        Ok(found)
    }

    // ── Writes (require an open transaction) ─────────────────────

    async fn create_node(&mut self, node: NewNode) -> Result<NodeRecord, GraphError>;

    /// Assign the given properties. Returns `None` if the node is missing.
    async fn set_properties(
        &mut self,
        id: &NodeId,
        properties: &Properties,
    ) -> Result<Option<NodeRecord>, GraphError>;

    /// Create `(from)-[relation]->(to)`. Both endpoints must exist.
    async fn create_relation(
        &mut self,
        from: &NodeId,
        relation: Relation,
        to: &NodeId,
    ) -> Result<(), GraphError>;

    /// Delete every `(from)-[relation]->(to)` edge. Returns how many were removed.
    async fn delete_relation(
        &mut self,
        from: &NodeId,
        relation: Relation,
        to: &NodeId,
    ) -> Result<u64, GraphError>;

    /// Drop every outgoing `relation` edge of `from` and create one to `to`,
    /// as a single write. The edges dropped are the ones present when the
    /// write lands, not the ones last read. Returns how many were dropped.
    async fn replace_relation(
        &mut self,
        from: &NodeId,
        relation: Relation,
        to: &NodeId,
    ) -> Result<u64, GraphError>;
}
