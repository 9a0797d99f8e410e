//! In-memory graph store for tests and the `--memory` CLI mode.
//!
//! A transaction works on a private copy of the committed graph and records
//! its writes. Commit replays the recorded writes onto the shared graph, so
//! concurrent transactions touching the same node resolve last-commit-wins.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use structures_core::{NodeId, NodeKind, Properties, Relation};

use crate::client::GraphError;
use crate::store::{GraphSession, GraphStore, NewNode, NodeRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Edge {
    from: NodeId,
    relation: Relation,
    to: NodeId,
}

#[derive(Debug, Clone)]
enum WriteOp {
    CreateNode(NodeRecord),
    SetProperties { id: NodeId, properties: Properties },
    CreateEdge(Edge),
    DeleteEdge(Edge),
    /// Drop all `from`-`relation` edges present at apply time, then add `edge`.
    ReplaceEdges(Edge),
}

#[derive(Debug, Clone, Default)]
struct GraphState {
    nodes: HashMap<NodeId, NodeRecord>,
    edges: Vec<Edge>,
}

impl GraphState {
    fn node(&self, id: &NodeId) -> Option<NodeRecord> {
        self.nodes.get(id).cloned()
    }

    fn targets(&self, id: &NodeId, relation: Relation) -> Vec<NodeRecord> {
        self.edges
            .iter()
            .filter(|e| &e.from == id && e.relation == relation)
            .filter_map(|e| self.nodes.get(&e.to).cloned())
            .collect()
    }

    fn sources(&self, id: &NodeId, relation: Relation) -> Vec<NodeRecord> {
        self.edges
            .iter()
            .filter(|e| &e.to == id && e.relation == relation)
            .filter_map(|e| self.nodes.get(&e.from).cloned())
            .collect()
    }

    fn apply(&mut self, op: &WriteOp) -> Result<(), GraphError> {
        match op {
            WriteOp::CreateNode(record) => {
                if self.nodes.contains_key(&record.id) {
                    return Err(GraphError::Integrity(format!(
                        "Node {} already exists",
                        record.id
                    )));
                }
                self.nodes.insert(record.id.clone(), record.clone());
            }
            WriteOp::SetProperties { id, properties } => {
                if let Some(node) = self.nodes.get_mut(id) {
                    for (key, value) in properties {
                        node.properties.insert(key.clone(), value.clone());
                    }
                }
            }
            WriteOp::CreateEdge(edge) => {
                self.check_endpoints(edge)?;
                self.edges.push(edge.clone());
            }
            WriteOp::DeleteEdge(edge) => self.edges.retain(|e| e != edge),
            WriteOp::ReplaceEdges(edge) => {
                self.check_endpoints(edge)?;
                self.edges
                    .retain(|e| e.from != edge.from || e.relation != edge.relation);
                self.edges.push(edge.clone());
            }
        }
        Ok(())
    }

    fn check_endpoints(&self, edge: &Edge) -> Result<(), GraphError> {
        for end in [&edge.from, &edge.to] {
            if !self.nodes.contains_key(end) {
                return Err(GraphError::NotFound {
                    label: format!("{} endpoint", edge.relation),
                    id: end.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Shared in-memory graph. Clone is cheap and every clone sees the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryGraph {
    state: Arc<RwLock<GraphState>>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// A graph holding only the root organization unit.
    pub async fn with_root(root: &NodeId) -> Self {
        let graph = Self::new();
        graph.insert_root(root).await;
        graph
    }

    async fn insert_root(&self, root: &NodeId) {
        let mut state = self.state.write().await;
        if state.nodes.contains_key(root) {
            return;
        }
        let mut properties = Properties::new();
        properties.insert("name".into(), "root".into());
        properties.insert("active".into(), true.into());
        stamp(&mut properties, true);
        state.nodes.insert(
            root.clone(),
            NodeRecord {
                id: root.clone(),
                kind: NodeKind::Root,
                properties,
            },
        );
    }

    /// Number of committed nodes.
    pub async fn node_count(&self) -> usize {
        self.state.read().await.nodes.len()
    }

    /// Number of committed `(from)-[relation]->()` edges.
    pub async fn edge_count(&self, from: &NodeId, relation: Relation) -> usize {
        self.state
            .read()
            .await
            .edges
            .iter()
            .filter(|e| &e.from == from && e.relation == relation)
            .count()
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn session(&self) -> Result<Box<dyn GraphSession>, GraphError> {
        Ok(Box::new(MemorySession {
            shared: Arc::clone(&self.state),
            txn: None,
        }))
    }

    async fn bootstrap(&self, root: &NodeId) -> Result<(), GraphError> {
        self.insert_root(root).await;
        Ok(())
    }
}

struct MemoryTxn {
    view: GraphState,
    log: Vec<WriteOp>,
}

pub struct MemorySession {
    shared: Arc<RwLock<GraphState>>,
    txn: Option<MemoryTxn>,
}

impl MemorySession {
    fn write(&mut self, op: WriteOp) -> Result<(), GraphError> {
        let txn = self.txn.as_mut().ok_or(GraphError::TransactionRequired)?;
        txn.view.apply(&op)?;
        txn.log.push(op);
        Ok(())
    }

    fn view(&self) -> Option<&GraphState> {
        self.txn.as_ref().map(|t| &t.view)
    }
}

#[async_trait]
impl GraphSession for MemorySession {
    async fn begin(&mut self) -> Result<(), GraphError> {
        if self.txn.is_some() {
            return Err(GraphError::TransactionAlreadyOpen);
        }
        let view = self.shared.read().await.clone();
        self.txn = Some(MemoryTxn {
            view,
            log: Vec::new(),
        });
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), GraphError> {
        let txn = self.txn.take().ok_or(GraphError::NoOpenTransaction)?;
        let mut shared = self.shared.write().await;
        let mut next = shared.clone();
        for op in &txn.log {
            next.apply(op)?;
        }
        *shared = next;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), GraphError> {
        self.txn.take().ok_or(GraphError::NoOpenTransaction)?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }

    async fn close(&mut self) -> Result<(), GraphError> {
        if self.txn.take().is_some() {
            tracing::warn!("Closing session with an open transaction, rolling back");
        }
        Ok(())
    }

    async fn get_node(&mut self, id: &NodeId) -> Result<Option<NodeRecord>, GraphError> {
        if let Some(view) = self.view() {
            return Ok(view.node(id));
        }
        Ok(self.shared.read().await.node(id))
    }

    async fn outgoing(
        &mut self,
        id: &NodeId,
        relation: Relation,
    ) -> Result<Vec<NodeRecord>, GraphError> {
        if let Some(view) = self.view() {
            return Ok(view.targets(id, relation));
        }
        Ok(self.shared.read().await.targets(id, relation))
    }

    async fn incoming(
        &mut self,
        id: &NodeId,
        relation: Relation,
    ) -> Result<Vec<NodeRecord>, GraphError> {
        if let Some(view) = self.view() {
            return Ok(view.sources(id, relation));
        }
        Ok(self.shared.read().await.sources(id, relation))
    }

    async fn create_node(&mut self, node: NewNode) -> Result<NodeRecord, GraphError> {
        let mut properties = node.properties;
        properties.retain(|k, v| k != "id" && !v.is_null());
        stamp(&mut properties, true);

        let record = NodeRecord {
            id: node.id,
            kind: node.kind,
            properties,
        };
        self.write(WriteOp::CreateNode(record.clone()))?;
        Ok(record)
    }

    async fn set_properties(
        &mut self,
        id: &NodeId,
        properties: &Properties,
    ) -> Result<Option<NodeRecord>, GraphError> {
        if self.txn.is_none() {
            return Err(GraphError::TransactionRequired);
        }
        if self.view().and_then(|v| v.node(id)).is_none() {
            return Ok(None);
        }

        let mut properties = properties.clone();
        properties.retain(|k, v| k != "id" && !v.is_null());
        stamp(&mut properties, false);

        self.write(WriteOp::SetProperties {
            id: id.clone(),
            properties,
        })?;
        Ok(self.view().and_then(|v| v.node(id)))
    }

    async fn create_relation(
        &mut self,
        from: &NodeId,
        relation: Relation,
        to: &NodeId,
    ) -> Result<(), GraphError> {
        self.write(WriteOp::CreateEdge(Edge {
            from: from.clone(),
            relation,
            to: to.clone(),
        }))
    }

    async fn delete_relation(
        &mut self,
        from: &NodeId,
        relation: Relation,
        to: &NodeId,
    ) -> Result<u64, GraphError> {
        let edge = Edge {
            from: from.clone(),
            relation,
            to: to.clone(),
        };
        let existing = self
            .view()
            .map(|v| v.edges.iter().filter(|e| **e == edge).count())
            .unwrap_or(0);
        self.write(WriteOp::DeleteEdge(edge))?;
        Ok(existing as u64)
    }

    async fn replace_relation(
        &mut self,
        from: &NodeId,
        relation: Relation,
        to: &NodeId,
    ) -> Result<u64, GraphError> {
        let dropped = self
            .view()
            .map(|v| {
                v.edges
                    .iter()
                    .filter(|e| &e.from == from && e.relation == relation)
                    .count()
            })
            .unwrap_or(0);
        self.write(WriteOp::ReplaceEdges(Edge {
            from: from.clone(),
            relation,
            to: to.clone(),
        }))?;
        Ok(dropped as u64)
    }
}

fn stamp(properties: &mut Properties, created: bool) {
    let now = Utc::now().to_rfc3339();
    if created {
        properties.insert("created_at".into(), now.clone().into());
    }
    properties.insert("updated_at".into(), now.into());
}
