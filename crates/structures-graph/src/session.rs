//! Per-request Neo4j session with an optional open transaction.

use async_trait::async_trait;
use neo4rs::{Graph, Query, Row, Txn};

use structures_core::{NodeId, NodeKind, Properties, Relation};

use crate::client::GraphError;
use crate::store::{GraphSession, NewNode, NodeRecord};

/// A request-scoped handle on the pooled [`Graph`].
///
/// Queries run inside the open transaction when there is one, otherwise
/// directly against the pool in auto-commit mode.
pub struct Neo4jSession {
    graph: Graph,
    txn: Option<Txn>,
}

impl Neo4jSession {
    pub(crate) fn new(graph: Graph) -> Self {
        Self { graph, txn: None }
    }

    /// Execute a query and collect all rows.
    pub(crate) async fn query_rows(&mut self, query: Query) -> Result<Vec<Row>, GraphError> {
        let mut rows = Vec::new();
        match self.txn.as_mut() {
            Some(txn) => {
                let mut stream = txn.execute(query).await?;
                while let Some(row) = stream.next(txn.handle()).await? {
                    rows.push(row);
                }
            }
            None => {
                let mut stream = self.graph.execute(query).await?;
                while let Some(row) = stream.next().await? {
                    rows.push(row);
                }
            }
        }
        Ok(rows)
    }

    /// Execute a query and return the first row, if any.
    pub(crate) async fn query_one(&mut self, query: Query) -> Result<Option<Row>, GraphError> {
        Ok(self.query_rows(query).await?.into_iter().next())
    }

    pub(crate) fn require_txn(&self) -> Result<(), GraphError> {
        if self.txn.is_some() {
            Ok(())
        } else {
            Err(GraphError::TransactionRequired)
        }
    }
}

/// Convert a row holding `n` (the node) and `labels` into a record.
///
/// Rows whose labels do not name a known kind are skipped.
pub(crate) fn row_to_record(row: &Row) -> Result<Option<NodeRecord>, GraphError> {
    let node: neo4rs::Node = row
        .get("n")
        .map_err(|e| GraphError::Serialization(format!("Failed to deserialize node: {e}")))?;
    let labels: Vec<String> = row.get("labels").unwrap_or_default();

    let Some(kind) = labels.iter().find_map(|l| NodeKind::from_label(l)) else {
        return Ok(None);
    };
    let id: String = node
        .get("id")
        .map_err(|e| GraphError::Serialization(format!("Node without id: {e}")))?;

    let mut properties = Properties::new();
    for key in node.keys() {
        if key == "id" {
            continue;
        }
        if let Some(value) = property_value(&node, key) {
            properties.insert(key.to_string(), value);
        }
    }

    Ok(Some(NodeRecord {
        id: NodeId::from(id),
        kind,
        properties,
    }))
}

pub(crate) fn rows_to_records(rows: &[Row]) -> Result<Vec<NodeRecord>, GraphError> {
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(record) = row_to_record(row)? {
            records.push(record);
        }
    }
    Ok(records)
}

fn property_value(node: &neo4rs::Node, key: &str) -> Option<serde_json::Value> {
    if let Ok(v) = node.get::<bool>(key) {
        return Some(serde_json::Value::Bool(v));
    }
    if let Ok(v) = node.get::<i64>(key) {
        return Some(serde_json::Value::from(v));
    }
    if let Ok(v) = node.get::<f64>(key) {
        return Some(serde_json::Value::from(v));
    }
    if let Ok(v) = node.get::<String>(key) {
        return Some(serde_json::Value::String(v));
    }
    if let Ok(v) = node.get::<Vec<String>>(key) {
        return Some(serde_json::Value::from(v));
    }
    None
}

#[async_trait]
impl GraphSession for Neo4jSession {
    async fn begin(&mut self) -> Result<(), GraphError> {
        if self.txn.is_some() {
            return Err(GraphError::TransactionAlreadyOpen);
        }
        self.txn = Some(self.graph.start_txn().await?);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), GraphError> {
        let txn = self.txn.take().ok_or(GraphError::NoOpenTransaction)?;
        txn.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), GraphError> {
        let txn = self.txn.take().ok_or(GraphError::NoOpenTransaction)?;
        txn.rollback().await?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }

    async fn close(&mut self) -> Result<(), GraphError> {
        if let Some(txn) = self.txn.take() {
            tracing::warn!("Closing session with an open transaction, rolling back");
            txn.rollback().await?;
        }
        Ok(())
    }

    async fn get_node(&mut self, id: &NodeId) -> Result<Option<NodeRecord>, GraphError> {
        self.fetch_node(id).await
    }

    async fn outgoing(
        &mut self,
        id: &NodeId,
        relation: Relation,
    ) -> Result<Vec<NodeRecord>, GraphError> {
        self.fetch_outgoing(id, relation).await
    }

    async fn incoming(
        &mut self,
        id: &NodeId,
        relation: Relation,
    ) -> Result<Vec<NodeRecord>, GraphError> {
        self.fetch_incoming(id, relation).await
    }

    async fn path_between(
        &mut self,
        from: &NodeId,
        relation: Relation,
        to: &NodeId,
        max_hops: u32,
    ) -> Result<Option<Vec<NodeId>>, GraphError> {
        self.fetch_path(from, relation, to, max_hops).await
    }

    async fn descendants(
        &mut self,
        roots: &[NodeId],
        relation: Relation,
        max_hops: u32,
    ) -> Result<Vec<NodeRecord>, GraphError> {
        self.fetch_descendants(roots, relation, max_hops).await
    }

    async fn create_node(&mut self, node: NewNode) -> Result<NodeRecord, GraphError> {
        self.insert_node(node).await
    }

    async fn set_properties(
        &mut self,
        id: &NodeId,
        properties: &Properties,
    ) -> Result<Option<NodeRecord>, GraphError> {
        self.update_node(id, properties).await
    }

    async fn create_relation(
        &mut self,
        from: &NodeId,
        relation: Relation,
        to: &NodeId,
    ) -> Result<(), GraphError> {
        self.link(from, relation, to).await
    }

    async fn delete_relation(
        &mut self,
        from: &NodeId,
        relation: Relation,
        to: &NodeId,
    ) -> Result<u64, GraphError> {
        self.unlink(from, relation, to).await
    }

    async fn replace_relation(
        &mut self,
        from: &NodeId,
        relation: Relation,
        to: &NodeId,
    ) -> Result<u64, GraphError> {
        self.relink(from, relation, to).await
    }
}
