//! Read operations against Neo4j.
//!
//! Relation names and hop bounds are interpolated from closed enums and
//! integers; everything caller-supplied goes through parameters.

use neo4rs::query;

use structures_core::{NodeId, Relation};

use crate::client::GraphError;
use crate::session::{row_to_record, rows_to_records, Neo4jSession};
use crate::store::NodeRecord;

impl Neo4jSession {
    // ── Single Node Lookups ──────────────────────────────────────

    /// Get a node by id, whatever its label.
    pub async fn fetch_node(&mut self, id: &NodeId) -> Result<Option<NodeRecord>, GraphError> {
        let q = query(
            "MATCH (n {id: $id})
             RETURN n, labels(n) AS labels
             LIMIT 1",
        )
        .param("id", id.as_str());

        match self.query_one(q).await? {
            Some(row) => row_to_record(&row),
            None => Ok(None),
        }
    }

    // ── Neighbors ────────────────────────────────────────────────

    /// Nodes at the far end of outgoing `relation` edges.
    pub async fn fetch_outgoing(
        &mut self,
        id: &NodeId,
        relation: Relation,
    ) -> Result<Vec<NodeRecord>, GraphError> {
        let cypher = format!(
            "MATCH (a {{id: $id}})-[:{rel}]->(n)
             RETURN n, labels(n) AS labels
             ORDER BY n.id",
            rel = relation.as_cypher()
        );

        let rows = self.query_rows(query(&cypher).param("id", id.as_str())).await?;
        rows_to_records(&rows)
    }

    /// Nodes at the near end of incoming `relation` edges.
    pub async fn fetch_incoming(
        &mut self,
        id: &NodeId,
        relation: Relation,
    ) -> Result<Vec<NodeRecord>, GraphError> {
        let cypher = format!(
            "MATCH (n)-[:{rel}]->(a {{id: $id}})
             RETURN n, labels(n) AS labels
             ORDER BY n.id",
            rel = relation.as_cypher()
        );

        let rows = self.query_rows(query(&cypher).param("id", id.as_str())).await?;
        rows_to_records(&rows)
    }

    // ── Variable-Length Traversals ───────────────────────────────

    /// Shortest `(from)-[relation*0..max_hops]->(to)` path as a list of ids.
    pub async fn fetch_path(
        &mut self,
        from: &NodeId,
        relation: Relation,
        to: &NodeId,
        max_hops: u32,
    ) -> Result<Option<Vec<NodeId>>, GraphError> {
        let cypher = format!(
            "MATCH p = (a {{id: $from}})-[:{rel}*0..{max_hops}]->(b {{id: $to}})
             RETURN [n IN nodes(p) | n.id] AS ids
             ORDER BY length(p)
             LIMIT 1",
            rel = relation.as_cypher()
        );

        let q = query(&cypher)
            .param("from", from.as_str())
            .param("to", to.as_str());

        match self.query_one(q).await? {
            Some(row) => {
                let ids: Vec<String> = row.get("ids").map_err(|e| {
                    GraphError::Serialization(format!("Failed to deserialize path: {e}"))
                })?;
                Ok(Some(ids.into_iter().map(NodeId::from).collect()))
            }
            None => Ok(None),
        }
    }

    /// Nodes reaching any of `roots` within 1..=max_hops `relation` edges.
    pub async fn fetch_descendants(
        &mut self,
        roots: &[NodeId],
        relation: Relation,
        max_hops: u32,
    ) -> Result<Vec<NodeRecord>, GraphError> {
        if roots.is_empty() || max_hops == 0 {
            return Ok(Vec::new());
        }

        let cypher = format!(
            "MATCH (n)-[:{rel}*1..{max_hops}]->(p)
             WHERE p.id IN $roots AND NOT n.id IN $roots
             RETURN DISTINCT n, labels(n) AS labels
             ORDER BY n.id",
            rel = relation.as_cypher()
        );

        let ids: Vec<String> = roots.iter().map(|r| r.0.clone()).collect();
        let rows = self.query_rows(query(&cypher).param("roots", ids)).await?;
        rows_to_records(&rows)
    }
}
