//! Write operations against Neo4j.
//!
//! Session writes only run inside an open transaction. Schema and root
//! bootstrap run on the client in auto-commit mode.

use chrono::Utc;
use neo4rs::{query, Query};

use structures_core::{NodeId, NodeKind, Properties, Relation};

use crate::client::{GraphClient, GraphError};
use crate::session::{row_to_record, Neo4jSession};
use crate::store::{NewNode, NodeRecord};

impl Neo4jSession {
    // ── Nodes ────────────────────────────────────────────────────

    /// Create a node with the given label and properties.
    pub async fn insert_node(&mut self, node: NewNode) -> Result<NodeRecord, GraphError> {
        self.require_txn()?;

        let cypher = format!(
            "CREATE (n:{label} {{id: $id}})
             SET n.created_at = $now, n.updated_at = $now{assignments}
             RETURN n, labels(n) AS labels",
            label = node.kind.label(),
            assignments = set_clause(&node.properties)?
        );

        let q = query(&cypher)
            .param("id", node.id.as_str())
            .param("now", Utc::now().to_rfc3339());
        let q = bind_properties(q, &node.properties)?;

        let row = self.query_one(q).await?.ok_or_else(|| {
            GraphError::Integrity(format!("CREATE returned no row for {}", node.id))
        })?;
        row_to_record(&row)?.ok_or_else(|| {
            GraphError::Serialization(format!("Created node {} has no known label", node.id))
        })
    }

    /// Assign properties on an existing node. `None` if it does not exist.
    pub async fn update_node(
        &mut self,
        id: &NodeId,
        properties: &Properties,
    ) -> Result<Option<NodeRecord>, GraphError> {
        self.require_txn()?;

        let cypher = format!(
            "MATCH (n {{id: $id}})
             SET n.updated_at = $now{assignments}
             RETURN n, labels(n) AS labels",
            assignments = set_clause(properties)?
        );

        let q = query(&cypher)
            .param("id", id.as_str())
            .param("now", Utc::now().to_rfc3339());
        let q = bind_properties(q, properties)?;

        match self.query_one(q).await? {
            Some(row) => row_to_record(&row),
            None => Ok(None),
        }
    }

    // ── Edges ────────────────────────────────────────────────────

    pub async fn link(
        &mut self,
        from: &NodeId,
        relation: Relation,
        to: &NodeId,
    ) -> Result<(), GraphError> {
        self.require_txn()?;

        let cypher = format!(
            "MATCH (a {{id: $from}})
             MATCH (b {{id: $to}})
             CREATE (a)-[:{rel}]->(b)
             RETURN count(*) AS created",
            rel = relation.as_cypher()
        );

        let q = query(&cypher)
            .param("from", from.as_str())
            .param("to", to.as_str());

        let created: i64 = match self.query_one(q).await? {
            Some(row) => row.get("created").unwrap_or(0),
            None => 0,
        };
        if created == 0 {
            return Err(GraphError::NotFound {
                label: format!("{relation} endpoint"),
                id: format!("{from} -> {to}"),
            });
        }
        Ok(())
    }

    pub async fn unlink(
        &mut self,
        from: &NodeId,
        relation: Relation,
        to: &NodeId,
    ) -> Result<u64, GraphError> {
        self.require_txn()?;

        let cypher = format!(
            "MATCH (a {{id: $from}})-[r:{rel}]->(b {{id: $to}})
             DELETE r
             RETURN count(*) AS removed",
            rel = relation.as_cypher()
        );

        let q = query(&cypher)
            .param("from", from.as_str())
            .param("to", to.as_str());

        let removed: i64 = match self.query_one(q).await? {
            Some(row) => row.get("removed").unwrap_or(0),
            None => 0,
        };
        Ok(removed.max(0) as u64)
    }

    /// Replace all outgoing `relation` edges of `from` with one edge to `to`.
    ///
    /// The `SET` takes the write lock on `from` before its edges are
    /// matched, so a concurrent relink of the same node waits for this
    /// transaction and then sees its committed edge.
    pub async fn relink(
        &mut self,
        from: &NodeId,
        relation: Relation,
        to: &NodeId,
    ) -> Result<u64, GraphError> {
        self.require_txn()?;

        let cypher = format!(
            "MATCH (a {{id: $from}})
             MATCH (b {{id: $to}})
             SET a.updated_at = $now
             WITH a, b
             OPTIONAL MATCH (a)-[r:{rel}]->()
             DELETE r
             WITH a, b, count(r) AS removed
             CREATE (a)-[:{rel}]->(b)
             RETURN removed",
            rel = relation.as_cypher()
        );

        let q = query(&cypher)
            .param("from", from.as_str())
            .param("to", to.as_str())
            .param("now", Utc::now().to_rfc3339());

        match self.query_one(q).await? {
            Some(row) => {
                let removed: i64 = row.get("removed").unwrap_or(0);
                Ok(removed.max(0) as u64)
            }
            None => Err(GraphError::NotFound {
                label: format!("{relation} endpoint"),
                id: format!("{from} -> {to}"),
            }),
        }
    }
}

impl GraphClient {
    // ── Bootstrap ────────────────────────────────────────────────

    /// Create a uniqueness constraint on `id` for every node label.
    pub async fn ensure_schema(&self) -> Result<(), GraphError> {
        for kind in NodeKind::ALL {
            let label = kind.label();
            let cypher = format!(
                "CREATE CONSTRAINT {name}_id IF NOT EXISTS
                 FOR (n:{label}) REQUIRE n.id IS UNIQUE",
                name = label.to_lowercase()
            );
            self.run(query(&cypher)).await?;
        }
        tracing::info!("Graph schema constraints ensured");
        Ok(())
    }

    /// Create the root organization unit if it does not exist yet.
    pub async fn ensure_root(&self, root: &NodeId) -> Result<(), GraphError> {
        let q = query(
            "MERGE (r:RootOrganizationUnit {id: $id})
             ON CREATE SET r.name = 'root', r.active = true,
               r.created_at = $now, r.updated_at = $now",
        )
        .param("id", root.as_str())
        .param("now", Utc::now().to_rfc3339());

        self.run(q).await?;
        tracing::info!(root = %root, "Root organization unit ensured");
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Property keys become Cypher identifiers, so only plain names pass.
fn checked_key(key: &str) -> Result<&str, GraphError> {
    let plain = !key.is_empty()
        && key != "id"
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        Ok(key)
    } else {
        Err(GraphError::Serialization(format!(
            "Invalid property name: {key:?}"
        )))
    }
}

/// `, n.k = $p_k` for every non-null property.
fn set_clause(properties: &Properties) -> Result<String, GraphError> {
    let mut clause = String::new();
    for (key, value) in properties {
        if value.is_null() {
            continue;
        }
        let key = checked_key(key)?;
        clause.push_str(&format!(", n.{key} = $p_{key}"));
    }
    Ok(clause)
}

fn bind_properties(mut q: Query, properties: &Properties) -> Result<Query, GraphError> {
    for (key, value) in properties {
        let name = format!("p_{}", checked_key(key)?);
        q = match value {
            serde_json::Value::Null => q,
            serde_json::Value::Bool(b) => q.param(&name, *b),
            serde_json::Value::String(s) => q.param(&name, s.as_str()),
            serde_json::Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => q.param(&name, i),
                (None, Some(f)) => q.param(&name, f),
                (None, None) => {
                    return Err(GraphError::Serialization(format!(
                        "Number out of range for {key}: {n}"
                    )))
                }
            },
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                return Err(GraphError::Serialization(format!(
                    "Unsupported property type for {key}"
                )))
            }
        };
    }
    Ok(q)
}
