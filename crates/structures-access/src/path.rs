//! Materialized ancestor paths up to the root organization unit.

use structures_core::{NodeId, NodeKind, Relation, StructuresConfig};
use structures_graph::{GraphSession, NodeRecord};

use crate::error::{AccessError, Result};

/// Resolves the chain of ancestors of any hierarchy node.
///
/// Non-OU nodes first climb their fixed-depth links (device to outlet,
/// outlet or worker to organization unit); the `CHILD_OF` chain from there
/// is bounded by `max_hops`. Deleted nodes are traversed like any other.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: NodeId,
    max_hops: u32,
}

impl PathResolver {
    pub fn new(root: NodeId, max_hops: u32) -> Self {
        Self { root, max_hops }
    }

    pub fn from_config(config: &StructuresConfig) -> Self {
        Self::new(config.root_organization_unit.clone(), config.max_path_hops)
    }

    pub fn root(&self) -> &NodeId {
        &self.root
    }

    pub fn max_hops(&self) -> u32 {
        self.max_hops
    }

    /// Ancestors of `node_id`, nearest first and the root last. The node
    /// itself is not included; the root's own path is empty.
    pub async fn path_to_root(
        &self,
        session: &mut dyn GraphSession,
        node_id: &NodeId,
    ) -> Result<Vec<NodeId>> {
        if node_id == &self.root {
            return Ok(Vec::new());
        }

        let node = session
            .get_node(node_id)
            .await?
            .ok_or_else(|| AccessError::PathResolution {
                node_id: node_id.clone(),
                max_hops: self.max_hops,
            })?;

        let mut ancestors = Vec::new();
        let mut current = node;
        while current.kind != NodeKind::OrganizationUnit {
            match current.kind {
                NodeKind::Root => return Ok(ancestors),
                NodeKind::User => return Err(self.unresolved(node_id)),
                _ => {}
            }
            current = self.parent(session, &current).await?;
            ancestors.push(current.id.clone());
            if current.id == self.root {
                return Ok(ancestors);
            }
        }

        let chain = session
            .path_between(&current.id, Relation::ChildOf, &self.root, self.max_hops)
            .await?
            .ok_or_else(|| self.unresolved(node_id))?;
        ancestors.extend(chain.into_iter().skip(1));

        tracing::trace!(node = %node_id, depth = ancestors.len(), "Resolved path to root");
        Ok(ancestors)
    }

    /// `node_id` followed by its ancestors.
    pub async fn materialized_path(
        &self,
        session: &mut dyn GraphSession,
        node_id: &NodeId,
    ) -> Result<Vec<NodeId>> {
        let mut path = vec![node_id.clone()];
        path.extend(self.path_to_root(session, node_id).await?);
        Ok(path)
    }

    /// True iff every organization unit on the node's materialized path is active.
    pub async fn is_in_active_tree(
        &self,
        session: &mut dyn GraphSession,
        node_id: &NodeId,
    ) -> Result<bool> {
        for id in self.materialized_path(session, node_id).await? {
            let Some(node) = session.get_node(&id).await? else {
                return Ok(false);
            };
            if node.kind == NodeKind::OrganizationUnit && !node.is_active() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// The single parent reached through the node's upward relation.
    async fn parent(
        &self,
        session: &mut dyn GraphSession,
        node: &NodeRecord,
    ) -> Result<NodeRecord> {
        let relation = node
            .kind
            .upward_relation()
            .ok_or_else(|| self.unresolved(&node.id))?;

        let mut parents = session.outgoing(&node.id, relation).await?;
        match parents.len() {
            1 => Ok(parents.remove(0)),
            0 => Err(self.unresolved(&node.id)),
            n => Err(structures_graph::GraphError::Integrity(format!(
                "{} {} has {n} {relation} edges",
                node.kind, node.id
            ))
            .into()),
        }
    }

    fn unresolved(&self, node_id: &NodeId) -> AccessError {
        AccessError::PathResolution {
            node_id: node_id.clone(),
            max_hops: self.max_hops,
        }
    }
}
