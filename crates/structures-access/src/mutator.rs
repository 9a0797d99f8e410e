//! Structural writes to the organization hierarchy.
//!
//! Every operation requires the session to have an open transaction and
//! performs no authorization; callers check access first.

use std::collections::BTreeSet;

use structures_core::{AccessKind, NodeId, NodeKind, Properties};
use structures_graph::{GraphSession, NewNode, NodeRecord};

use crate::error::{AccessError, Result};
use crate::path::PathResolver;

#[derive(Debug, Clone)]
pub struct HierarchyMutator {
    resolver: PathResolver,
}

impl HierarchyMutator {
    pub fn new(resolver: PathResolver) -> Self {
        Self { resolver }
    }

    /// Insert a node of `kind` under `parent_id` together with its upward edge.
    pub async fn create(
        &self,
        session: &mut dyn GraphSession,
        kind: NodeKind,
        parent_id: &NodeId,
        properties: Properties,
    ) -> Result<NodeRecord> {
        require_transaction(session)?;
        let relation = kind.upward_relation().ok_or_else(|| {
            AccessError::InvalidRequest(format!("{kind} cannot be placed in the hierarchy"))
        })?;
        self.valid_parent(session, kind, parent_id).await?;

        let node = session.create_node(NewNode::new(kind, properties)).await?;
        session
            .create_relation(&node.id, relation, parent_id)
            .await?;

        tracing::info!(%kind, id = %node.id, parent = %parent_id, "Node created");
        Ok(node)
    }

    /// Insert a user. Users live outside the tree and have no parent.
    pub async fn create_user(
        &self,
        session: &mut dyn GraphSession,
        properties: Properties,
    ) -> Result<NodeRecord> {
        require_transaction(session)?;
        let user = session
            .create_node(NewNode::new(NodeKind::User, properties))
            .await?;

        tracing::info!(id = %user.id, "User created");
        Ok(user)
    }

    /// Move `node_id` under `new_parent_id`, replacing its upward edge.
    pub async fn reparent(
        &self,
        session: &mut dyn GraphSession,
        kind: NodeKind,
        node_id: &NodeId,
        new_parent_id: &NodeId,
    ) -> Result<NodeRecord> {
        require_transaction(session)?;
        let relation = kind.upward_relation().ok_or_else(|| {
            AccessError::InvalidRequest(format!("{kind} cannot be moved"))
        })?;
        visible(session, kind, node_id).await?;
        self.valid_parent(session, kind, new_parent_id).await?;

        if kind == NodeKind::OrganizationUnit {
            let under_itself = new_parent_id == node_id
                || self
                    .resolver
                    .path_to_root(session, new_parent_id)
                    .await?
                    .contains(node_id);
            if under_itself {
                return Err(AccessError::InvalidParent {
                    node: node_id.clone(),
                    parent: new_parent_id.clone(),
                });
            }
        }

        let dropped = session
            .replace_relation(node_id, relation, new_parent_id)
            .await?;

        tracing::info!(%kind, id = %node_id, parent = %new_parent_id, dropped, "Node moved");
        visible(session, kind, node_id).await
    }

    /// Mark the node deleted. Deleting an already deleted node is a no-op;
    /// children and edges are left in place.
    pub async fn soft_delete(
        &self,
        session: &mut dyn GraphSession,
        kind: NodeKind,
        node_id: &NodeId,
    ) -> Result<()> {
        require_transaction(session)?;
        let node = existing(session, kind, node_id).await?;
        if node.is_deleted() {
            tracing::debug!(%kind, id = %node_id, "Already deleted");
            return Ok(());
        }

        let mut properties = Properties::new();
        properties.insert("deleted".into(), true.into());
        session.set_properties(node_id, &properties).await?;

        tracing::info!(%kind, id = %node_id, "Node deleted");
        Ok(())
    }

    /// Assign `properties` on a visible node.
    pub async fn update(
        &self,
        session: &mut dyn GraphSession,
        kind: NodeKind,
        node_id: &NodeId,
        properties: &Properties,
    ) -> Result<NodeRecord> {
        require_transaction(session)?;
        if properties.is_empty() {
            return Err(AccessError::InvalidRequest(format!(
                "Nothing to update on {kind} {node_id}"
            )));
        }
        visible(session, kind, node_id).await?;

        let updated = session
            .set_properties(node_id, properties)
            .await?
            .ok_or_else(|| AccessError::NotFound {
                kind,
                id: node_id.clone(),
            })?;

        tracing::info!(%kind, id = %node_id, fields = properties.len(), "Node updated");
        Ok(updated)
    }

    /// Add grant edges from `user_id` to each target. Existing grants are
    /// kept and repeated targets produce one edge.
    pub async fn grant(
        &self,
        session: &mut dyn GraphSession,
        user_id: &NodeId,
        access: AccessKind,
        targets: &[NodeId],
    ) -> Result<()> {
        require_transaction(session)?;
        let relation = access.grant_relation();
        let mut held: BTreeSet<NodeId> = session
            .outgoing(user_id, relation)
            .await?
            .into_iter()
            .map(|n| n.id)
            .collect();

        for target in targets {
            let node = session.get_node(target).await?;
            match node {
                Some(n) if n.kind.is_grant_target() && !n.is_deleted() => {}
                _ => {
                    return Err(AccessError::NotFound {
                        kind: NodeKind::OrganizationUnit,
                        id: target.clone(),
                    })
                }
            }
            if !held.insert(target.clone()) {
                continue;
            }
            session.create_relation(user_id, relation, target).await?;
            tracing::info!(user = %user_id, target = %target, %access, "Grant added");
        }
        Ok(())
    }

    /// Remove the `access` grant from `user_id` to `target`, if present.
    pub async fn revoke(
        &self,
        session: &mut dyn GraphSession,
        user_id: &NodeId,
        access: AccessKind,
        target: &NodeId,
    ) -> Result<()> {
        require_transaction(session)?;
        let removed = session
            .delete_relation(user_id, access.grant_relation(), target)
            .await?;

        tracing::info!(user = %user_id, target = %target, %access, removed, "Grant removed");
        Ok(())
    }

    async fn valid_parent(
        &self,
        session: &mut dyn GraphSession,
        child: NodeKind,
        parent_id: &NodeId,
    ) -> Result<NodeRecord> {
        match session.get_node(parent_id).await? {
            Some(parent)
                if !parent.is_deleted() && child.parent_kinds().contains(&parent.kind) =>
            {
                Ok(parent)
            }
            _ => Err(AccessError::ParentNotFound {
                child,
                parent: parent_id.clone(),
            }),
        }
    }
}

fn require_transaction(session: &dyn GraphSession) -> Result<()> {
    if session.in_transaction() {
        Ok(())
    } else {
        Err(AccessError::TransactionRequired)
    }
}

/// A node of `kind`, deleted or not.
pub(crate) async fn existing(
    session: &mut dyn GraphSession,
    kind: NodeKind,
    id: &NodeId,
) -> Result<NodeRecord> {
    match session.get_node(id).await? {
        Some(node) if node.kind == kind => Ok(node),
        _ => Err(AccessError::NotFound {
            kind,
            id: id.clone(),
        }),
    }
}

/// A non-deleted node of `kind`.
pub(crate) async fn visible(
    session: &mut dyn GraphSession,
    kind: NodeKind,
    id: &NodeId,
) -> Result<NodeRecord> {
    let node = existing(session, kind, id).await?;
    if node.is_deleted() {
        return Err(AccessError::NotFound {
            kind,
            id: id.clone(),
        });
    }
    Ok(node)
}
