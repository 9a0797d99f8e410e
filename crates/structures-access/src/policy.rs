//! Grant evaluation over the organization hierarchy.
//!
//! A user holds access of a given kind on a node iff one of their grants of
//! that kind targets the node's governing organization unit, one of its
//! ancestors, or the root.

use std::collections::HashSet;

use structures_core::{AccessKind, NodeId, NodeKind, Relation};
use structures_graph::{GraphSession, NodeRecord};

use crate::error::{AccessError, Result};
use crate::path::PathResolver;

#[derive(Debug, Clone)]
pub struct AccessPolicy {
    resolver: PathResolver,
}

impl AccessPolicy {
    pub fn new(resolver: PathResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Decide whether `user` holds `kind` access on `target`.
    ///
    /// Anonymous, missing, and deleted users hold nothing. A missing
    /// target is judged by its own id and the root only.
    pub async fn has_access(
        &self,
        session: &mut dyn GraphSession,
        user: Option<&NodeId>,
        target: &NodeId,
        kind: AccessKind,
    ) -> Result<bool> {
        let grants = self.grants(session, user, kind).await?;
        if grants.is_empty() {
            tracing::debug!(?user, target = %target, %kind, granted = false, "No grants");
            return Ok(false);
        }

        let scope = self.scope(session, target).await?;
        let granted = scope.iter().any(|id| grants.contains(id));

        tracing::debug!(?user, target = %target, %kind, granted, "Access decision");
        Ok(granted)
    }

    /// Like [`has_access`](Self::has_access) but a denial becomes
    /// [`AccessError::AccessDenied`] naming `resource`.
    pub async fn check(
        &self,
        session: &mut dyn GraphSession,
        user: Option<&NodeId>,
        target: &NodeId,
        kind: AccessKind,
        resource: NodeKind,
    ) -> Result<()> {
        if self.has_access(session, user, target, kind).await? {
            return Ok(());
        }

        let user = user.map_or_else(|| "anonymous".to_string(), |u| u.to_string());
        tracing::warn!(user = %user, target = %target, %kind, %resource, "Access denied");
        Err(AccessError::AccessDenied {
            resource,
            user,
            target: target.clone(),
            kind,
        })
    }

    /// Targets of the user's READ and WRITE grants, deduplicated.
    pub async fn available_organization_units(
        &self,
        session: &mut dyn GraphSession,
        user: Option<&NodeId>,
    ) -> Result<Vec<NodeId>> {
        let mut units = self.grants(session, user, AccessKind::Read).await?;
        units.extend(self.grants(session, user, AccessKind::Write).await?);

        let mut units: Vec<NodeId> = units.into_iter().collect();
        units.sort();
        Ok(units)
    }

    async fn grants(
        &self,
        session: &mut dyn GraphSession,
        user: Option<&NodeId>,
        kind: AccessKind,
    ) -> Result<HashSet<NodeId>> {
        let Some(user_id) = user else {
            return Ok(HashSet::new());
        };
        match session.get_node(user_id).await? {
            Some(u) if u.kind == NodeKind::User && !u.is_deleted() => {}
            _ => return Ok(HashSet::new()),
        }

        let targets = session.outgoing(user_id, kind.grant_relation()).await?;
        Ok(targets.into_iter().map(|n| n.id).collect())
    }

    /// Materialized path of the governing unit plus the root.
    async fn scope(
        &self,
        session: &mut dyn GraphSession,
        target: &NodeId,
    ) -> Result<HashSet<NodeId>> {
        let root = self.resolver.root().clone();

        let unit = match session.get_node(target).await? {
            Some(node) => governing_unit(session, &node).await?,
            None => None,
        };
        let Some(unit) = unit else {
            return Ok(HashSet::from([target.clone(), root]));
        };

        let mut scope: HashSet<NodeId> = self
            .resolver
            .materialized_path(session, &unit)
            .await?
            .into_iter()
            .collect();
        scope.insert(root);
        Ok(scope)
    }
}

/// The organization unit that decides access to `node`: outlets and
/// workers answer to their unit, devices to their outlet's unit.
async fn governing_unit(
    session: &mut dyn GraphSession,
    node: &NodeRecord,
) -> Result<Option<NodeId>> {
    let hops: &[Relation] = match node.kind {
        NodeKind::OrganizationUnit | NodeKind::Root => return Ok(Some(node.id.clone())),
        NodeKind::Outlet => &[Relation::BelongTo],
        NodeKind::Worker => &[Relation::WorkIn],
        NodeKind::Device => &[Relation::LocatedAt, Relation::BelongTo],
        NodeKind::User => return Ok(None),
    };

    let mut current = node.id.clone();
    for relation in hops {
        match session.outgoing(&current, *relation).await?.into_iter().next() {
            Some(parent) => current = parent.id,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}
