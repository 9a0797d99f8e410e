//! Resource services for the organization hierarchy.
//!
//! Each service checks access through [`AccessPolicy`] before touching a
//! resource and enriches responses with materialized paths. Services take
//! the request's session explicitly and never open transactions themselves.

pub mod devices;
pub mod organization_units;
pub mod outlets;
pub mod users;
pub mod workers;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use structures_core::types::{PageQuery, Paginated, Pagination};
use structures_core::{AccessKind, NodeId, NodeKind, Relation, StructuresConfig, UserRole};
use structures_graph::{GraphSession, NodeRecord};

use crate::error::{AccessError, Result};
use crate::mutator::HierarchyMutator;
use crate::path::PathResolver;
use crate::policy::AccessPolicy;

pub use devices::DeviceService;
pub use organization_units::OrganizationUnitService;
pub use outlets::OutletService;
pub use users::UserService;
pub use workers::WorkerService;

/// Identity of the caller. `user_id: None` is anonymous and holds no grants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Caller {
    #[serde(default)]
    pub user_id: Option<NodeId>,
    #[serde(default)]
    pub role: UserRole,
}

impl Caller {
    pub fn user(user_id: impl Into<NodeId>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            role: UserRole::User,
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn id(&self) -> Option<&NodeId> {
        self.user_id.as_ref()
    }
}

/// Engine pieces shared by every service.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    pub resolver: PathResolver,
    pub policy: AccessPolicy,
    pub mutator: HierarchyMutator,
    pub default_page_limit: u32,
}

impl ServiceContext {
    pub fn new(root: NodeId, max_hops: u32, default_page_limit: u32) -> Self {
        let resolver = PathResolver::new(root, max_hops);
        Self {
            policy: AccessPolicy::new(resolver.clone()),
            mutator: HierarchyMutator::new(resolver.clone()),
            resolver,
            default_page_limit,
        }
    }

    pub fn from_config(config: &StructuresConfig) -> Self {
        Self::new(
            config.root_organization_unit.clone(),
            config.max_path_hops,
            config.default_page_limit,
        )
    }

    pub fn root(&self) -> &NodeId {
        self.resolver.root()
    }

    /// Organization units a find may look under: `child_of` when the caller
    /// can read it, otherwise every unit the caller holds a grant on.
    pub(crate) async fn search_scope(
        &self,
        session: &mut dyn GraphSession,
        caller: &Caller,
        child_of: Option<&NodeId>,
    ) -> Result<Vec<NodeId>> {
        match child_of {
            Some(unit) => {
                self.policy
                    .check(
                        session,
                        caller.id(),
                        unit,
                        AccessKind::Read,
                        NodeKind::OrganizationUnit,
                    )
                    .await?;
                Ok(vec![unit.clone()])
            }
            None => {
                self.policy
                    .available_organization_units(session, caller.id())
                    .await
            }
        }
    }

    /// `scope` and every organization unit below it.
    pub(crate) async fn units_under(
        &self,
        session: &mut dyn GraphSession,
        scope: &[NodeId],
    ) -> Result<BTreeSet<NodeId>> {
        let mut units: BTreeSet<NodeId> = scope.iter().cloned().collect();
        let below = session
            .descendants(scope, Relation::ChildOf, self.resolver.max_hops())
            .await?;
        units.extend(below.into_iter().map(|n| n.id));
        Ok(units)
    }

    /// Visible members attached to any of `units` through `relation`.
    pub(crate) async fn members_of(
        &self,
        session: &mut dyn GraphSession,
        units: &BTreeSet<NodeId>,
        relation: Relation,
        active: Option<bool>,
    ) -> Result<Vec<NodeRecord>> {
        let mut members = Vec::new();
        for unit in units {
            for node in session.incoming(unit, relation).await? {
                if !node.is_deleted() && active.map_or(true, |a| node.is_active() == a) {
                    members.push(node);
                }
            }
        }
        members.sort_by(|a, b| a.id.cmp(&b.id));
        members.dedup_by(|a, b| a.id == b.id);
        Ok(members)
    }

    /// Slice `items` (already sorted) into the requested page.
    pub(crate) fn paginate<T>(&self, items: Vec<T>, page: PageQuery) -> Result<Paginated<T>> {
        if page.page == 0 {
            return Err(AccessError::InvalidRequest("page numbers start at 1".into()));
        }
        let limit = page.limit.unwrap_or(self.default_page_limit);
        if limit == 0 {
            return Err(AccessError::InvalidRequest("limit must be positive".into()));
        }

        let count = items.len() as u64;
        let skip = (page.page as usize - 1).saturating_mul(limit as usize);
        let data = items.into_iter().skip(skip).take(limit as usize).collect();

        Ok(Paginated {
            pagination: Pagination {
                page: page.page,
                limit,
                count,
            },
            data,
        })
    }
}

/// The single parent of `node` through `relation`.
pub(crate) async fn parent_id(
    session: &mut dyn GraphSession,
    node: &NodeRecord,
    relation: Relation,
    max_hops: u32,
) -> Result<NodeId> {
    session
        .outgoing(&node.id, relation)
        .await?
        .into_iter()
        .next()
        .map(|p| p.id)
        .ok_or_else(|| AccessError::PathResolution {
            node_id: node.id.clone(),
            max_hops,
        })
}

pub(crate) fn text(node: &NodeRecord, key: &str) -> String {
    node.str_prop(key).unwrap_or_default().to_string()
}
