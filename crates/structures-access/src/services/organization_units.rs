use structures_core::types::{
    HierarchyFilter, NewOrganizationUnit, OrganizationUnit, OrganizationUnitPatch, PageQuery,
    Paginated,
};
use structures_core::{AccessKind, NodeId, NodeKind, Properties, Relation};
use structures_graph::{GraphSession, NodeRecord};

use crate::error::Result;
use crate::mutator::{existing, visible};
use crate::services::{text, Caller, ServiceContext};

const KIND: NodeKind = NodeKind::OrganizationUnit;

#[derive(Debug, Clone)]
pub struct OrganizationUnitService {
    ctx: ServiceContext,
}

impl OrganizationUnitService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Create a unit under the requested parent, or under the root.
    pub async fn create(
        &self,
        session: &mut dyn GraphSession,
        caller: &Caller,
        dto: NewOrganizationUnit,
    ) -> Result<OrganizationUnit> {
        let parent = dto
            .parent_organization_unit
            .clone()
            .unwrap_or_else(|| self.ctx.root().clone());
        self.ctx
            .policy
            .check(session, caller.id(), &parent, AccessKind::Write, KIND)
            .await?;

        let node = self
            .ctx
            .mutator
            .create(session, KIND, &parent, dto.properties())
            .await?;
        self.to_resource(session, node).await
    }

    pub async fn update(
        &self,
        session: &mut dyn GraphSession,
        caller: &Caller,
        id: &NodeId,
        patch: OrganizationUnitPatch,
    ) -> Result<OrganizationUnit> {
        self.writable(session, caller, id).await?;
        let node = self
            .ctx
            .mutator
            .update(session, KIND, id, &patch.properties())
            .await?;
        self.to_resource(session, node).await
    }

    pub async fn delete(
        &self,
        session: &mut dyn GraphSession,
        caller: &Caller,
        id: &NodeId,
    ) -> Result<()> {
        existing(session, KIND, id).await?;
        self.ctx
            .policy
            .check(session, caller.id(), id, AccessKind::Write, KIND)
            .await?;
        self.ctx.mutator.soft_delete(session, KIND, id).await
    }

    pub async fn get(
        &self,
        session: &mut dyn GraphSession,
        caller: &Caller,
        id: &NodeId,
    ) -> Result<OrganizationUnit> {
        let node = visible(session, KIND, id).await?;
        self.ctx
            .policy
            .check(session, caller.id(), id, AccessKind::Read, KIND)
            .await?;
        self.to_resource(session, node).await
    }

    /// Units strictly below the search scope.
    pub async fn find(
        &self,
        session: &mut dyn GraphSession,
        caller: &Caller,
        filter: HierarchyFilter,
        page: PageQuery,
    ) -> Result<Paginated<OrganizationUnit>> {
        let scope = self
            .ctx
            .search_scope(session, caller, filter.child_of.as_ref())
            .await?;

        let mut found: Vec<NodeRecord> = session
            .descendants(&scope, Relation::ChildOf, self.ctx.resolver.max_hops())
            .await?
            .into_iter()
            .filter(|n| n.kind == KIND && !n.is_deleted())
            .filter(|n| filter.active.map_or(true, |a| n.is_active() == a))
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));

        let page = self.ctx.paginate(found, page)?;
        let mut data = Vec::with_capacity(page.data.len());
        for node in page.data {
            data.push(self.to_resource(session, node).await?);
        }
        Ok(Paginated {
            pagination: page.pagination,
            data,
        })
    }

    pub async fn set_active(
        &self,
        session: &mut dyn GraphSession,
        caller: &Caller,
        id: &NodeId,
        active: bool,
    ) -> Result<OrganizationUnit> {
        self.writable(session, caller, id).await?;
        let mut properties = Properties::new();
        properties.insert("active".into(), active.into());
        let node = self
            .ctx
            .mutator
            .update(session, KIND, id, &properties)
            .await?;
        self.to_resource(session, node).await
    }

    /// Move a unit under `new_parent`. Requires WRITE on both.
    pub async fn change_parent(
        &self,
        session: &mut dyn GraphSession,
        caller: &Caller,
        id: &NodeId,
        new_parent: &NodeId,
    ) -> Result<OrganizationUnit> {
        self.writable(session, caller, id).await?;
        self.ctx
            .policy
            .check(session, caller.id(), new_parent, AccessKind::Write, KIND)
            .await?;

        let node = self
            .ctx
            .mutator
            .reparent(session, KIND, id, new_parent)
            .await?;
        self.to_resource(session, node).await
    }

    async fn writable(
        &self,
        session: &mut dyn GraphSession,
        caller: &Caller,
        id: &NodeId,
    ) -> Result<NodeRecord> {
        let node = visible(session, KIND, id).await?;
        self.ctx
            .policy
            .check(session, caller.id(), id, AccessKind::Write, KIND)
            .await?;
        Ok(node)
    }

    async fn to_resource(
        &self,
        session: &mut dyn GraphSession,
        node: NodeRecord,
    ) -> Result<OrganizationUnit> {
        let parent = session
            .outgoing(&node.id, Relation::ChildOf)
            .await?
            .into_iter()
            .next()
            .map(|p| p.id);
        let materialized_path = self.ctx.resolver.materialized_path(session, &node.id).await?;

        Ok(OrganizationUnit {
            name: text(&node, "name"),
            inn: node.int_prop("inn").unwrap_or_default(),
            kpp: node.int_prop("kpp").unwrap_or_default(),
            legal_address: node.str_prop("legal_address").map(str::to_string),
            ogrn: node.int_prop("ogrn"),
            active: node.is_active(),
            parent_organization_unit: parent,
            materialized_path,
            id: node.id,
        })
    }
}
