use structures_core::types::{HierarchyFilter, NewOutlet, Outlet, OutletPatch, PageQuery, Paginated};
use structures_core::{AccessKind, NodeId, NodeKind, Properties, Relation};
use structures_graph::{GraphSession, NodeRecord};

use crate::error::Result;
use crate::mutator::{existing, visible};
use crate::services::{parent_id, text, Caller, ServiceContext};

const KIND: NodeKind = NodeKind::Outlet;

/// Outlets answer to the organization unit they belong to.
#[derive(Debug, Clone)]
pub struct OutletService {
    ctx: ServiceContext,
}

impl OutletService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub async fn create(
        &self,
        session: &mut dyn GraphSession,
        caller: &Caller,
        dto: NewOutlet,
    ) -> Result<Outlet> {
        self.ctx
            .policy
            .check(
                session,
                caller.id(),
                &dto.organization_unit_id,
                AccessKind::Write,
                NodeKind::OrganizationUnit,
            )
            .await?;

        let node = self
            .ctx
            .mutator
            .create(session, KIND, &dto.organization_unit_id, dto.properties())
            .await?;
        self.to_resource(session, node).await
    }

    pub async fn update(
        &self,
        session: &mut dyn GraphSession,
        caller: &Caller,
        id: &NodeId,
        patch: OutletPatch,
    ) -> Result<Outlet> {
        self.checked(session, caller, id, AccessKind::Write).await?;
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
    ) -> Result<Outlet> {
        let node = self.checked(session, caller, id, AccessKind::Read).await?;
        self.to_resource(session, node).await
    }

    pub async fn find(
        &self,
        session: &mut dyn GraphSession,
        caller: &Caller,
        filter: HierarchyFilter,
        page: PageQuery,
    ) -> Result<Paginated<Outlet>> {
        let scope = self
            .ctx
            .search_scope(session, caller, filter.child_of.as_ref())
            .await?;
        let units = self.ctx.units_under(session, &scope).await?;
        let found = self
            .ctx
            .members_of(session, &units, Relation::BelongTo, filter.active)
            .await?;

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
    ) -> Result<Outlet> {
        self.checked(session, caller, id, AccessKind::Write).await?;
        let mut properties = Properties::new();
        properties.insert("active".into(), active.into());
        let node = self
            .ctx
            .mutator
            .update(session, KIND, id, &properties)
            .await?;
        self.to_resource(session, node).await
    }

    /// Move an outlet to another organization unit.
    pub async fn change_organization(
        &self,
        session: &mut dyn GraphSession,
        caller: &Caller,
        id: &NodeId,
        organization_unit_id: &NodeId,
    ) -> Result<Outlet> {
        self.checked(session, caller, id, AccessKind::Write).await?;
        self.ctx
            .policy
            .check(
                session,
                caller.id(),
                organization_unit_id,
                AccessKind::Write,
                NodeKind::OrganizationUnit,
            )
            .await?;

        let node = self
            .ctx
            .mutator
            .reparent(session, KIND, id, organization_unit_id)
            .await?;
        self.to_resource(session, node).await
    }

    async fn checked(
        &self,
        session: &mut dyn GraphSession,
        caller: &Caller,
        id: &NodeId,
        access: AccessKind,
    ) -> Result<NodeRecord> {
        let node = visible(session, KIND, id).await?;
        self.ctx
            .policy
            .check(session, caller.id(), id, access, KIND)
            .await?;
        Ok(node)
    }

    async fn to_resource(&self, session: &mut dyn GraphSession, node: NodeRecord) -> Result<Outlet> {
        let unit = parent_id(session, &node, Relation::BelongTo, self.ctx.resolver.max_hops()).await?;
        let materialized_path = self.ctx.resolver.materialized_path(session, &unit).await?;

        Ok(Outlet {
            name: text(&node, "name"),
            address: text(&node, "address"),
            active: node.is_active(),
            organization_unit_id: unit,
            materialized_path,
            id: node.id,
        })
    }
}
