use std::collections::BTreeSet;

use structures_core::types::{
    Device, DeviceExam, DeviceFilter, DevicePatch, NewDevice, PageQuery, Paginated,
};
use structures_core::{AccessKind, NodeId, NodeKind, Properties, Relation};
use structures_graph::{GraphSession, NodeRecord};

use crate::error::{AccessError, Result};
use crate::mutator::{existing, visible};
use crate::services::{parent_id, text, Caller, ServiceContext, WorkerService};

const KIND: NodeKind = NodeKind::Device;

/// Devices answer to the organization unit of the outlet they are located at.
#[derive(Debug, Clone)]
pub struct DeviceService {
    ctx: ServiceContext,
}

impl DeviceService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub async fn create(
        &self,
        session: &mut dyn GraphSession,
        caller: &Caller,
        dto: NewDevice,
    ) -> Result<Device> {
        self.ctx
            .policy
            .check(
                session,
                caller.id(),
                &dto.outlet_id,
                AccessKind::Write,
                NodeKind::Outlet,
            )
            .await?;

        let node = self
            .ctx
            .mutator
            .create(session, KIND, &dto.outlet_id, dto.properties())
            .await?;
        self.to_resource(session, node).await
    }

    pub async fn update(
        &self,
        session: &mut dyn GraphSession,
        caller: &Caller,
        id: &NodeId,
        patch: DevicePatch,
    ) -> Result<Device> {
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
            .check(session, caller.id(), id, AccessKind::Write, NodeKind::Outlet)
            .await?;
        self.ctx.mutator.soft_delete(session, KIND, id).await
    }

    pub async fn get(
        &self,
        session: &mut dyn GraphSession,
        caller: &Caller,
        id: &NodeId,
    ) -> Result<Device> {
        let node = self.checked(session, caller, id, AccessKind::Read).await?;
        self.to_resource(session, node).await
    }

    /// Devices at outlets under the search scope, optionally narrowed to one outlet.
    pub async fn find(
        &self,
        session: &mut dyn GraphSession,
        caller: &Caller,
        filter: DeviceFilter,
        page: PageQuery,
    ) -> Result<Paginated<Device>> {
        let scope = self
            .ctx
            .search_scope(session, caller, filter.child_of_organization_unit.as_ref())
            .await?;
        let units = self.ctx.units_under(session, &scope).await?;
        let mut outlets: BTreeSet<NodeId> = self
            .ctx
            .members_of(session, &units, Relation::BelongTo, None)
            .await?
            .into_iter()
            .map(|o| o.id)
            .collect();

        if let Some(outlet) = &filter.child_of_outlet {
            self.ctx
                .policy
                .check(
                    session,
                    caller.id(),
                    outlet,
                    AccessKind::Read,
                    NodeKind::Outlet,
                )
                .await?;
            outlets.retain(|o| o == outlet);
        }

        let found = self
            .ctx
            .members_of(session, &outlets, Relation::LocatedAt, filter.active)
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
    ) -> Result<Device> {
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

    /// Move a device to another outlet. Requires WRITE on both outlets.
    pub async fn change_outlet(
        &self,
        session: &mut dyn GraphSession,
        caller: &Caller,
        id: &NodeId,
        outlet_id: &NodeId,
    ) -> Result<Device> {
        self.checked(session, caller, id, AccessKind::Write).await?;
        self.ctx
            .policy
            .check(
                session,
                caller.id(),
                outlet_id,
                AccessKind::Write,
                NodeKind::Outlet,
            )
            .await?;

        let node = self
            .ctx
            .mutator
            .reparent(session, KIND, id, outlet_id)
            .await?;
        self.to_resource(session, node).await
    }

    /// Clear `worker_id` for an exam on `device_id`.
    ///
    /// The device, its outlet, the outlet's organization unit and the
    /// worker must all be live and active, and the worker must work in that
    /// same unit. Caller grants are not consulted.
    pub async fn exam_eligibility(
        &self,
        session: &mut dyn GraphSession,
        device_id: &NodeId,
        worker_id: &NodeId,
    ) -> Result<DeviceExam> {
        if !self.shares_active_unit(session, device_id, worker_id).await? {
            tracing::warn!(device = %device_id, worker = %worker_id, "Exam denied");
            return Err(AccessError::ExamDenied {
                worker: worker_id.clone(),
                device: device_id.clone(),
            });
        }

        let device = visible(session, KIND, device_id).await?;
        let worker = visible(session, NodeKind::Worker, worker_id).await?;
        Ok(DeviceExam {
            device: self.to_resource(session, device).await?,
            worker: WorkerService::new(self.ctx.clone())
                .to_resource(session, worker)
                .await?,
        })
    }

    async fn shares_active_unit(
        &self,
        session: &mut dyn GraphSession,
        device_id: &NodeId,
        worker_id: &NodeId,
    ) -> Result<bool> {
        match session.get_node(device_id).await? {
            Some(device) if device.kind == KIND && usable(&device) => {}
            _ => return Ok(false),
        }
        match session.get_node(worker_id).await? {
            Some(worker) if worker.kind == NodeKind::Worker && usable(&worker) => {}
            _ => return Ok(false),
        }

        let worker_units = session.outgoing(worker_id, Relation::WorkIn).await?;
        for outlet in session.outgoing(device_id, Relation::LocatedAt).await? {
            if !usable(&outlet) {
                continue;
            }
            for unit in session.outgoing(&outlet.id, Relation::BelongTo).await? {
                let shared = unit.kind == NodeKind::OrganizationUnit
                    && usable(&unit)
                    && worker_units.iter().any(|u| u.id == unit.id);
                if shared {
                    return Ok(true);
                }
            }
        }
        Ok(false)
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
            .check(session, caller.id(), id, access, NodeKind::Outlet)
            .await?;
        Ok(node)
    }

    async fn to_resource(&self, session: &mut dyn GraphSession, node: NodeRecord) -> Result<Device> {
        let resolver = &self.ctx.resolver;
        let max_hops = resolver.max_hops();

        let outlet_id = parent_id(session, &node, Relation::LocatedAt, max_hops).await?;
        let outlet = existing(session, NodeKind::Outlet, &outlet_id).await?;
        let unit = parent_id(session, &outlet, Relation::BelongTo, max_hops).await?;

        let materialized_path = resolver.materialized_path(session, &unit).await?;
        let active = node.is_active();
        let is_active_tree = active && resolver.is_in_active_tree(session, &unit).await?;

        Ok(Device {
            license: text(&node, "license"),
            active,
            outlet_id,
            materialized_path,
            is_active_tree,
            id: node.id,
        })
    }
}

fn usable(node: &NodeRecord) -> bool {
    !node.is_deleted() && node.is_active()
}
