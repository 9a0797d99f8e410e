//! Typed requests, the operation table, and the request dispatcher.
//!
//! Every request names an [`Operation`]. The [`OperationTable`] decides per
//! operation whether the request runs inside a transaction; the
//! [`Dispatcher`] opens the [`RequestScope`], routes to the service, maps
//! errors to status codes, and finishes the scope.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use structures_core::types::{
    DeviceFilter, DevicePatch, HierarchyFilter, NewDevice, NewOrganizationUnit, NewOutlet,
    NewUser, NewWorker, OrganizationUnitPatch, OutletPatch, PageQuery, WorkerPatch,
};
use structures_core::{AccessKind, NodeId, StructuresConfig};
use structures_graph::{GraphSession, GraphStore};

use crate::error::{AccessError, Result};
use crate::services::{
    Caller, DeviceService, OrganizationUnitService, OutletService, ServiceContext, UserService,
    WorkerService,
};
use crate::transaction::{RequestScope, TxMode};

/// Every operation the dispatcher can route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CreateOrganizationUnit,
    UpdateOrganizationUnit,
    DeleteOrganizationUnit,
    GetOrganizationUnit,
    FindOrganizationUnits,
    ActivateOrganizationUnit,
    DeactivateOrganizationUnit,
    ChangeOrganizationUnitParent,

    CreateOutlet,
    UpdateOutlet,
    DeleteOutlet,
    GetOutlet,
    FindOutlets,
    ActivateOutlet,
    DeactivateOutlet,
    ChangeOutletOrganization,

    CreateDevice,
    UpdateDevice,
    DeleteDevice,
    GetDevice,
    FindDevices,
    ActivateDevice,
    DeactivateDevice,
    ChangeDeviceOutlet,
    CheckExamEligibility,

    CreateWorker,
    UpdateWorker,
    DeleteWorker,
    GetWorker,
    FindWorkers,
    ActivateWorker,
    DeactivateWorker,
    ChangeWorkerOrganization,

    CreateUser,
    GetUser,
    DeleteUser,
    AddReadAccess,
    AddWriteAccess,
    RemoveReadAccess,
    RemoveWriteAccess,

    CheckAccess,
    ResolvePath,
}

/// Operation to transaction mode, fixed when the dispatcher is built.
#[derive(Debug, Clone, Default)]
pub struct OperationTable {
    modes: HashMap<Operation, TxMode>,
}

impl OperationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads run without a transaction; everything that writes gets one.
    pub fn standard() -> Self {
        use Operation::*;
        use TxMode::*;

        let entries = [
            (CreateOrganizationUnit, Transactional),
            (UpdateOrganizationUnit, Transactional),
            (DeleteOrganizationUnit, Transactional),
            (GetOrganizationUnit, ReadOnly),
            (FindOrganizationUnits, ReadOnly),
            (ActivateOrganizationUnit, Transactional),
            (DeactivateOrganizationUnit, Transactional),
            (ChangeOrganizationUnitParent, Transactional),
            (CreateOutlet, Transactional),
            (UpdateOutlet, Transactional),
            (DeleteOutlet, Transactional),
            (GetOutlet, ReadOnly),
            (FindOutlets, ReadOnly),
            (ActivateOutlet, Transactional),
            (DeactivateOutlet, Transactional),
            (ChangeOutletOrganization, Transactional),
            (CreateDevice, Transactional),
            (UpdateDevice, Transactional),
            (DeleteDevice, Transactional),
            (GetDevice, ReadOnly),
            (FindDevices, ReadOnly),
            (ActivateDevice, Transactional),
            (DeactivateDevice, Transactional),
            (ChangeDeviceOutlet, Transactional),
            (CheckExamEligibility, ReadOnly),
            (CreateWorker, Transactional),
            (UpdateWorker, Transactional),
            (DeleteWorker, Transactional),
            (GetWorker, ReadOnly),
            (FindWorkers, ReadOnly),
            (ActivateWorker, Transactional),
            (DeactivateWorker, Transactional),
            (ChangeWorkerOrganization, Transactional),
            (CreateUser, Transactional),
            (GetUser, ReadOnly),
            (DeleteUser, Transactional),
            (AddReadAccess, Transactional),
            (AddWriteAccess, Transactional),
            (RemoveReadAccess, Transactional),
            (RemoveWriteAccess, Transactional),
            (CheckAccess, ReadOnly),
            (ResolvePath, ReadOnly),
        ];

        let mut table = Self::new();
        for (operation, mode) in entries {
            table.register(operation, mode);
        }
        table
    }

    pub fn register(&mut self, operation: Operation, mode: TxMode) {
        self.modes.insert(operation, mode);
    }

    pub fn mode(&self, operation: Operation) -> Option<TxMode> {
        self.modes.get(&operation).copied()
    }
}

/// A request to the engine, tagged by `operation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Request {
    CreateOrganizationUnit(NewOrganizationUnit),
    UpdateOrganizationUnit {
        id: NodeId,
        patch: OrganizationUnitPatch,
    },
    DeleteOrganizationUnit {
        id: NodeId,
    },
    GetOrganizationUnit {
        id: NodeId,
    },
    FindOrganizationUnits {
        #[serde(default)]
        filter: HierarchyFilter,
        #[serde(default)]
        page: PageQuery,
    },
    ActivateOrganizationUnit {
        id: NodeId,
    },
    DeactivateOrganizationUnit {
        id: NodeId,
    },
    ChangeOrganizationUnitParent {
        id: NodeId,
        parent: NodeId,
    },

    CreateOutlet(NewOutlet),
    UpdateOutlet {
        id: NodeId,
        patch: OutletPatch,
    },
    DeleteOutlet {
        id: NodeId,
    },
    GetOutlet {
        id: NodeId,
    },
    FindOutlets {
        #[serde(default)]
        filter: HierarchyFilter,
        #[serde(default)]
        page: PageQuery,
    },
    ActivateOutlet {
        id: NodeId,
    },
    DeactivateOutlet {
        id: NodeId,
    },
    ChangeOutletOrganization {
        id: NodeId,
        organization_unit_id: NodeId,
    },

    CreateDevice(NewDevice),
    UpdateDevice {
        id: NodeId,
        patch: DevicePatch,
    },
    DeleteDevice {
        id: NodeId,
    },
    GetDevice {
        id: NodeId,
    },
    FindDevices {
        #[serde(default)]
        filter: DeviceFilter,
        #[serde(default)]
        page: PageQuery,
    },
    ActivateDevice {
        id: NodeId,
    },
    DeactivateDevice {
        id: NodeId,
    },
    ChangeDeviceOutlet {
        id: NodeId,
        outlet_id: NodeId,
    },
    CheckExamEligibility {
        device_id: NodeId,
        worker_id: NodeId,
    },

    CreateWorker(NewWorker),
    UpdateWorker {
        id: NodeId,
        patch: WorkerPatch,
    },
    DeleteWorker {
        id: NodeId,
    },
    GetWorker {
        id: NodeId,
    },
    FindWorkers {
        #[serde(default)]
        filter: HierarchyFilter,
        #[serde(default)]
        page: PageQuery,
    },
    ActivateWorker {
        id: NodeId,
    },
    DeactivateWorker {
        id: NodeId,
    },
    ChangeWorkerOrganization {
        id: NodeId,
        organization_unit_id: NodeId,
    },

    CreateUser(NewUser),
    GetUser {
        id: NodeId,
    },
    DeleteUser {
        id: NodeId,
    },
    AddReadAccess {
        id: NodeId,
        targets: Vec<NodeId>,
    },
    AddWriteAccess {
        id: NodeId,
        targets: Vec<NodeId>,
    },
    RemoveReadAccess {
        id: NodeId,
        target: NodeId,
    },
    RemoveWriteAccess {
        id: NodeId,
        target: NodeId,
    },

    CheckAccess {
        target: NodeId,
        kind: AccessKind,
    },
    ResolvePath {
        node: NodeId,
    },
}

impl Request {
    pub fn operation(&self) -> Operation {
        match self {
            Request::CreateOrganizationUnit(_) => Operation::CreateOrganizationUnit,
            Request::UpdateOrganizationUnit { .. } => Operation::UpdateOrganizationUnit,
            Request::DeleteOrganizationUnit { .. } => Operation::DeleteOrganizationUnit,
            Request::GetOrganizationUnit { .. } => Operation::GetOrganizationUnit,
            Request::FindOrganizationUnits { .. } => Operation::FindOrganizationUnits,
            Request::ActivateOrganizationUnit { .. } => Operation::ActivateOrganizationUnit,
            Request::DeactivateOrganizationUnit { .. } => Operation::DeactivateOrganizationUnit,
            Request::ChangeOrganizationUnitParent { .. } => {
                Operation::ChangeOrganizationUnitParent
            }
            Request::CreateOutlet(_) => Operation::CreateOutlet,
            Request::UpdateOutlet { .. } => Operation::UpdateOutlet,
            Request::DeleteOutlet { .. } => Operation::DeleteOutlet,
            Request::GetOutlet { .. } => Operation::GetOutlet,
            Request::FindOutlets { .. } => Operation::FindOutlets,
            Request::ActivateOutlet { .. } => Operation::ActivateOutlet,
            Request::DeactivateOutlet { .. } => Operation::DeactivateOutlet,
            Request::ChangeOutletOrganization { .. } => Operation::ChangeOutletOrganization,
            Request::CreateDevice(_) => Operation::CreateDevice,
            Request::UpdateDevice { .. } => Operation::UpdateDevice,
            Request::DeleteDevice { .. } => Operation::DeleteDevice,
            Request::GetDevice { .. } => Operation::GetDevice,
            Request::FindDevices { .. } => Operation::FindDevices,
            Request::ActivateDevice { .. } => Operation::ActivateDevice,
            Request::DeactivateDevice { .. } => Operation::DeactivateDevice,
            Request::ChangeDeviceOutlet { .. } => Operation::ChangeDeviceOutlet,
            Request::CheckExamEligibility { .. } => Operation::CheckExamEligibility,
            Request::CreateWorker(_) => Operation::CreateWorker,
            Request::UpdateWorker { .. } => Operation::UpdateWorker,
            Request::DeleteWorker { .. } => Operation::DeleteWorker,
            Request::GetWorker { .. } => Operation::GetWorker,
            Request::FindWorkers { .. } => Operation::FindWorkers,
            Request::ActivateWorker { .. } => Operation::ActivateWorker,
            Request::DeactivateWorker { .. } => Operation::DeactivateWorker,
            Request::ChangeWorkerOrganization { .. } => Operation::ChangeWorkerOrganization,
            Request::CreateUser(_) => Operation::CreateUser,
            Request::GetUser { .. } => Operation::GetUser,
            Request::DeleteUser { .. } => Operation::DeleteUser,
            Request::AddReadAccess { .. } => Operation::AddReadAccess,
            Request::AddWriteAccess { .. } => Operation::AddWriteAccess,
            Request::RemoveReadAccess { .. } => Operation::RemoveReadAccess,
            Request::RemoveWriteAccess { .. } => Operation::RemoveWriteAccess,
            Request::CheckAccess { .. } => Operation::CheckAccess,
            Request::ResolvePath { .. } => Operation::ResolvePath,
        }
    }
}

/// Status code and JSON body of a handled request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    pub fn ok<T: Serialize>(body: &T) -> Result<Self> {
        Ok(Self {
            status: 200,
            body: serde_json::to_value(body)?,
        })
    }

    pub fn created<T: Serialize>(body: &T) -> Result<Self> {
        Ok(Self {
            status: 201,
            body: serde_json::to_value(body)?,
        })
    }

    pub fn from_error(error: &AccessError) -> Self {
        Self {
            status: error.status_code(),
            body: json!({ "error": error.to_string() }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status < 400
    }
}

/// Routes requests to the resource services within a per-request scope.
pub struct Dispatcher {
    store: Arc<dyn GraphStore>,
    table: OperationTable,
    ctx: ServiceContext,
    organization_units: OrganizationUnitService,
    outlets: OutletService,
    devices: DeviceService,
    workers: WorkerService,
    users: UserService,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn GraphStore>, ctx: ServiceContext) -> Self {
        Self {
            store,
            table: OperationTable::standard(),
            organization_units: OrganizationUnitService::new(ctx.clone()),
            outlets: OutletService::new(ctx.clone()),
            devices: DeviceService::new(ctx.clone()),
            workers: WorkerService::new(ctx.clone()),
            users: UserService::new(ctx.clone()),
            ctx,
        }
    }

    pub fn from_config(store: Arc<dyn GraphStore>, config: &StructuresConfig) -> Self {
        Self::new(store, ServiceContext::from_config(config))
    }

    pub fn with_table(mut self, table: OperationTable) -> Self {
        self.table = table;
        self
    }

    pub fn context(&self) -> &ServiceContext {
        &self.ctx
    }

    /// Handle one request end to end. Never fails: errors become responses.
    pub async fn handle(&self, caller: &Caller, request: Request) -> Response {
        let operation = request.operation();
        let Some(mode) = self.table.mode(operation) else {
            let error = AccessError::InvalidRequest(format!("{operation:?} is not registered"));
            return Response::from_error(&error);
        };

        let mut scope = match RequestScope::open(self.store.as_ref(), mode).await {
            Ok(scope) => scope,
            Err(e) => return Response::from_error(&e),
        };

        let response = match self.route(scope.session(), caller, request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(?operation, error = %e, "Request failed");
                Response::from_error(&e)
            }
        };

        match scope.finish(response.status).await {
            Ok(state) => {
                tracing::debug!(?operation, status = response.status, ?state, "Request handled");
                response
            }
            Err(e) => Response::from_error(&e),
        }
    }

    async fn route(
        &self,
        session: &mut dyn GraphSession,
        caller: &Caller,
        request: Request,
    ) -> Result<Response> {
        match request {
            // ── Organization units ───────────────────────────────
            Request::CreateOrganizationUnit(dto) => {
                Response::created(&self.organization_units.create(session, caller, dto).await?)
            }
            Request::UpdateOrganizationUnit { id, patch } => Response::ok(
                &self
                    .organization_units
                    .update(session, caller, &id, patch)
                    .await?,
            ),
            Request::DeleteOrganizationUnit { id } => {
                self.organization_units.delete(session, caller, &id).await?;
                deleted(&id)
            }
            Request::GetOrganizationUnit { id } => {
                Response::ok(&self.organization_units.get(session, caller, &id).await?)
            }
            Request::FindOrganizationUnits { filter, page } => Response::ok(
                &self
                    .organization_units
                    .find(session, caller, filter, page)
                    .await?,
            ),
            Request::ActivateOrganizationUnit { id } => Response::ok(
                &self
                    .organization_units
                    .set_active(session, caller, &id, true)
                    .await?,
            ),
            Request::DeactivateOrganizationUnit { id } => Response::ok(
                &self
                    .organization_units
                    .set_active(session, caller, &id, false)
                    .await?,
            ),
            Request::ChangeOrganizationUnitParent { id, parent } => Response::ok(
                &self
                    .organization_units
                    .change_parent(session, caller, &id, &parent)
                    .await?,
            ),

            // ── Outlets ──────────────────────────────────────────
            Request::CreateOutlet(dto) => {
                Response::created(&self.outlets.create(session, caller, dto).await?)
            }
            Request::UpdateOutlet { id, patch } => {
                Response::ok(&self.outlets.update(session, caller, &id, patch).await?)
            }
            Request::DeleteOutlet { id } => {
                self.outlets.delete(session, caller, &id).await?;
                deleted(&id)
            }
            Request::GetOutlet { id } => Response::ok(&self.outlets.get(session, caller, &id).await?),
            Request::FindOutlets { filter, page } => {
                Response::ok(&self.outlets.find(session, caller, filter, page).await?)
            }
            Request::ActivateOutlet { id } => {
                Response::ok(&self.outlets.set_active(session, caller, &id, true).await?)
            }
            Request::DeactivateOutlet { id } => {
                Response::ok(&self.outlets.set_active(session, caller, &id, false).await?)
            }
            Request::ChangeOutletOrganization {
                id,
                organization_unit_id,
            } => Response::ok(
                &self
                    .outlets
                    .change_organization(session, caller, &id, &organization_unit_id)
                    .await?,
            ),

            // ── Devices ──────────────────────────────────────────
            Request::CreateDevice(dto) => {
                Response::created(&self.devices.create(session, caller, dto).await?)
            }
            Request::UpdateDevice { id, patch } => {
                Response::ok(&self.devices.update(session, caller, &id, patch).await?)
            }
            Request::DeleteDevice { id } => {
                self.devices.delete(session, caller, &id).await?;
                deleted(&id)
            }
            Request::GetDevice { id } => Response::ok(&self.devices.get(session, caller, &id).await?),
            Request::FindDevices { filter, page } => {
                Response::ok(&self.devices.find(session, caller, filter, page).await?)
            }
            Request::ActivateDevice { id } => {
                Response::ok(&self.devices.set_active(session, caller, &id, true).await?)
            }
            Request::DeactivateDevice { id } => {
                Response::ok(&self.devices.set_active(session, caller, &id, false).await?)
            }
            Request::ChangeDeviceOutlet { id, outlet_id } => Response::ok(
                &self
                    .devices
                    .change_outlet(session, caller, &id, &outlet_id)
                    .await?,
            ),
            Request::CheckExamEligibility {
                device_id,
                worker_id,
            } => Response::ok(
                &self
                    .devices
                    .exam_eligibility(session, &device_id, &worker_id)
                    .await?,
            ),

            // ── Workers ──────────────────────────────────────────
            Request::CreateWorker(dto) => {
                Response::created(&self.workers.create(session, caller, dto).await?)
            }
            Request::UpdateWorker { id, patch } => {
                Response::ok(&self.workers.update(session, caller, &id, patch).await?)
            }
            Request::DeleteWorker { id } => {
                self.workers.delete(session, caller, &id).await?;
                deleted(&id)
            }
            Request::GetWorker { id } => Response::ok(&self.workers.get(session, caller, &id).await?),
            Request::FindWorkers { filter, page } => {
                Response::ok(&self.workers.find(session, caller, filter, page).await?)
            }
            Request::ActivateWorker { id } => {
                Response::ok(&self.workers.set_active(session, caller, &id, true).await?)
            }
            Request::DeactivateWorker { id } => {
                Response::ok(&self.workers.set_active(session, caller, &id, false).await?)
            }
            Request::ChangeWorkerOrganization {
                id,
                organization_unit_id,
            } => Response::ok(
                &self
                    .workers
                    .change_organization(session, caller, &id, &organization_unit_id)
                    .await?,
            ),

            // ── Users ────────────────────────────────────────────
            Request::CreateUser(dto) => Response::created(&self.users.create(session, dto).await?),
            Request::GetUser { id } => Response::ok(&self.users.get(session, &id).await?),
            Request::DeleteUser { id } => {
                self.users.delete(session, &id).await?;
                deleted(&id)
            }
            Request::AddReadAccess { id, targets } => Response::ok(
                &self
                    .users
                    .add_access(session, &id, AccessKind::Read, &targets)
                    .await?,
            ),
            Request::AddWriteAccess { id, targets } => Response::ok(
                &self
                    .users
                    .add_access(session, &id, AccessKind::Write, &targets)
                    .await?,
            ),
            Request::RemoveReadAccess { id, target } => Response::ok(
                &self
                    .users
                    .remove_access(session, &id, AccessKind::Read, &target)
                    .await?,
            ),
            Request::RemoveWriteAccess { id, target } => Response::ok(
                &self
                    .users
                    .remove_access(session, &id, AccessKind::Write, &target)
                    .await?,
            ),

            // ── Utility ──────────────────────────────────────────
            Request::CheckAccess { target, kind } => {
                let granted = self
                    .ctx
                    .policy
                    .has_access(session, caller.id(), &target, kind)
                    .await?;
                Response::ok(&json!({
                    "user_id": caller.id(),
                    "target": target,
                    "kind": kind,
                    "granted": granted,
                }))
            }
            Request::ResolvePath { node } => {
                let path_to_root = self.ctx.resolver.path_to_root(session, &node).await?;
                let mut materialized_path = vec![node.clone()];
                materialized_path.extend(path_to_root.iter().cloned());
                Response::ok(&json!({
                    "node": node,
                    "path_to_root": path_to_root,
                    "materialized_path": materialized_path,
                }))
            }
        }
    }
}

fn deleted(id: &NodeId) -> Result<Response> {
    Response::ok(&json!({ "id": id, "deleted": true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_request_operation_is_registered() {
        let table = OperationTable::standard();
        let requests = [
            Request::GetOrganizationUnit { id: "a".into() },
            Request::ChangeDeviceOutlet {
                id: "d".into(),
                outlet_id: "o".into(),
            },
            Request::RemoveWriteAccess {
                id: "u".into(),
                target: "a".into(),
            },
            Request::ResolvePath { node: "a".into() },
        ];
        for request in requests {
            assert!(table.mode(request.operation()).is_some());
        }
        assert_eq!(table.modes.len(), 42);
    }

    #[test]
    fn reads_are_not_transactional() {
        let table = OperationTable::standard();
        assert_eq!(table.mode(Operation::GetOutlet), Some(TxMode::ReadOnly));
        assert_eq!(table.mode(Operation::FindDevices), Some(TxMode::ReadOnly));
        assert_eq!(table.mode(Operation::CheckAccess), Some(TxMode::ReadOnly));
        assert_eq!(
            table.mode(Operation::CheckExamEligibility),
            Some(TxMode::ReadOnly)
        );
        assert_eq!(
            table.mode(Operation::ChangeOrganizationUnitParent),
            Some(TxMode::Transactional)
        );
        assert_eq!(table.mode(Operation::DeleteUser), Some(TxMode::Transactional));
    }

    #[test]
    fn request_decodes_from_tagged_json() {
        let request: Request = serde_json::from_value(json!({
            "operation": "create_organization_unit",
            "name": "Acme",
            "inn": 7707083893_i64,
            "kpp": 773601001,
        }))
        .unwrap();
        assert_eq!(request.operation(), Operation::CreateOrganizationUnit);

        let request: Request = serde_json::from_value(json!({
            "operation": "find_outlets",
            "filter": { "child_of": "a" },
        }))
        .unwrap();
        match request {
            Request::FindOutlets { filter, page } => {
                assert_eq!(filter.child_of, Some(NodeId::from("a")));
                assert_eq!(page, PageQuery::default());
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn error_response_carries_status() {
        let response = Response::from_error(&AccessError::InvalidParent {
            node: "a".into(),
            parent: "b".into(),
        });
        assert_eq!(response.status, 409);
        assert!(!response.is_success());
        assert!(response.body["error"].as_str().unwrap().contains("cycle"));
    }
}
