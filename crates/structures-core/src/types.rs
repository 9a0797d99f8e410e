//! Core domain types for the organization graph.
//!
//! These types describe the nodes and relationships of the organization
//! hierarchy (root, organization units, outlets, devices, workers, users)
//! and the request/response shapes shared by the resource services.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StructuresError;

/// Property bag stored on a graph node.
pub type Properties = serde_json::Map<String, serde_json::Value>;

// ── Identifiers ───────────────────────────────────────────────────

/// Opaque, stable identifier of any node in the organization graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ── Node Kinds ────────────────────────────────────────────────────

/// The label of a node in the organization graph.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NodeKind {
    #[serde(rename = "RootOrganizationUnit")]
    Root,
    OrganizationUnit,
    Outlet,
    Device,
    Worker,
    User,
}

impl NodeKind {
    pub const ALL: [NodeKind; 6] = [
        NodeKind::Root,
        NodeKind::OrganizationUnit,
        NodeKind::Outlet,
        NodeKind::Device,
        NodeKind::Worker,
        NodeKind::User,
    ];

    /// Graph label for this kind.
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Root => "RootOrganizationUnit",
            NodeKind::OrganizationUnit => "OrganizationUnit",
            NodeKind::Outlet => "Outlet",
            NodeKind::Device => "Device",
            NodeKind::Worker => "Worker",
            NodeKind::User => "User",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.label() == label)
    }

    /// The single relationship that points from a node of this kind to
    /// its parent. `None` for the root and for users.
    pub fn upward_relation(&self) -> Option<Relation> {
        match self {
            NodeKind::OrganizationUnit => Some(Relation::ChildOf),
            NodeKind::Outlet => Some(Relation::BelongTo),
            NodeKind::Device => Some(Relation::LocatedAt),
            NodeKind::Worker => Some(Relation::WorkIn),
            NodeKind::Root | NodeKind::User => None,
        }
    }

    /// Kinds a node of this kind may be placed under.
    pub fn parent_kinds(&self) -> &'static [NodeKind] {
        match self {
            NodeKind::OrganizationUnit => &[NodeKind::OrganizationUnit, NodeKind::Root],
            NodeKind::Outlet | NodeKind::Worker => &[NodeKind::OrganizationUnit],
            NodeKind::Device => &[NodeKind::Outlet],
            NodeKind::Root | NodeKind::User => &[],
        }
    }

    /// Whether a node of this kind may hold (or receive) access grants.
    pub fn is_grant_target(&self) -> bool {
        matches!(self, NodeKind::OrganizationUnit | NodeKind::Root)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Relationships ─────────────────────────────────────────────────

/// Directed relationship types of the organization graph.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Relation {
    ChildOf,
    BelongTo,
    LocatedAt,
    WorkIn,
    ReadAccess,
    WriteAccess,
}

impl Relation {
    /// Cypher relationship type string.
    pub fn as_cypher(&self) -> &'static str {
        match self {
            Relation::ChildOf => "CHILD_OF",
            Relation::BelongTo => "BELONG_TO",
            Relation::LocatedAt => "LOCATED_AT",
            Relation::WorkIn => "WORK_IN",
            Relation::ReadAccess => "READ_ACCESS",
            Relation::WriteAccess => "WRITE_ACCESS",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_cypher())
    }
}

// ── Access ────────────────────────────────────────────────────────

/// The kind of access being requested. Grants of one kind never imply
/// the other.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AccessKind {
    Read,
    Write,
}

impl AccessKind {
    pub fn grant_relation(&self) -> Relation {
        match self {
            AccessKind::Read => Relation::ReadAccess,
            AccessKind::Write => Relation::WriteAccess,
        }
    }
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessKind::Read => f.write_str("READ"),
            AccessKind::Write => f.write_str("WRITE"),
        }
    }
}

impl FromStr for AccessKind {
    type Err = StructuresError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "read" => Ok(AccessKind::Read),
            "write" => Ok(AccessKind::Write),
            _ => Err(StructuresError::InvalidValue {
                field: "access_kind".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Caller role. Carried through requests but not consulted by the
/// access policy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserRole {
    Admin,
    #[default]
    User,
}

impl FromStr for UserRole {
    type Err = StructuresError;

    /// Unknown roles fall back to `USER`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ADMIN" => Ok(UserRole::Admin),
            _ => Ok(UserRole::User),
        }
    }
}

// ── Resources ─────────────────────────────────────────────────────

/// An organization unit, enriched with its parent and materialized path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrganizationUnit {
    pub id: NodeId,
    pub name: String,
    pub inn: i64,
    pub kpp: i64,
    pub legal_address: Option<String>,
    pub ogrn: Option<i64>,
    pub active: bool,
    pub parent_organization_unit: Option<NodeId>,
    pub materialized_path: Vec<NodeId>,
}

/// A retail outlet placed under an organization unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Outlet {
    pub id: NodeId,
    pub name: String,
    pub address: String,
    pub active: bool,
    pub organization_unit_id: NodeId,
    pub materialized_path: Vec<NodeId>,
}

/// A device located at an outlet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    pub id: NodeId,
    pub license: String,
    pub active: bool,
    pub outlet_id: NodeId,
    pub materialized_path: Vec<NodeId>,
    pub is_active_tree: bool,
}

/// A worker employed by an organization unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Worker {
    pub id: NodeId,
    pub fio: String,
    pub drivers_license: String,
    pub active: bool,
    pub organization_unit_id: NodeId,
    pub materialized_path: Vec<NodeId>,
    pub is_active_tree: bool,
}

/// A worker cleared to take an exam on a device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceExam {
    pub device: Device,
    pub worker: Worker,
}

/// A user and the targets of their direct grants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: NodeId,
    pub name: String,
    pub read: Vec<NodeId>,
    pub write: Vec<NodeId>,
}

// ── Create Requests ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrganizationUnit {
    /// Parent unit; the configured root when absent.
    #[serde(default)]
    pub parent_organization_unit: Option<NodeId>,
    pub name: String,
    pub inn: i64,
    pub kpp: i64,
    #[serde(default)]
    pub legal_address: Option<String>,
    #[serde(default)]
    pub ogrn: Option<i64>,
}

impl NewOrganizationUnit {
    /// New units start inactive.
    pub fn properties(&self) -> Properties {
        let mut props = Properties::new();
        props.insert("name".into(), self.name.clone().into());
        props.insert("inn".into(), self.inn.into());
        props.insert("kpp".into(), self.kpp.into());
        if let Some(legal_address) = &self.legal_address {
            props.insert("legal_address".into(), legal_address.clone().into());
        }
        if let Some(ogrn) = self.ogrn {
            props.insert("ogrn".into(), ogrn.into());
        }
        props.insert("active".into(), false.into());
        props
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOutlet {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub active: bool,
    pub organization_unit_id: NodeId,
}

impl NewOutlet {
    pub fn properties(&self) -> Properties {
        let mut props = Properties::new();
        props.insert("name".into(), self.name.clone().into());
        props.insert("address".into(), self.address.clone().into());
        props.insert("active".into(), self.active.into());
        props
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDevice {
    pub license: String,
    #[serde(default)]
    pub active: bool,
    pub outlet_id: NodeId,
}

impl NewDevice {
    pub fn properties(&self) -> Properties {
        let mut props = Properties::new();
        props.insert("license".into(), self.license.clone().into());
        props.insert("active".into(), self.active.into());
        props
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorker {
    pub fio: String,
    pub drivers_license: String,
    #[serde(default)]
    pub active: bool,
    pub organization_unit_id: NodeId,
}

impl NewWorker {
    pub fn properties(&self) -> Properties {
        let mut props = Properties::new();
        props.insert("fio".into(), self.fio.clone().into());
        props.insert("drivers_license".into(), self.drivers_license.clone().into());
        props.insert("active".into(), self.active.into());
        props
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    #[serde(default)]
    pub read: Vec<NodeId>,
    #[serde(default)]
    pub write: Vec<NodeId>,
}

impl NewUser {
    pub fn properties(&self) -> Properties {
        let mut props = Properties::new();
        props.insert("name".into(), self.name.clone().into());
        props.insert("active".into(), true.into());
        props
    }
}

// ── Patches ───────────────────────────────────────────────────────
//
// Each patch lists only the fields a caller may change. `properties()`
// yields the assignments for the fields that are set.

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OrganizationUnitPatch {
    pub name: Option<String>,
    pub inn: Option<i64>,
    pub kpp: Option<i64>,
    pub legal_address: Option<String>,
    pub ogrn: Option<i64>,
}

impl OrganizationUnitPatch {
    pub fn properties(&self) -> Properties {
        let mut props = Properties::new();
        if let Some(name) = &self.name {
            props.insert("name".into(), name.clone().into());
        }
        if let Some(inn) = self.inn {
            props.insert("inn".into(), inn.into());
        }
        if let Some(kpp) = self.kpp {
            props.insert("kpp".into(), kpp.into());
        }
        if let Some(legal_address) = &self.legal_address {
            props.insert("legal_address".into(), legal_address.clone().into());
        }
        if let Some(ogrn) = self.ogrn {
            props.insert("ogrn".into(), ogrn.into());
        }
        props
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OutletPatch {
    pub name: Option<String>,
    pub address: Option<String>,
}

impl OutletPatch {
    pub fn properties(&self) -> Properties {
        let mut props = Properties::new();
        if let Some(name) = &self.name {
            props.insert("name".into(), name.clone().into());
        }
        if let Some(address) = &self.address {
            props.insert("address".into(), address.clone().into());
        }
        props
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DevicePatch {
    pub license: Option<String>,
}

impl DevicePatch {
    pub fn properties(&self) -> Properties {
        let mut props = Properties::new();
        if let Some(license) = &self.license {
            props.insert("license".into(), license.clone().into());
        }
        props
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkerPatch {
    pub fio: Option<String>,
    pub drivers_license: Option<String>,
}

impl WorkerPatch {
    pub fn properties(&self) -> Properties {
        let mut props = Properties::new();
        if let Some(fio) = &self.fio {
            props.insert("fio".into(), fio.clone().into());
        }
        if let Some(drivers_license) = &self.drivers_license {
            props.insert("drivers_license".into(), drivers_license.clone().into());
        }
        props
    }
}

// ── Find Filters & Pagination ─────────────────────────────────────

/// Filter for organization units, outlets, and workers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HierarchyFilter {
    /// Restrict the search to the subtree of this organization unit.
    pub child_of: Option<NodeId>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceFilter {
    pub child_of_organization_unit: Option<NodeId>,
    pub child_of_outlet: Option<NodeId>,
    pub active: Option<bool>,
}

/// Requested page. Pages are 1-based.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default)]
    pub limit: Option<u32>,
}

fn default_page() -> u32 {
    1
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Paginated<T> {
    pub pagination: Pagination,
    pub data: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_serializes_screaming_snake() {
        let json = serde_json::to_string(&Relation::ChildOf).unwrap();
        assert_eq!(json, "\"CHILD_OF\"");

        let json = serde_json::to_string(&Relation::WriteAccess).unwrap();
        assert_eq!(json, "\"WRITE_ACCESS\"");
        assert_eq!(Relation::BelongTo.as_cypher(), "BELONG_TO");
    }

    #[test]
    fn node_kind_labels_roundtrip() {
        for kind in NodeKind::ALL {
            assert_eq!(NodeKind::from_label(kind.label()), Some(kind));
        }
        assert_eq!(NodeKind::from_label("Host"), None);

        let json = serde_json::to_string(&NodeKind::Root).unwrap();
        assert_eq!(json, "\"RootOrganizationUnit\"");
    }

    #[test]
    fn upward_relations_follow_containment() {
        assert_eq!(
            NodeKind::OrganizationUnit.upward_relation(),
            Some(Relation::ChildOf)
        );
        assert_eq!(NodeKind::Outlet.upward_relation(), Some(Relation::BelongTo));
        assert_eq!(NodeKind::Device.upward_relation(), Some(Relation::LocatedAt));
        assert_eq!(NodeKind::Worker.upward_relation(), Some(Relation::WorkIn));
        assert_eq!(NodeKind::Root.upward_relation(), None);
        assert_eq!(NodeKind::User.upward_relation(), None);

        assert!(NodeKind::OrganizationUnit
            .parent_kinds()
            .contains(&NodeKind::Root));
        assert_eq!(NodeKind::Device.parent_kinds(), &[NodeKind::Outlet]);
    }

    #[test]
    fn access_kind_parsing() {
        assert_eq!("read".parse::<AccessKind>().unwrap(), AccessKind::Read);
        assert_eq!("WRITE".parse::<AccessKind>().unwrap(), AccessKind::Write);
        assert!("execute".parse::<AccessKind>().is_err());
        assert_eq!(AccessKind::Read.grant_relation(), Relation::ReadAccess);
        assert_eq!(AccessKind::Write.grant_relation(), Relation::WriteAccess);
    }

    #[test]
    fn unknown_role_defaults_to_user() {
        assert_eq!("admin".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert_eq!("superuser".parse::<UserRole>().unwrap(), UserRole::User);
        assert_eq!(UserRole::default(), UserRole::User);
    }

    #[test]
    fn patch_only_assigns_set_fields() {
        let patch = OrganizationUnitPatch {
            name: Some("North".to_string()),
            kpp: Some(7701),
            ..Default::default()
        };
        let props = patch.properties();
        assert_eq!(props.len(), 2);
        assert_eq!(props["name"], "North");
        assert_eq!(props["kpp"], 7701);

        assert!(OutletPatch::default().properties().is_empty());
    }

    #[test]
    fn new_organization_unit_starts_inactive() {
        let dto: NewOrganizationUnit =
            serde_json::from_str(r#"{"name": "HQ", "inn": 1, "kpp": 2}"#).unwrap();
        assert!(dto.parent_organization_unit.is_none());

        let props = dto.properties();
        assert_eq!(props["active"], false);
        assert!(!props.contains_key("ogrn"));
    }
}
