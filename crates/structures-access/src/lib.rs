//! structures-access: Hierarchical access control and path resolution for
//! the organization tree.
//!
//! Decides whether a user may read or write an organization unit, outlet,
//! device, or worker from the user's grants and the node's ancestor path,
//! and performs the structural writes behind the resource operations. All
//! graph access goes through a [`structures_graph::GraphSession`] owned by
//! one [`transaction::RequestScope`] per request.

pub mod dispatch;
pub mod error;
pub mod mutator;
pub mod path;
pub mod policy;
pub mod services;
pub mod transaction;

pub use dispatch::{Dispatcher, Operation, OperationTable, Request, Response};
pub use error::AccessError;
pub use mutator::HierarchyMutator;
pub use path::PathResolver;
pub use policy::AccessPolicy;
pub use services::{Caller, ServiceContext};
pub use transaction::{RequestScope, TxMode, TxState};
