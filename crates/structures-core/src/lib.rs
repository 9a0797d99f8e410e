//! structures-core: Shared types, configuration, and error handling for the structures services.
//!
//! This crate provides the foundational types used across all components:
//! - Node kinds (root, organization unit, outlet, device, worker, user)
//! - Relationship types (CHILD_OF, BELONG_TO, READ_ACCESS, ...)
//! - Resource, create, patch, and pagination types
//! - Configuration management
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use config::{Neo4jSettings, StructuresConfig};
pub use error::StructuresError;
pub use types::{AccessKind, NodeId, NodeKind, Properties, Relation, UserRole};
