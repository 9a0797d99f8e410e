//! Structures Graph: the graph store capability for the organization hierarchy.
//!
//! Every read and write of the hierarchy goes through a [`GraphSession`]
//! obtained from a [`GraphStore`]. Two stores are provided: [`GraphClient`]
//! over Neo4j and [`MemoryGraph`] for tests and local runs.

pub mod client;
pub mod memory;
pub mod mutations;
pub mod queries;
pub mod session;
pub mod store;

pub use client::{GraphClient, GraphConfig, GraphError};
pub use memory::MemoryGraph;
pub use session::Neo4jSession;
pub use store::{GraphSession, GraphStore, NewNode, NodeRecord};
