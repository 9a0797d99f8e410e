//! Error types for the structures-access crate.

use thiserror::Error;

use structures_core::{AccessKind, NodeId, NodeKind};
use structures_graph::GraphError;

#[derive(Error, Debug)]
pub enum AccessError {
    #[error("Graph error: {0}")]
    Graph(#[source] GraphError),

    #[error("{kind} not found: {id}")]
    NotFound { kind: NodeKind, id: NodeId },

    #[error("No valid parent {parent} for {child}")]
    ParentNotFound { child: NodeKind, parent: NodeId },

    #[error("User {user} has no {kind} access to {resource} {target}")]
    AccessDenied {
        resource: NodeKind,
        user: String,
        target: NodeId,
        kind: AccessKind,
    },

    #[error("Worker {worker} cannot take an exam on device {device}")]
    ExamDenied { worker: NodeId, device: NodeId },

    #[error("Cannot move {node} under {parent}: it would create a cycle")]
    InvalidParent { node: NodeId, parent: NodeId },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Hierarchy write attempted outside of a transaction")]
    TransactionRequired,

    #[error("Path from {node_id} does not reach the root within {max_hops} hops")]
    PathResolution { node_id: NodeId, max_hops: u32 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<GraphError> for AccessError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::TransactionRequired => AccessError::TransactionRequired,
            other => AccessError::Graph(other),
        }
    }
}

impl AccessError {
    /// HTTP-style status for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            AccessError::NotFound { .. } | AccessError::ParentNotFound { .. } => 404,
            AccessError::AccessDenied { .. } | AccessError::ExamDenied { .. } => 403,
            AccessError::InvalidParent { .. } => 409,
            AccessError::InvalidRequest(_) => 400,
            AccessError::TransactionRequired
            | AccessError::PathResolution { .. }
            | AccessError::Graph(_)
            | AccessError::Serialization(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, AccessError>;
