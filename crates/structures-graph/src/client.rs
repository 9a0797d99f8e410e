//! Neo4j connection management and shared graph client.

use async_trait::async_trait;
use neo4rs::{ConfigBuilder, Graph, Query};

use structures_core::{Neo4jSettings, NodeId};

use crate::session::Neo4jSession;
use crate::store::{GraphSession, GraphStore};

/// Errors from graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Node not found: {label} with id {id}")]
    NotFound { label: String, id: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Write attempted outside of a transaction")]
    TransactionRequired,

    #[error("A transaction is already open on this session")]
    TransactionAlreadyOpen,

    #[error("No open transaction to finish")]
    NoOpenTransaction,

    #[error("Graph integrity violation: {0}")]
    Integrity(String),
}

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub fetch_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self::from(&Neo4jSettings::default())
    }
}

impl From<&Neo4jSettings> for GraphConfig {
    fn from(settings: &Neo4jSettings) -> Self {
        Self {
            uri: settings.uri.clone(),
            user: settings.user.clone(),
            password: settings.password.clone(),
            max_connections: settings.max_connections,
            fetch_size: settings.fetch_size,
        }
    }
}

/// Thread-safe Neo4j graph client with connection pooling.
///
/// Clone is cheap (inner Arc). Each request gets its own [`Neo4jSession`].
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connect to Neo4j with the given configuration.
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        tracing::info!(uri = %config.uri, "Connected to Neo4j");
        Ok(Self { graph })
    }

    /// Execute a query outside any session (schema and test setup).
    pub async fn run(&self, query: Query) -> Result<(), GraphError> {
        self.graph.run(query).await?;
        Ok(())
    }

    /// Open a concrete Neo4j session.
    pub fn neo4j_session(&self) -> Neo4jSession {
        Neo4jSession::new(self.graph.clone())
    }
}

#[async_trait]
impl GraphStore for GraphClient {
    async fn session(&self) -> Result<Box<dyn GraphSession>, GraphError> {
        Ok(Box::new(self.neo4j_session()))
    }

    async fn bootstrap(&self, root: &NodeId) -> Result<(), GraphError> {
        self.ensure_schema().await?;
        self.ensure_root(root).await
    }
}
