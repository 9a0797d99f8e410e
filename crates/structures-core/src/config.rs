//! Configuration management for the structures services.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`STRUCTURES__` prefix, `__` separator)
//! 2. Config file (`structures.toml` by default)
//! 3. Defaults

use serde::Deserialize;

use crate::error::StructuresError;
use crate::types::NodeId;

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StructuresConfig {
    /// Id of the single root organization unit of this deployment.
    #[serde(default = "default_root")]
    pub root_organization_unit: NodeId,

    /// Upper bound on hops when walking towards the root.
    #[serde(default = "default_max_hops")]
    pub max_path_hops: u32,

    /// Page size used when a find request does not specify one.
    #[serde(default = "default_page_limit")]
    pub default_page_limit: u32,

    #[serde(default)]
    pub neo4j: Neo4jSettings,
}

/// Neo4j connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Neo4jSettings {
    #[serde(default = "default_uri")]
    pub uri: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

fn default_root() -> NodeId {
    NodeId::from("33b8b452-00cf-42f7-8f4b-ce867c68b8c1")
}

fn default_max_hops() -> u32 {
    10
}

fn default_page_limit() -> u32 {
    20
}

fn default_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_password() -> String {
    "structures-dev".to_string()
}

fn default_max_connections() -> u32 {
    16
}

fn default_fetch_size() -> usize {
    256
}

impl Default for Neo4jSettings {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            user: default_user(),
            password: default_password(),
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
        }
    }
}

impl Default for StructuresConfig {
    fn default() -> Self {
        Self {
            root_organization_unit: default_root(),
            max_path_hops: default_max_hops(),
            default_page_limit: default_page_limit(),
            neo4j: Neo4jSettings::default(),
        }
    }
}

impl StructuresConfig {
    /// Load configuration from `{file_prefix}.toml` (optional) and the
    /// environment.
    pub fn load(file_prefix: &str) -> Result<Self, StructuresError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("STRUCTURES")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: StructuresConfig = cfg.try_deserialize()?;
        if loaded.max_path_hops == 0 {
            return Err(StructuresError::Config(
                "max_path_hops must be at least 1".to_string(),
            ));
        }

        tracing::debug!(
            root = %loaded.root_organization_unit,
            max_path_hops = loaded.max_path_hops,
            "Configuration loaded"
        );
        Ok(loaded)
    }
}
