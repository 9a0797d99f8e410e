//! CLI entry point for the structures access engine.
//!
//! `handle` reads a JSON request (or a batch of them) from stdin and writes
//! the JSON responses to stdout; logs go to stderr.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

use structures_access::{Caller, Dispatcher, Request, Response};
use structures_core::{AccessKind, NodeId, StructuresConfig, UserRole};
use structures_graph::{GraphClient, GraphConfig, GraphStore, MemoryGraph};

#[derive(Parser)]
#[command(name = "structures-access")]
#[command(about = "Access control and path resolution for the organization hierarchy")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file prefix (default: structures).
    #[arg(short, long, default_value = "structures", global = true)]
    config: String,

    /// Use an in-process graph holding only the root instead of Neo4j.
    #[arg(long, global = true)]
    memory: bool,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json_logs: bool,

    /// Caller user id; anonymous when absent.
    #[arg(long, global = true)]
    user_id: Option<String>,

    /// Caller role (USER or ADMIN).
    #[arg(long, global = true, default_value = "USER")]
    user_role: String,
}

#[derive(Subcommand)]
enum Command {
    /// Create id constraints and the root organization unit.
    Init,
    /// Dispatch a JSON request (or a batch) read from stdin.
    Handle,
    /// Decide whether the caller may access a node.
    CheckAccess {
        /// Target node ID.
        #[arg(long)]
        target: String,
        /// Access kind: read or write.
        #[arg(long, default_value = "read")]
        kind: String,
    },
    /// Print the materialized path of a node.
    Path {
        /// Node ID.
        #[arg(long)]
        node: String,
    },
}

/// One batch entry; entries without a caller use the command-line identity.
#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    caller: Option<Caller>,
    request: Request,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Input {
    Batch(Vec<Envelope>),
    Single(Request),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = StructuresConfig::load(&cli.config)?;
    let store = open_store(&cli, &config).await?;

    if let Command::Init = cli.command {
        store.bootstrap(&config.root_organization_unit).await?;
        println!("{}", serde_json::json!({ "root": config.root_organization_unit }));
        return Ok(());
    }

    let dispatcher = Dispatcher::from_config(store, &config);
    let caller = Caller {
        user_id: cli.user_id.clone().map(NodeId::from),
        role: cli.user_role.parse::<UserRole>()?,
    };

    match cli.command {
        Command::Init => {}
        Command::Handle => {
            let input = std::io::read_to_string(std::io::stdin())?;
            match serde_json::from_str::<Input>(&input)? {
                Input::Single(request) => {
                    let response = dispatcher.handle(&caller, request).await;
                    println!("{}", serde_json::to_string(&response)?);
                }
                Input::Batch(entries) => {
                    let mut responses: Vec<Response> = Vec::with_capacity(entries.len());
                    for entry in entries {
                        let who = entry.caller.as_ref().unwrap_or(&caller);
                        responses.push(dispatcher.handle(who, entry.request).await);
                    }
                    println!("{}", serde_json::to_string(&responses)?);
                }
            }
        }
        Command::CheckAccess { ref target, ref kind } => {
            let request = Request::CheckAccess {
                target: NodeId::from(target.as_str()),
                kind: kind.parse::<AccessKind>()?,
            };
            let response = dispatcher.handle(&caller, request).await;
            println!("{}", serde_json::to_string(&response)?);
        }
        Command::Path { ref node } => {
            let request = Request::ResolvePath {
                node: NodeId::from(node.as_str()),
            };
            let response = dispatcher.handle(&caller, request).await;
            println!("{}", serde_json::to_string(&response)?);
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    }
}

async fn open_store(cli: &Cli, config: &StructuresConfig) -> anyhow::Result<Arc<dyn GraphStore>> {
    if cli.memory {
        let graph = MemoryGraph::with_root(&config.root_organization_unit).await;
        return Ok(Arc::new(graph));
    }

    let graph = GraphClient::connect(&GraphConfig::from(&config.neo4j)).await?;
    Ok(Arc::new(graph))
}
