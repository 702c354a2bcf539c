//! Reads newline-delimited JSON messages from stdin and dispatches them through
//! an engine backed by the dry-run agent. Forwarded messages are printed to
//! stdout, one JSON document per line.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use mindconnect_bridge::adapters::dry_run::DryRunProvider;
use mindconnect_bridge::adapters::flow::{FlowStore, FlowStoreConfig, HttpFlowStore, MemoryFlowStore};
use mindconnect_bridge::config::{NodeConfig, NodeIdentity};
use mindconnect_bridge::kernel::{DispatchEngine, spawn_engine};
use mindconnect_bridge::primitives::{ActionKind, Message};
use mindconnect_bridge::telemetry::{ChannelReporter, init_tracing};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "stdin-bridge", version, about)]
struct Args {
    /// Node configuration document (JSON).
    #[arg(short, long)]
    config: PathBuf,

    /// Id of the bridge node inside its flow.
    #[arg(long, default_value = "node-1")]
    node_id: String,

    /// Id of the flow that owns the node.
    #[arg(long, default_value = "flow-1")]
    flow_id: String,

    /// Base URL of the host's admin API; reconfiguration stays in memory when unset.
    #[arg(long)]
    admin_url: Option<String>,

    /// Tracing directive used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log)?;

    let raw = tokio::fs::read_to_string(&args.config)
        .await
        .with_context(|| format!("reading {}", args.config.display()))?;
    let document: Value = serde_json::from_str(&raw).context("parsing node configuration")?;
    let node_config = NodeConfig::from_value(document.clone())?;

    let flow_store: Arc<dyn FlowStore> = match &args.admin_url {
        Some(url) => Arc::new(HttpFlowStore::new(FlowStoreConfig::new(url)?)),
        None => {
            let mut node = document;
            if let Some(fields) = node.as_object_mut() {
                fields.insert("id".into(), json!(args.node_id));
                fields.insert("type".into(), json!("mindconnect"));
            }
            Arc::new(MemoryFlowStore::new().with_flow(&args.flow_id, json!({ "nodes": [node] })))
        }
    };

    let (reporter, mut output) = ChannelReporter::new();
    let mut engine = DispatchEngine::builder(
        NodeIdentity::new(&args.node_id, &args.flow_id),
        Arc::new(DryRunProvider),
        reporter,
        flow_store,
    )
    .build()?;
    if let Err(err) = engine.start_from_config(&node_config) {
        warn!(error = %err, "engine started without an agent; send a reconfiguration to recover");
    }

    let printer = tokio::spawn(async move {
        while let Some(message) = output.recv().await {
            match message.to_value() {
                Ok(value) => println!("{value}"),
                Err(err) => warn!(error = %err, "failed to encode forwarded message"),
            }
        }
    });

    let handle = spawn_engine(engine);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut accepted = 0_usize;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let message = match serde_json::from_str::<Value>(line).map(Message::from_value) {
            Ok(Ok(message)) => message,
            Ok(Err(err)) => {
                warn!(error = %err, "skipping line that is not a message object");
                continue;
            }
            Err(err) => {
                warn!(error = %err, "skipping line that is not JSON");
                continue;
            }
        };
        handle.send(message).await?;
        accepted += 1;
    }

    info!(accepted, "stdin closed; draining");
    handle
        .send(Message::action(ActionKind::Await, Utc::now()))
        .await?;
    let engine = handle.close().await?;
    info!(in_flight = engine.in_flight(), "engine stopped");
    drop(engine);
    printer.await?;
    Ok(())
}
