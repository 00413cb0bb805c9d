//! toolgate - Main entry point.
//!
//! Reads one JSON payload per stdin line, runs it through the pipeline,
//! and prints the outcome. Useful for poking at adapters and routing
//! without a front door in place.

use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use toolgate::audit::{MemorySink, ViewTelemetry, build_view};
use toolgate::config::Config;
use toolgate::embedding::HashEmbedder;
use toolgate::gateway::{Gateway, GatewayDeps, GatewayResponse};
use toolgate::sandbox::InMemoryDriver;
use toolgate::secrets::InMemoryCredentialStore;
use toolgate::types::{ProtocolTag, ToolDefinition};

#[derive(Parser, Debug)]
#[command(name = "toolgate")]
#[command(about = "Gateway between agent protocols and sandboxed tools")]
#[command(version)]
struct Args {
    /// Force a protocol tag instead of auto-detecting (mcp, a2a, ucp,
    /// acp, v1, v2)
    #[arg(short, long)]
    protocol: Option<String>,

    /// Print a compact audit view for every pipeline event
    #[arg(long)]
    show_audit: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("toolgate=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        dimensions = config.embeddings.dimensions,
        model = %config.embeddings.model,
        "Configuration loaded"
    );

    let forced_tag: Option<ProtocolTag> = match &args.protocol {
        Some(tag) => Some(tag.parse().map_err(toolgate::Error::from)?),
        None => None,
    };

    let embedder = Arc::new(HashEmbedder::new(
        &config.embeddings.model,
        config.embeddings.dimensions,
    ));
    let credentials = Arc::new(InMemoryCredentialStore::new());
    let sink = Arc::new(MemorySink::new());

    let gateway = Arc::new(Gateway::new(
        config,
        GatewayDeps {
            embedder,
            driver: Arc::new(InMemoryDriver::new()),
            credentials,
            sink,
        },
    ));

    // Demo catalog; a deployment would sync this from tool registries.
    for tool in demo_catalog() {
        gateway.register_tool(tool).await;
    }
    tracing::info!(tools = gateway.catalog().await.len(), "Catalog registered");

    let flush = gateway.audit().start_periodic_flush();
    let maintenance = gateway.runtime().start_maintenance();

    let telemetry = Arc::new(ViewTelemetry::new());
    if args.show_audit {
        let telemetry = Arc::clone(&telemetry);
        gateway
            .audit()
            .subscribe(
                "stderr-views",
                Box::new(move |batch| {
                    for entry in batch {
                        let view = build_view(entry, &[]);
                        telemetry.record(&view);
                        eprintln!(
                            "[audit] {} | {} | {} | impact={:?}",
                            view.title, view.summary.what, view.summary.when, view.summary.impact
                        );
                    }
                    Ok(())
                }),
            )
            .await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let raw = line.as_bytes();

        let tag = match forced_tag.or_else(|| gateway.detect(raw)) {
            Some(tag) => tag,
            None => {
                eprintln!("no adapter recognized the payload");
                continue;
            }
        };

        match gateway.process(raw, tag, None).await {
            Ok(GatewayResponse::Executed {
                decision, result, ..
            }) => {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": if result.success { "ok" } else { "failed" },
                        "tool": decision.tool.id,
                        "confidence": decision.confidence,
                        "output": result.output,
                        "error": result.error,
                        "cold_start_ms": result.metrics.cold_start_ms,
                        "exec_ms": result.metrics.exec_ms,
                    })
                );
            }
            Ok(GatewayResponse::PendingApproval {
                decision, reason, ..
            }) => {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": "pending_approval",
                        "tool": decision.tool.id,
                        "confidence": decision.confidence,
                        "reason": reason,
                    })
                );
            }
            Err(error) => {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": "error",
                        "code": error.code(),
                        "message": error.to_string(),
                        "suggestion": error.suggestion(),
                    })
                );
            }
        }
    }

    flush.stop().await;
    maintenance.stop().await;
    if args.show_audit {
        tracing::info!(
            views = telemetry.generated(),
            avg_read_sec = telemetry.average_read_time_sec(),
            over_target = telemetry.over_target(),
            "View telemetry"
        );
    }
    tracing::info!("Shutting down");
    Ok(())
}

fn demo_catalog() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new("web_search", "search the web for pages and documentation")
            .with_cost(2.0)
            .with_latency_ms(300),
        ToolDefinition::new("send_email", "send an email message to a recipient")
            .with_cost(1.0)
            .with_latency_ms(150),
        ToolDefinition::new("run_code", "generate and run code snippets in a sandbox")
            .with_cost(10.0)
            .with_latency_ms(2000),
    ]
}
