//! Concierge API server binary.
//!
//! Usage:
//!   concierge-api --config config.toml
//!   concierge-api --port 8080
//!   concierge-api --port 8080 --bind 0.0.0.0
//!   concierge-api --workspace ./my-project
//!
//! # Environment Variables
//!
//! - `CONCIERGE_BIND_ADDR` - Server bind address (default: 127.0.0.1)
//! - `OPENAI_API_KEY` - API key for the OpenAI-compatible endpoint
//! - `RUST_LOG` - Log filter

use anyhow::Context;
use concierge_api::{serve, AppState};
use concierge_coordinator::CoordinatorConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,concierge_api=debug,concierge_coordinator=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut port: u16 = 8080;
    let mut config_path: Option<String> = None;
    let mut bind_addr: Option<String> = None;
    let mut workspace: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    port = args[i + 1]
                        .parse()
                        .with_context(|| format!("Invalid port number '{}'", args[i + 1]))?;
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    bind_addr = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--workspace" | "-w" => {
                if i + 1 < args.len() {
                    workspace = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Concierge API Server");
                println!();
                println!("Usage: concierge-api [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -p, --port <PORT>        Port to listen on (default: 8080)");
                println!(
                    "  -b, --bind <ADDR>        Bind address (default: 127.0.0.1, env: CONCIERGE_BIND_ADDR)"
                );
                println!("  -c, --config <FILE>      Path to config.toml file");
                println!("  -w, --workspace <DIR>    Project directory for file references and detection");
                println!("  -h, --help               Show this help message");
                println!();
                println!("Environment variables:");
                println!(
                    "  CONCIERGE_BIND_ADDR      Server bind address (overridden by --bind flag)"
                );
                println!("  OPENAI_API_KEY           API key for the language-model endpoint");
                return Ok(());
            }
            other => {
                tracing::warn!(argument = %other, "Ignoring unknown argument");
            }
        }
        i += 1;
    }

    // CLI flag > env var > default 127.0.0.1
    let host = bind_addr
        .or_else(|| std::env::var("CONCIERGE_BIND_ADDR").ok())
        .unwrap_or_else(|| "127.0.0.1".to_string());

    if host == "0.0.0.0" {
        tracing::warn!(
            "Server binding to 0.0.0.0 exposes the API to all network interfaces. \
             The API has no authentication; put it behind a firewall or proxy."
        );
    }

    let mut config = if let Some(path) = config_path {
        tracing::info!(path = %path, "Loading configuration");
        CoordinatorConfig::from_file(&path)?
    } else {
        tracing::info!("Using default configuration");
        CoordinatorConfig::default()
    };

    if let Some(dir) = workspace {
        config.workspace_root = Some(dir);
    }

    let state = AppState::new(config)?;

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid bind address '{}:{}'", host, port))?;
    serve(Arc::new(state), addr).await?;

    Ok(())
}
