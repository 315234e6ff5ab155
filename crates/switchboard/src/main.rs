//! Switchboard - multi-server MCP host with an HTTP/SSE/WebSocket bridge.
//!
//! Main entry point for the Switchboard CLI.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use switchboard_host::{HostConfig, McpHost};
use switchboard_mcp::StdioConnector;
use switchboard_server::{BridgeConfig, Server};

/// Switchboard - multi-server MCP host
#[derive(Parser)]
#[command(name = "switchboard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the host and its HTTP bridge
    Serve(ServeArgs),

    /// Parse the configuration and print the effective server list
    Check(CheckArgs),
}

#[derive(clap::Args)]
struct ServeArgs {
    /// Path to the JSON configuration file
    #[arg(short, long, env = "SWITCHBOARD_CONFIG", default_value = "switchboard.json")]
    config: PathBuf,

    /// Port to listen on (overrides SWITCHBOARD_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind to (overrides the port flag)
    #[arg(short, long)]
    bind: Option<SocketAddr>,
}

#[derive(clap::Args)]
struct CheckArgs {
    /// Path to the JSON configuration file
    #[arg(short, long, env = "SWITCHBOARD_CONFIG", default_value = "switchboard.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Check(args) => check(args),
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let mut host_config = HostConfig::load_or_default(&args.config);
    host_config.dedupe_servers();

    let mut bridge_config = BridgeConfig::from_env();
    if let Some(port) = args.port {
        bridge_config.bind_address.set_port(port);
    }
    if let Some(bind) = args.bind {
        bridge_config.bind_address = bind;
    }

    tracing::info!(
        config = %args.config.display(),
        servers = host_config.servers.len(),
        addr = %bridge_config.bind_address,
        "starting switchboard"
    );

    let host = McpHost::new(host_config, Arc::new(StdioConnector::new()));
    host.start().await;

    let server = Server::new(host.clone(), bridge_config);
    let result = server.run().await.context("bridge failed");

    // The bridge tears the host down on shutdown; a second stop is a no-op.
    host.stop().await;
    result
}

fn check(args: CheckArgs) -> Result<()> {
    let mut config = HostConfig::load_or_default(&args.config);
    config.dedupe_servers();

    println!(
        "{} v{} - {} server(s)",
        config.host_info.name,
        config.host_info.version,
        config.servers.len()
    );
    for server in &config.servers {
        println!("  {:<24} {}", server.id, server.transport.kind());
    }
    Ok(())
}
