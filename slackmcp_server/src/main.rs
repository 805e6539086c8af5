use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slackmcp_core::auth::McpTokenStore;
use slackmcp_core::mcp_server::{JsonRpcHandler, McpServer};
use slackmcp_core::transport::{self, StdioTransport};
use slackmcp_core::{config, tools, Credentials, Provider, SlackClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    Stdio,
    Sse,
    Http,
}

impl Transport {
    fn as_str(&self) -> &'static str {
        match self {
            Transport::Stdio => "stdio",
            Transport::Sse => "sse",
            Transport::Http => "http",
        }
    }
}

#[derive(Parser)]
#[command(name = "slackmcp-server")]
#[command(about = "MCP server exposing a Slack workspace as tools and resources")]
#[command(version)]
struct Cli {
    /// Transport type
    #[arg(short = 't', long, value_enum, default_value = "stdio")]
    transport: Transport,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_level = {
        let configured = config::env(config::ENV_LOG_LEVEL);
        if configured.is_empty() {
            "info".to_string()
        } else {
            configured
        }
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Configuration errors are fatal before any transport starts.
    let enabled = tools::enabled_tools_from_env();
    if let Err(e) = tools::validate_enabled_tools(&enabled) {
        error!(error = %e, "invalid SLACK_MCP_ENABLED_TOOLS");
        return Err(e.into());
    }
    let creds = match Credentials::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Slack credentials missing or invalid");
            return Err(e.into());
        }
    };

    let client = SlackClient::new(creds)?;
    let provider = Provider::new(client, cli.transport.as_str());

    // Backfill users and channels in the background; requests are served
    // while sync is in flight, with name lookups gated on readiness.
    {
        let provider = provider.clone();
        tokio::spawn(async move {
            info!("booting workspace caches");
            provider.boot().await;
            info!("workspace caches booted");
        });
    }

    let token_store = Arc::new(McpTokenStore::new());
    McpTokenStore::spawn_cleanup(token_store.clone());

    let server = McpServer::new(provider, token_store);
    let handler = Arc::new(JsonRpcHandler::new(server));

    info!(transport = cli.transport.as_str(), "slackmcp-server ready");
    match cli.transport {
        Transport::Stdio => StdioTransport::new(handler).run().await?,
        Transport::Sse => transport::run_sse(handler).await?,
        Transport::Http => transport::run_http(handler).await?,
    }

    Ok(())
}
