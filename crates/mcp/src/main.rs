//! Bitrix24 MCP Server Binary
//!
//! ## Usage
//!
//! ```bash
//! # stdio transport with an inbound webhook
//! BITRIX24_WEBHOOK_URL=https://example.bitrix24.com/rest/1/token/ bitrix-mcp
//!
//! # OAuth credentials instead of a webhook
//! BITRIX24_ACCESS_TOKEN=... BITRIX24_PORTAL_URL=https://example.bitrix24.com bitrix-mcp
//!
//! # HTTP transport; the MCP endpoint is /mcp, liveness is /health
//! bitrix-mcp --transport streamable-http --host 0.0.0.0 --port 8000
//! ```
//!
//! Logs go to stderr so the stdio transport owns stdout.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use bitrix_mcp::{serve, BitrixMcpServer, Toolbox};
use bitrix_mcp_client::HttpBitrixClient;
use bitrix_mcp_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat, Transport};
use clap::Parser;
use tracing::{error, info, Level};

#[derive(Debug, Parser)]
#[command(name = "bitrix-mcp", version, about = "Bitrix24 MCP server")]
struct Args {
    /// stdio, streamable-http or sse
    #[arg(long)]
    transport: Option<Transport>,
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    log_level: Option<String>,
    /// Config file; must exist when given.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_logging(config: &AppConfig) {
    let level = match config.logging.level.to_ascii_lowercase().as_str() {
        "warning" => Level::WARN,
        other => other.parse::<Level>().unwrap_or(Level::INFO),
    };

    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .with_writer(std::io::stderr);
    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let require_file = args.config.is_some();
    let options = LoadOptions {
        config_path: args.config,
        require_file,
        overrides: ConfigOverrides {
            transport: args.transport,
            host: args.host,
            port: args.port,
            log_level: args.log_level,
            ..ConfigOverrides::default()
        },
    };

    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("bitrix-mcp: configuration error: {error}");
            return ExitCode::from(2);
        }
    };
    init_logging(&config);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(event_name = "system.server.failed", error = %format!("{error:#}"), "server terminated");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let client = HttpBitrixClient::from_config(&config.bitrix)?;
    let server = BitrixMcpServer::new(Toolbox::new(Arc::new(client)), &config.server);

    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        server = %config.server.name,
        version = %config.server.version,
        transport = config.server.transport.as_str(),
        auth_mode = config.bitrix.auth().map(|auth| auth.mode()).unwrap_or("unconfigured"),
        "bitrix-mcp started"
    );

    serve(server, &config.server).await?;

    info!(event_name = "system.server.stopped", correlation_id = "shutdown", "bitrix-mcp stopped");
    Ok(())
}
