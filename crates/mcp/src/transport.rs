//! Transport bindings: stdio, streamable HTTP with the MCP endpoint at `/mcp`,
//! or the legacy SSE pair (`GET /sse` plus `POST /message`). Both HTTP
//! flavours also answer `/health`.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use bitrix_mcp_core::config::{ServerConfig, Transport};
use rmcp::transport::sse_server::{SseServer, SseServerConfig};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpService,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{health, BitrixMcpServer};

pub const MCP_PATH: &str = "/mcp";
pub const SSE_PATH: &str = "/sse";
pub const SSE_POST_PATH: &str = "/message";

const SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);

/// Serves `server` on the configured transport until shutdown.
pub async fn serve(server: BitrixMcpServer, config: &ServerConfig) -> anyhow::Result<()> {
    match config.transport {
        Transport::Stdio => server.run_stdio().await,
        Transport::StreamableHttp => {
            let listener = bind(config).await?;
            let router = streamable_http_router(server, config);
            serve_router(listener, router, config, MCP_PATH, None).await
        }
        Transport::Sse => {
            let listener = bind(config).await?;
            let address = listener.local_addr().context("failed to read bound address")?;
            let (router, sessions) = sse_router(server, config, address);
            serve_router(listener, router, config, SSE_PATH, Some(sessions)).await
        }
    }
}

/// Health route plus the streamable HTTP service nested at [`MCP_PATH`].
pub fn streamable_http_router(server: BitrixMcpServer, config: &ServerConfig) -> Router {
    let service = StreamableHttpService::new(
        move || Ok(server.clone()),
        LocalSessionManager::default().into(),
        Default::default(),
    );
    health::router(config.name.clone(), config.transport.as_str()).nest_service(MCP_PATH, service)
}

/// Health route plus the SSE endpoints. Every stream opened on [`SSE_PATH`]
/// gets its own server session; cancelling the returned token closes them all.
pub fn sse_router(
    server: BitrixMcpServer,
    config: &ServerConfig,
    bind: SocketAddr,
) -> (Router, CancellationToken) {
    let (sse_server, sse_routes) = SseServer::new(SseServerConfig {
        bind,
        sse_path: SSE_PATH.to_owned(),
        post_path: SSE_POST_PATH.to_owned(),
        ct: CancellationToken::new(),
        sse_keep_alive: Some(SSE_KEEP_ALIVE),
    });
    let router = health::router(config.name.clone(), config.transport.as_str()).merge(sse_routes);
    let sessions = sse_server.with_service(move || server.clone());
    (router, sessions)
}

async fn bind(config: &ServerConfig) -> anyhow::Result<TcpListener> {
    let address = format!("{}:{}", config.host, config.port);
    TcpListener::bind(&address).await.with_context(|| format!("failed to bind {address}"))
}

async fn serve_router(
    listener: TcpListener,
    router: Router,
    config: &ServerConfig,
    endpoint: &'static str,
    sessions: Option<CancellationToken>,
) -> anyhow::Result<()> {
    let bind_address = listener
        .local_addr()
        .map(|address| address.to_string())
        .unwrap_or_else(|_| format!("{}:{}", config.host, config.port));
    info!(
        event_name = "system.mcp.http_start",
        transport = config.transport.as_str(),
        bind_address = %bind_address,
        endpoint,
        "MCP HTTP transport listening"
    );

    let grace = Duration::from_secs(config.graceful_shutdown_secs);
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        shutdown_signal().await;
        if let Some(sessions) = sessions {
            sessions.cancel();
        }
    });
    let mut drain = tokio::spawn(async move { server.await });

    tokio::select! {
        joined = &mut drain => {
            joined.context("HTTP transport task failed")??;
        }
        _ = async {
            shutdown_signal().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                event_name = "system.mcp.http_forced_stop",
                grace_secs = grace.as_secs(),
                "open connections did not drain before the grace period ended"
            );
            drain.abort();
        }
    }

    info!(event_name = "system.mcp.http_stop", "MCP HTTP transport stopped");
    Ok(())
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(event_name = "system.signal.error", error = %error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                warn!(event_name = "system.signal.error", error = %error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!(event_name = "system.server.stopping", "shutdown signal received");
}
