//! Bitrix24 MCP (Model Context Protocol) Server
//!
//! Exposes the Bitrix24 REST API as a fixed catalog of MCP tools covering
//! CRM leads, deals, contacts and companies, tasks, calendar events and
//! workgroup projects.
//!
//! ## Architecture
//!
//! - `BitrixMcpServer`: rmcp `ServerHandler`, lists the catalog and routes calls
//! - `Toolbox`: validates arguments and dispatches to the per-domain handlers
//! - `handlers/`: translation between tool arguments and remote method calls
//! - `transport`: stdio, streamable HTTP and legacy SSE bindings with a `/health` route
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bitrix_mcp::{BitrixMcpServer, Toolbox};
//! use bitrix_mcp_client::HttpBitrixClient;
//! use bitrix_mcp_core::{AppConfig, LoadOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load(LoadOptions::default())?;
//!     let client = HttpBitrixClient::from_config(&config.bitrix)?;
//!     let server = BitrixMcpServer::new(Toolbox::new(Arc::new(client)), &config.server);
//!     server.run_stdio().await
//! }
//! ```

mod envelope;
mod handlers;
mod health;
mod server;
pub mod testing;
mod toolbox;
mod transport;

pub use server::BitrixMcpServer;
pub use toolbox::Toolbox;
pub use transport::{serve, shutdown_signal};

use bitrix_mcp_client::RemoteError;
use bitrix_mcp_core::ArgumentError;
use thiserror::Error;

/// Failure of one tool invocation.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("unknown tool `{0}`")]
    UnknownTool(String),

    #[error(transparent)]
    Argument(#[from] ArgumentError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("{0}")]
    NotFound(String),
}

/// Category reported to callers as `error_type`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Remote,
    Transport,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Remote => "remote",
            Self::Transport => "transport",
        }
    }
}

impl ToolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolError::UnknownTool(_) | ToolError::Argument(_) => ErrorKind::Validation,
            ToolError::Remote(err) if err.is_transport() => ErrorKind::Transport,
            ToolError::Remote(_) | ToolError::NotFound(_) => ErrorKind::Remote,
        }
    }
}

/// Result type for tool invocations
pub type ToolResult<T> = Result<T, ToolError>;

#[cfg(test)]
mod tests {
    use bitrix_mcp_client::RemoteError;
    use bitrix_mcp_core::ArgumentError;

    use super::{ErrorKind, ToolError};

    #[test]
    fn every_failure_maps_to_one_kind() {
        let cases = [
            (ToolError::UnknownTool("nope".to_owned()), ErrorKind::Validation),
            (ToolError::Argument(ArgumentError::Missing("fields".to_owned())), ErrorKind::Validation),
            (
                ToolError::Remote(RemoteError::Api {
                    status: 401,
                    code: "invalid_token".to_owned(),
                    description: String::new(),
                }),
                ErrorKind::Remote,
            ),
            (ToolError::Remote(RemoteError::Decode("eof".to_owned())), ErrorKind::Remote),
            (ToolError::Remote(RemoteError::Transport("refused".to_owned())), ErrorKind::Transport),
            (ToolError::NotFound("Lead with ID 1 not found".to_owned()), ErrorKind::Remote),
        ];

        for (error, kind) in cases {
            assert_eq!(error.kind(), kind, "{error}");
        }
    }
}
