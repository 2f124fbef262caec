use std::sync::Arc;
use std::time::Instant;

use bitrix_mcp_client::BitrixApi;
use bitrix_mcp_core::{Catalog, ToolArgs, ToolDescriptor};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{handlers, ToolError, ToolResult};

/// Routes tool invocations to their handlers over an explicitly passed client.
#[derive(Clone)]
pub struct Toolbox {
    api: Arc<dyn BitrixApi>,
    catalog: &'static Catalog,
}

impl std::fmt::Debug for Toolbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolbox").field("tools", &self.catalog.len()).finish_non_exhaustive()
    }
}

impl Toolbox {
    pub fn new(api: Arc<dyn BitrixApi>) -> Self {
        Self { api, catalog: Catalog::standard() }
    }

    pub fn catalog(&self) -> &'static Catalog {
        self.catalog
    }

    pub fn descriptor(&self, name: &str) -> Option<&'static ToolDescriptor> {
        self.catalog.get(name)
    }

    /// Validates `arguments` against the tool's parameters, then performs the
    /// remote call. Validation failures never reach the client.
    pub async fn invoke(&self, name: &str, arguments: Option<&Map<String, Value>>) -> ToolResult<Value> {
        let tool = self.descriptor(name).ok_or_else(|| ToolError::UnknownTool(name.to_owned()))?;
        let args = ToolArgs::validate(tool, arguments)?;

        let started = Instant::now();
        let outcome = handlers::dispatch(self.api.as_ref(), tool.operation, &args).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(_) => debug!(tool = name, elapsed_ms, "tool completed"),
            Err(err) => warn!(
                tool = name,
                elapsed_ms,
                error_type = err.kind().as_str(),
                error = %err,
                "tool failed"
            ),
        }
        outcome
    }
}
