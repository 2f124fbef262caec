//! MCP Server Implementation
//!
//! Implements the Model Context Protocol handler for the Bitrix24 tool catalog.

use std::sync::Arc;

use bitrix_mcp_core::config::ServerConfig;
use bitrix_mcp_core::ToolDescriptor;
use rmcp::{
    model::{
        CallToolRequestParam, CallToolResult, Content, ErrorData, Implementation, JsonObject,
        ListToolsResult, PaginatedRequestParam, ServerCapabilities, ServerInfo, Tool,
        ToolAnnotations,
    },
    service::RequestContext,
    RoleServer, ServerHandler, ServiceExt,
};
use serde_json::Value;
use tracing::{debug, info, Instrument};
use uuid::Uuid;

use crate::envelope::{failure, reports_success};
use crate::{ToolError, Toolbox};

const INSTRUCTIONS: &str = "Tools for the Bitrix24 REST API: CRM leads, deals, contacts and \
companies, tasks, calendar events and workgroup projects. Filters, field maps and ordering \
are JSON objects; list tools accept `limit` and `start` for paging.";

/// MCP server over one Bitrix24 portal.
#[derive(Debug, Clone)]
pub struct BitrixMcpServer {
    toolbox: Toolbox,
    tools: Arc<Vec<Tool>>,
    name: String,
    version: String,
}

impl BitrixMcpServer {
    pub fn new(toolbox: Toolbox, config: &ServerConfig) -> Self {
        let tools = toolbox.catalog().tools().iter().map(to_mcp_tool).collect();
        info!(
            event_name = "system.mcp.catalog_loaded",
            server = %config.name,
            tool_count = toolbox.catalog().len(),
            "tool catalog loaded"
        );
        Self {
            toolbox,
            tools: Arc::new(tools),
            name: config.name.clone(),
            version: config.version.clone(),
        }
    }

    /// Tools as advertised to clients.
    pub fn tools(&self) -> Vec<Tool> {
        self.tools.as_ref().clone()
    }

    /// Runs one tool call. Unknown tools are a protocol error; every other
    /// failure is returned as an error envelope with `is_error` set.
    pub async fn call(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, ErrorData> {
        let correlation_id = Uuid::new_v4();
        let span = tracing::info_span!("tool_call", tool = name, correlation_id = %correlation_id);

        async move {
            debug!("tool call received");
            match self.toolbox.invoke(name, arguments.as_ref()).await {
                Ok(body) => {
                    let succeeded = reports_success(&body);
                    Ok(render(&body, !succeeded))
                }
                Err(ToolError::UnknownTool(name)) => {
                    Err(ErrorData::invalid_params(format!("unknown tool `{name}`"), None))
                }
                Err(error) => Ok(render(&failure(&error), true)),
            }
        }
        .instrument(span)
        .await
    }

    /// Run the server with stdio transport
    pub async fn run_stdio(self) -> anyhow::Result<()> {
        info!(event_name = "system.mcp.stdio_start", "starting MCP server with stdio transport");

        let service = self.serve(rmcp::transport::stdio()).await?;
        let cancel = service.cancellation_token();
        tokio::spawn(async move {
            crate::shutdown_signal().await;
            cancel.cancel();
        });

        let reason = service.waiting().await?;
        info!(event_name = "system.mcp.stdio_stop", reason = ?reason, "MCP server shutdown complete");
        Ok(())
    }
}

fn render(body: &Value, is_error: bool) -> CallToolResult {
    let text = serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string());
    let content = vec![Content::text(text)];
    if is_error {
        CallToolResult::error(content)
    } else {
        CallToolResult::success(content)
    }
}

fn to_mcp_tool(descriptor: &ToolDescriptor) -> Tool {
    let operation = descriptor.operation;
    Tool::new(descriptor.name.clone(), descriptor.description(), Arc::new(descriptor.input_schema()))
        .annotate(ToolAnnotations {
            title: Some(descriptor.title.clone()),
            read_only_hint: Some(operation.is_read_only()),
            destructive_hint: Some(operation.is_destructive()),
            idempotent_hint: Some(operation.is_idempotent()),
            open_world_hint: Some(true),
        })
}

// ============================================================================
// Protocol handler
// ============================================================================

impl ServerHandler for BitrixMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: self.name.clone(),
                version: self.version.clone(),
                ..Default::default()
            },
            instructions: Some(INSTRUCTIONS.to_owned()),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(self.tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        tokio::select! {
            result = self.call(&request.name, request.arguments) => result,
            _ = context.ct.cancelled() => {
                debug!(tool = %request.name, "tool call cancelled by client");
                Err(ErrorData::internal_error("request cancelled", None))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bitrix_mcp_client::{ListPage, RemoteError};
    use bitrix_mcp_core::{AppConfig, Catalog, ParamKind, ToolDescriptor};
    use rmcp::model::{CallToolResult, RawContent};
    use serde_json::{json, Map, Value};

    use super::BitrixMcpServer;
    use crate::testing::RecordingBitrix;
    use crate::Toolbox;

    fn server(remote: &Arc<RecordingBitrix>) -> BitrixMcpServer {
        BitrixMcpServer::new(Toolbox::new(remote.clone()), &AppConfig::default().server)
    }

    fn args(value: Value) -> Option<Map<String, Value>> {
        value.as_object().cloned()
    }

    fn body(result: &CallToolResult) -> Value {
        let text = result
            .content
            .iter()
            .find_map(|content| match &content.raw {
                RawContent::Text(text) => Some(text.text.clone()),
                _ => None,
            })
            .unwrap_or_default();
        serde_json::from_str(&text).unwrap_or(Value::Null)
    }

    #[test]
    fn advertises_the_whole_catalog_with_hints() {
        let remote = Arc::new(RecordingBitrix::new());
        let tools = server(&remote).tools();
        assert_eq!(tools.len(), 50);

        let get_leads = tools.iter().find(|tool| tool.name == "get_leads").expect("get_leads listed");
        let hints = get_leads.annotations.as_ref().expect("annotations");
        assert_eq!(hints.read_only_hint, Some(true));
        assert!(get_leads
            .description
            .as_deref()
            .is_some_and(|text| text.contains("Optional attributes")));

        let delete = tools.iter().find(|tool| tool.name == "delete_calendar_event").expect("listed");
        let hints = delete.annotations.as_ref().expect("annotations");
        assert_eq!(hints.destructive_hint, Some(true));
    }

    #[tokio::test]
    async fn list_call_issues_one_remote_listing() {
        let remote = Arc::new(RecordingBitrix::new());
        remote.respond_page(
            "crm.lead.list",
            ListPage { items: vec![json!({"ID": "1", "TITLE": "A"})], total: Some(1), next: None },
        );

        let result = tokio_test::assert_ok!(
            server(&remote)
                .call(
                    "get_leads",
                    args(json!({"filter_params": "{\"STATUS_ID\":\"NEW\"}", "select_fields": "ID,TITLE", "limit": 10})),
                )
                .await
        );

        assert_ne!(result.is_error, Some(true));
        let body = body(&result);
        assert_eq!(body["success"], true);
        assert_eq!(body["count"], 1);
        assert_eq!(body["leads"][0]["TITLE"], "A");

        let calls = remote.calls_to("crm.lead.list");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].params.get("filter"), Some(&json!({"STATUS_ID": "NEW"})));
        assert_eq!(calls[0].params.get("select"), Some(&json!(["ID", "TITLE"])));
        assert_eq!(calls[0].list.map(|request| request.limit), Some(10));
    }

    #[tokio::test]
    async fn create_without_required_title_never_reaches_remote() {
        let remote = Arc::new(RecordingBitrix::new());
        let result = server(&remote)
            .call("create_task", args(json!({"fields": "{\"DESCRIPTION\":\"x\"}"})))
            .await
            .expect("tool call");

        assert_eq!(result.is_error, Some(true));
        let body = body(&result);
        assert_eq!(body["success"], false);
        assert_eq!(body["error_type"], "validation");
        assert!(body["error"].as_str().is_some_and(|message| message.contains("TITLE")));
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn task_action_is_a_single_remote_call() {
        let remote = Arc::new(RecordingBitrix::new());
        remote.respond("tasks.task.complete", json!({"task": true}));

        let result =
            server(&remote).call("complete_task", args(json!({"task_id": "42"}))).await.expect("call");

        let body = body(&result);
        assert_eq!(body, json!({"success": true, "task_id": "42", "message": "Task completed successfully"}));
        let calls = remote.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, "tasks.task.complete");
        assert_eq!(calls[0].params.get("taskId"), Some(&json!("42")));
    }

    /// Smallest argument set the tool accepts.
    fn minimal_arguments(tool: &ToolDescriptor) -> Map<String, Value> {
        tool.params
            .iter()
            .filter(|spec| spec.required)
            .map(|spec| {
                let value = match spec.kind {
                    ParamKind::Id => json!("1"),
                    ParamKind::Text | ParamKind::FieldList => json!("ID"),
                    ParamKind::Integer { min } => json!(min),
                    ParamKind::Boolean => json!(true),
                    ParamKind::JsonObject => json!({"TITLE": "Sample", "NAME": "Sample"}),
                    ParamKind::Date => json!("2024-01-01"),
                    ParamKind::Choice(choices) => json!(choices[0]),
                };
                (spec.name.clone(), value)
            })
            .collect()
    }

    #[tokio::test]
    async fn every_tool_succeeds_with_minimal_arguments_in_one_remote_call() {
        for tool in Catalog::standard().tools() {
            let remote = Arc::new(RecordingBitrix::new());
            remote.respond("tasks.task.get", json!({"task": {"id": "1", "TITLE": "Sample"}}));
            remote.respond("calendar.event.get", json!([]));
            remote.respond("calendar.event.get.nearest", json!([]));

            let result = server(&remote)
                .call(&tool.name, Some(minimal_arguments(tool)))
                .await
                .unwrap_or_else(|error| panic!("{} was rejected: {error:?}", tool.name));

            assert_ne!(result.is_error, Some(true), "{} failed: {}", tool.name, body(&result));
            assert_eq!(body(&result)["success"], true, "{}", tool.name);
            assert_eq!(remote.calls().len(), 1, "{} should make exactly one remote call", tool.name);
        }
    }

    #[tokio::test]
    async fn each_task_action_maps_to_its_remote_method() {
        let cases = [
            ("approve_task", "tasks.task.approve", "Task approved successfully"),
            ("start_task", "tasks.task.start", "Task started successfully"),
            ("renew_task", "tasks.task.renew", "Task renewed successfully"),
            ("start_watching_task", "tasks.task.startwatch", "Started watching task successfully"),
            ("disapprove_task", "tasks.task.disapprove", "Task disapproved successfully"),
            ("complete_task", "tasks.task.complete", "Task completed successfully"),
        ];

        for (tool, method, message) in cases {
            let remote = Arc::new(RecordingBitrix::new());
            let result =
                server(&remote).call(tool, args(json!({"task_id": 42}))).await.expect("call");

            assert_eq!(
                body(&result),
                json!({"success": true, "task_id": "42", "message": message}),
                "{tool}"
            );
            let calls = remote.calls();
            assert_eq!(calls.len(), 1, "{tool}");
            assert_eq!(calls[0].method, method);
            assert_eq!(calls[0].params.get("taskId"), Some(&json!("42")));
            assert!(calls[0].params.get("userId").is_none(), "{tool} should not send userId");
        }
    }

    #[tokio::test]
    async fn delegation_forwards_the_new_responsible_user() {
        let remote = Arc::new(RecordingBitrix::new());
        let result = server(&remote)
            .call("delegate_task", args(json!({"task_id": "42", "user_id": 7})))
            .await
            .expect("call");

        assert_eq!(
            body(&result),
            json!({
                "success": true,
                "task_id": "42",
                "user_id": "7",
                "message": "Task delegated successfully"
            })
        );
        let calls = remote.calls_to("tasks.task.delegate");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].params.get("taskId"), Some(&json!("42")));
        assert_eq!(calls[0].params.get("userId"), Some(&json!("7")));

        let missing_user = server(&remote)
            .call("delegate_task", args(json!({"task_id": "42"})))
            .await
            .expect("call");
        assert_eq!(missing_user.is_error, Some(true));
        assert_eq!(remote.calls().len(), 1);
    }

    #[tokio::test]
    async fn created_task_id_comes_from_the_nested_task_record() {
        let remote = Arc::new(RecordingBitrix::new());
        remote.respond("tasks.task.add", json!({"task": {"id": 55, "title": "Write report"}}));

        let result = server(&remote)
            .call(
                "create_task",
                args(json!({"fields": "{\"TITLE\": \"Write report\", \"RESPONSIBLE_ID\": 1}"})),
            )
            .await
            .expect("call");

        assert_eq!(
            body(&result),
            json!({"success": true, "task_id": 55, "message": "Task created successfully"})
        );
        let calls = remote.calls_to("tasks.task.add");
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].params.get("fields"),
            Some(&json!({"TITLE": "Write report", "RESPONSIBLE_ID": 1}))
        );
    }

    #[tokio::test]
    async fn rejected_update_is_flagged_as_error() {
        let remote = Arc::new(RecordingBitrix::new());
        remote.respond("crm.deal.update", json!(false));

        let result = server(&remote)
            .call("update_deal", args(json!({"deal_id": 7, "fields": {"STAGE_ID": "WON"}})))
            .await
            .expect("call");

        assert_eq!(result.is_error, Some(true));
        let body = body(&result);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Failed to update deal");
    }

    #[tokio::test]
    async fn remote_rejection_surfaces_status() {
        let remote = Arc::new(RecordingBitrix::new());
        remote.fail(
            "crm.contact.get",
            RemoteError::Api {
                status: 401,
                code: "invalid_token".to_owned(),
                description: "The access token provided is invalid".to_owned(),
            },
        );

        let result =
            server(&remote).call("get_contact", args(json!({"contact_id": "3"}))).await.expect("call");

        assert_eq!(result.is_error, Some(true));
        let body = body(&result);
        assert_eq!(body["error_type"], "remote");
        assert!(body["error"].as_str().is_some_and(|message| message.contains("401")));
    }

    #[tokio::test]
    async fn unknown_tool_is_a_protocol_error() {
        let remote = Arc::new(RecordingBitrix::new());
        let result = server(&remote).call("get_invoices", None).await;
        assert!(result.is_err());
        assert!(remote.calls().is_empty());
    }
}
