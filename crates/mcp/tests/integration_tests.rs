//! End-to-end tests for the Bitrix24 MCP server
//!
//! A real MCP client talks to the server over an in-memory duplex pipe while
//! the remote portal is replaced by a recording double.

use std::sync::Arc;

use bitrix_mcp::testing::RecordingBitrix;
use bitrix_mcp::{BitrixMcpServer, Toolbox};
use bitrix_mcp_client::ListPage;
use bitrix_mcp_core::AppConfig;
use rmcp::model::{CallToolRequestParam, CallToolResult, RawContent};
use rmcp::{RoleClient, ServerHandler, ServiceExt};
use serde_json::{json, Value};

type Client = rmcp::service::RunningService<RoleClient, ()>;

async fn connect(remote: Arc<RecordingBitrix>) -> anyhow::Result<Client> {
    let (server_io, client_io) = tokio::io::duplex(64 * 1024);
    let server = BitrixMcpServer::new(Toolbox::new(remote), &AppConfig::default().server);

    tokio::spawn(async move {
        if let Ok(service) = server.serve(server_io).await {
            let _ = service.waiting().await;
        }
    });

    Ok(().serve(client_io).await?)
}

fn body(result: &CallToolResult) -> Value {
    result
        .content
        .iter()
        .find_map(|content| match &content.raw {
            RawContent::Text(text) => serde_json::from_str(&text.text).ok(),
            _ => None,
        })
        .unwrap_or(Value::Null)
}

#[test]
fn server_identity_and_capabilities() {
    let server = BitrixMcpServer::new(
        Toolbox::new(Arc::new(RecordingBitrix::new())),
        &AppConfig::default().server,
    );

    let info = server.get_info();
    assert_eq!(info.server_info.name, "bitrix24-mcp");
    assert!(info.capabilities.tools.is_some());
    assert!(info.instructions.is_some_and(|text| text.contains("Bitrix24")));
}

#[tokio::test]
async fn lists_the_full_catalog() -> anyhow::Result<()> {
    let client = connect(Arc::new(RecordingBitrix::new())).await?;

    let tools = client.list_all_tools().await?;
    assert_eq!(tools.len(), 50);
    for name in ["get_leads", "create_task", "get_calendar_events", "invite_project_member"] {
        assert!(tools.iter().any(|tool| tool.name == name), "{name} missing");
    }

    client.cancel().await?;
    Ok(())
}

#[tokio::test]
async fn calls_a_tool_through_the_protocol() -> anyhow::Result<()> {
    let remote = Arc::new(RecordingBitrix::new());
    remote.respond_page(
        "crm.deal.list",
        ListPage {
            items: vec![json!({"ID": "1"}), json!({"ID": "2"}), json!({"ID": "3"})],
            total: Some(3),
            next: None,
        },
    );
    let client = connect(remote.clone()).await?;

    let result = client
        .call_tool(CallToolRequestParam {
            name: "get_deals".into(),
            arguments: json!({"limit": 2}).as_object().cloned(),
        })
        .await?;

    assert_ne!(result.is_error, Some(true));
    let body = body(&result);
    assert_eq!(body["count"], 2);
    assert_eq!(body["next_start"], 2);
    assert_eq!(remote.calls_to("crm.deal.list").len(), 1);

    client.cancel().await?;
    Ok(())
}

#[tokio::test]
async fn invalid_arguments_come_back_as_error_results() -> anyhow::Result<()> {
    let remote = Arc::new(RecordingBitrix::new());
    let client = connect(remote.clone()).await?;

    let result = client
        .call_tool(CallToolRequestParam {
            name: "create_lead".into(),
            arguments: json!({"fields": "{broken"}).as_object().cloned(),
        })
        .await?;

    assert_eq!(result.is_error, Some(true));
    assert_eq!(body(&result)["error_type"], "validation");
    assert!(remote.calls().is_empty());

    client.cancel().await?;
    Ok(())
}

#[tokio::test]
async fn unknown_tool_is_rejected_by_the_protocol() -> anyhow::Result<()> {
    let client = connect(Arc::new(RecordingBitrix::new())).await?;

    let outcome = client
        .call_tool(CallToolRequestParam { name: "get_invoices".into(), arguments: None })
        .await;
    assert!(outcome.is_err());

    client.cancel().await?;
    Ok(())
}
