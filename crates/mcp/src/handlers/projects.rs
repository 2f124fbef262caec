use bitrix_mcp_client::{BitrixApi, ListRequest, Params};
use bitrix_mcp_core::entity::{check_required_fields, PROJECT_REQUIRED_FIELDS};
use bitrix_mcp_core::{ProjectOperation, ToolArgs};
use serde_json::{json, Value};

use super::{list_request, params};
use crate::envelope::{self, Ack};
use crate::ToolResult;

pub(super) async fn handle(
    api: &dyn BitrixApi,
    operation: ProjectOperation,
    args: &ToolArgs,
) -> ToolResult<Value> {
    let method = operation.method();
    match operation {
        ProjectOperation::List => {
            let mut query = Params::new();
            if let Some(filter) = args.object("filter_params") {
                query.insert("FILTER".to_owned(), Value::Object(filter.clone()));
            }
            if let Some(order) = args.object("order") {
                query.insert("ORDER".to_owned(), Value::Object(order.clone()));
            }
            let mut page = api.list(method, query, list_request(args)).await?;
            page.total = page.total.or(Some(page.items.len() as u64));
            Ok(Value::Object(envelope::list("projects", page)))
        }
        ProjectOperation::Create => {
            let fields = args.require_object("fields")?;
            check_required_fields(fields, PROJECT_REQUIRED_FIELDS)?;
            let result = api.call(method, fields.clone()).await?;
            Ok(envelope::created("project_id", result, "Project created successfully".to_owned()))
        }
        ProjectOperation::Update => {
            let project_id = args.require_text("project_id")?;
            let mut call = args.require_object("fields")?.clone();
            call.insert("GROUP_ID".to_owned(), Value::from(project_id));
            let result = api.call(method, call).await?;
            Ok(Ack::new(
                "project_id",
                project_id,
                "Project updated successfully",
                "Failed to update project",
            )
            .render(&result))
        }
        ProjectOperation::Tasks => {
            let project_id = args.require_text("project_id")?;
            let query = params([("filter", json!({"GROUP_ID": project_id}))]);
            let page = api.list(method, query, list_request(args)).await?;
            let mut body = envelope::list("tasks", page);
            body.insert("project_id".to_owned(), Value::from(project_id));
            Ok(Value::Object(body))
        }
        ProjectOperation::AddMember => {
            let project_id = args.require_text("project_id")?;
            let user_id = args.require_text("user_id")?;
            let role = args.text("role").unwrap_or("member");
            let result = api
                .call(
                    method,
                    params([
                        ("GROUP_ID", Value::from(project_id)),
                        ("USER_ID", Value::from(user_id)),
                        ("ROLE", Value::from(role)),
                    ]),
                )
                .await?;
            Ok(Ack::new("project_id", project_id, "Member added successfully", "Failed to add member")
                .with("user_id", Value::from(user_id))
                .with("role", Value::from(role))
                .render(&result))
        }
        ProjectOperation::Members => {
            let project_id = args.require_text("project_id")?;
            let query = params([("ID", Value::from(project_id))]);
            let page = api.list(method, query, ListRequest::default()).await?;
            let mut body = envelope::list("members", page);
            body.insert("project_id".to_owned(), Value::from(project_id));
            Ok(Value::Object(body))
        }
        ProjectOperation::ExpelMember => {
            let project_id = args.require_text("project_id")?;
            let user_id = args.require_text("user_id")?;
            let result = api
                .call(
                    method,
                    params([("GROUP_ID", Value::from(project_id)), ("USER_ID", Value::from(user_id))]),
                )
                .await?;
            Ok(Ack::new(
                "project_id",
                project_id,
                "Member expelled successfully",
                "Failed to expel member",
            )
            .with("user_id", Value::from(user_id))
            .render(&result))
        }
        ProjectOperation::RequestJoin => {
            let project_id = args.require_text("project_id")?;
            let message = args.text("message");
            let mut call = params([("GROUP_ID", Value::from(project_id))]);
            if let Some(message) = message {
                call.insert("MESSAGE".to_owned(), Value::from(message));
            }
            let result = api.call(method, call).await?;
            Ok(Ack::new(
                "project_id",
                project_id,
                "Join request sent successfully",
                "Failed to send join request",
            )
            .with("request_message", message.map(Value::from).unwrap_or(Value::Null))
            .render(&result))
        }
        ProjectOperation::InviteMember => {
            let project_id = args.require_text("project_id")?;
            let user_id = args.require_text("user_id")?;
            let message = args.text("message");
            let mut call =
                params([("GROUP_ID", Value::from(project_id)), ("USER_ID", Value::from(user_id))]);
            if let Some(message) = message {
                call.insert("MESSAGE".to_owned(), Value::from(message));
            }
            let result = api.call(method, call).await?;
            Ok(Ack::new(
                "project_id",
                project_id,
                "Invitation sent successfully",
                "Failed to send invitation",
            )
            .with("user_id", Value::from(user_id))
            .with("invitation_message", message.map(Value::from).unwrap_or(Value::Null))
            .render(&result))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bitrix_mcp_client::{ListPage, ListRequest};
    use serde_json::{json, Map, Value};

    use crate::testing::RecordingBitrix;
    use crate::{ToolError, Toolbox};

    async fn invoke(remote: &Arc<RecordingBitrix>, tool: &str, arguments: Value) -> Result<Value, ToolError> {
        let arguments: Map<String, Value> = arguments.as_object().cloned().unwrap_or_default();
        Toolbox::new(remote.clone()).invoke(tool, Some(&arguments)).await
    }

    #[tokio::test]
    async fn listing_sends_upper_case_filter_and_order() -> Result<(), ToolError> {
        let remote = Arc::new(RecordingBitrix::new());
        remote.respond_page(
            "sonet_group.get",
            ListPage {
                items: vec![json!({"ID": "1", "NAME": "Launch"}), json!({"ID": "2", "NAME": "Ops"})],
                total: None,
                next: None,
            },
        );

        let body = invoke(
            &remote,
            "get_projects",
            json!({"filter_params": "{\"ACTIVE\": \"Y\"}", "order": {"NAME": "ASC"}, "limit": 10}),
        )
        .await?;

        assert_eq!(body["count"], 2);
        assert_eq!(body["total"], 2);
        assert_eq!(body["projects"][1]["NAME"], "Ops");

        let calls = remote.calls_to("sonet_group.get");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].params.get("FILTER"), Some(&json!({"ACTIVE": "Y"})));
        assert_eq!(calls[0].params.get("ORDER"), Some(&json!({"NAME": "ASC"})));
        assert!(calls[0].params.get("filter").is_none());
        assert_eq!(calls[0].list, Some(ListRequest::new(0, 10)));
        Ok(())
    }

    #[tokio::test]
    async fn creation_requires_a_name() {
        let remote = Arc::new(RecordingBitrix::new());
        let result = invoke(&remote, "create_project", json!({"fields": {"VISIBLE": "Y"}})).await;

        assert!(matches!(result, Err(ToolError::Argument(_))), "{result:?}");
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn creation_reports_the_new_group_id() -> Result<(), ToolError> {
        let remote = Arc::new(RecordingBitrix::new());
        remote.respond("sonet_group.create", json!(17));

        let body = invoke(&remote, "create_project", json!({"fields": {"NAME": "Launch"}})).await?;

        assert_eq!(
            body,
            json!({"success": true, "project_id": 17, "message": "Project created successfully"})
        );
        let calls = remote.calls_to("sonet_group.create");
        assert_eq!(calls[0].params.get("NAME"), Some(&json!("Launch")));
        Ok(())
    }

    #[tokio::test]
    async fn update_merges_group_id_into_fields() -> Result<(), ToolError> {
        let remote = Arc::new(RecordingBitrix::new());

        let body =
            invoke(&remote, "update_project", json!({"project_id": 12, "fields": {"NAME": "Renamed"}}))
                .await?;

        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Project updated successfully");
        let calls = remote.calls_to("sonet_group.update");
        assert_eq!(calls.len(), 1);
        assert_eq!(
            Value::Object(calls[0].params.clone()),
            json!({"GROUP_ID": "12", "NAME": "Renamed"})
        );
        Ok(())
    }

    #[tokio::test]
    async fn project_tasks_filter_by_group() -> Result<(), ToolError> {
        let remote = Arc::new(RecordingBitrix::new());

        let body = invoke(&remote, "get_project_tasks", json!({"project_id": "12", "limit": 5})).await?;

        assert_eq!(body["project_id"], "12");
        assert_eq!(body["count"], 0);
        let calls = remote.calls_to("tasks.task.list");
        assert_eq!(calls[0].params.get("filter"), Some(&json!({"GROUP_ID": "12"})));
        assert_eq!(calls[0].list, Some(ListRequest::new(0, 5)));
        Ok(())
    }

    #[tokio::test]
    async fn member_role_defaults_to_member() -> Result<(), ToolError> {
        let remote = Arc::new(RecordingBitrix::new());

        let body = invoke(&remote, "add_project_member", json!({"project_id": "12", "user_id": "7"})).await?;
        assert_eq!(body["role"], "member");
        assert_eq!(body["message"], "Member added successfully");

        invoke(
            &remote,
            "add_project_member",
            json!({"project_id": "12", "user_id": "8", "role": "moderator"}),
        )
        .await?;

        let calls = remote.calls_to("sonet_group.user.add");
        assert_eq!(
            Value::Object(calls[0].params.clone()),
            json!({"GROUP_ID": "12", "USER_ID": "7", "ROLE": "member"})
        );
        assert_eq!(calls[1].params.get("ROLE"), Some(&json!("moderator")));
        Ok(())
    }

    #[tokio::test]
    async fn join_request_sends_message_only_when_given() -> Result<(), ToolError> {
        let remote = Arc::new(RecordingBitrix::new());

        let body = invoke(&remote, "request_join_project", json!({"project_id": "12"})).await?;
        assert_eq!(body["request_message"], Value::Null);

        let body = invoke(
            &remote,
            "request_join_project",
            json!({"project_id": "12", "message": "Please add me"}),
        )
        .await?;
        assert_eq!(body["request_message"], "Please add me");

        let calls = remote.calls_to("sonet_group.user.request");
        assert_eq!(Value::Object(calls[0].params.clone()), json!({"GROUP_ID": "12"}));
        assert_eq!(
            Value::Object(calls[1].params.clone()),
            json!({"GROUP_ID": "12", "MESSAGE": "Please add me"})
        );
        Ok(())
    }

    #[tokio::test]
    async fn invitation_sends_message_only_when_given() -> Result<(), ToolError> {
        let remote = Arc::new(RecordingBitrix::new());
        remote.respond("sonet_group.user.invite", json!(false));

        let body = invoke(&remote, "invite_project_member", json!({"project_id": "12", "user_id": "7"})).await?;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Failed to send invitation");

        invoke(
            &remote,
            "invite_project_member",
            json!({"project_id": "12", "user_id": "7", "message": "Join us"}),
        )
        .await?;

        let calls = remote.calls_to("sonet_group.user.invite");
        assert_eq!(Value::Object(calls[0].params.clone()), json!({"GROUP_ID": "12", "USER_ID": "7"}));
        assert_eq!(calls[1].params.get("MESSAGE"), Some(&json!("Join us")));
        Ok(())
    }

    #[tokio::test]
    async fn members_are_listed_without_paging_arguments() -> Result<(), ToolError> {
        let remote = Arc::new(RecordingBitrix::new());
        remote.respond_page(
            "sonet_group.user.get",
            ListPage { items: vec![json!({"USER_ID": "7", "ROLE": "E"})], total: None, next: None },
        );

        let body = invoke(&remote, "get_project_members", json!({"project_id": "12"})).await?;

        assert_eq!(body["count"], 1);
        assert_eq!(body["members"][0]["USER_ID"], "7");
        let calls = remote.calls_to("sonet_group.user.get");
        assert_eq!(calls[0].params.get("ID"), Some(&json!("12")));
        assert_eq!(calls[0].list, Some(ListRequest::default()));
        Ok(())
    }
}
