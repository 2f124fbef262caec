use bitrix_mcp_client::{BitrixApi, Params};
use bitrix_mcp_core::entity::TASK;
use bitrix_mcp_core::{TaskAction, ToolArgs};
use serde_json::Value;

use crate::envelope::Ack;
use crate::ToolResult;

/// Issues one remote action keyed by the task id; no local state changes.
pub(super) async fn perform(
    api: &dyn BitrixApi,
    action: TaskAction,
    args: &ToolArgs,
) -> ToolResult<Value> {
    let task_id = args.require_text("task_id")?;

    let mut call = Params::new();
    call.insert(TASK.id_param.to_owned(), Value::from(task_id));
    let user_id = if action.takes_user() { Some(args.require_text("user_id")?) } else { None };
    if let Some(user_id) = user_id {
        call.insert("userId".to_owned(), Value::from(user_id));
    }

    let result = api.call(action.method(), call).await?;

    let mut ack = Ack::new("task_id", task_id, action.success_message(), action.failure_message());
    if let Some(user_id) = user_id {
        ack = ack.with("user_id", Value::from(user_id));
    }
    Ok(ack.render(&result))
}
