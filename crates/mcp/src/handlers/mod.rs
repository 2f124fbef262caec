//! Per-domain translation between validated tool arguments and remote calls.

mod calendar;
mod entities;
mod projects;
mod tasks;

use bitrix_mcp_client::{BitrixApi, ListRequest, Params};
use bitrix_mcp_core::catalog::DEFAULT_LIST_LIMIT;
use bitrix_mcp_core::{Operation, ToolArgs};
use serde_json::Value;

use crate::ToolResult;

pub(crate) async fn dispatch(
    api: &dyn BitrixApi,
    operation: Operation,
    args: &ToolArgs,
) -> ToolResult<Value> {
    match operation {
        Operation::List(entity) => entities::list(api, entity, args).await,
        Operation::Get(entity) => entities::get(api, entity, args).await,
        Operation::Create(entity) => entities::create(api, entity, args).await,
        Operation::Update(entity) => entities::update(api, entity, args).await,
        Operation::Fields(entity) => entities::fields(api, entity).await,
        Operation::Task(action) => tasks::perform(api, action, args).await,
        Operation::Calendar(operation) => calendar::handle(api, operation, args).await,
        Operation::Project(operation) => projects::handle(api, operation, args).await,
    }
}

fn list_request(args: &ToolArgs) -> ListRequest {
    let start = args.integer("start").unwrap_or(0).max(0) as u64;
    let limit = args.integer("limit").unwrap_or(DEFAULT_LIST_LIMIT).max(0) as u64;
    ListRequest::new(start, limit)
}

fn params<const N: usize>(pairs: [(&str, Value); N]) -> Params {
    pairs.into_iter().map(|(key, value)| (key.to_owned(), value)).collect()
}

/// Follows object members along `path`.
fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(key))
}
