//! CRUD tools shared by leads, deals, contacts, companies and tasks.

use bitrix_mcp_client::{BitrixApi, Params};
use bitrix_mcp_core::{EntitySpec, ToolArgs};
use serde_json::Value;
use tracing::debug;

use super::{list_request, lookup, params};
use crate::envelope::{self, Ack};
use crate::{ToolError, ToolResult};

pub(super) async fn list(
    api: &dyn BitrixApi,
    entity: &EntitySpec,
    args: &ToolArgs,
) -> ToolResult<Value> {
    let mut query = Params::new();
    if let Some(filter) = args.object("filter_params") {
        query.insert("filter".to_owned(), Value::Object(filter.clone()));
    }
    if let Some(select) = args.fields("select_fields") {
        query.insert("select".to_owned(), Value::from(select.to_vec()));
    }
    if let Some(order) = args.object("order") {
        query.insert("order".to_owned(), Value::Object(order.clone()));
    }

    let request = list_request(args);
    debug!(method = entity.list_method, start = request.start, limit = request.limit, "listing records");
    let page = api.list(entity.list_method, query, request).await?;
    Ok(Value::Object(envelope::list(entity.plural, page)))
}

pub(super) async fn get(
    api: &dyn BitrixApi,
    entity: &EntitySpec,
    args: &ToolArgs,
) -> ToolResult<Value> {
    let id = args.require_text(&entity.id_argument())?;
    let result = api.call(entity.get_method, params([(entity.id_param, Value::from(id))])).await?;

    let record = match entity.record_key {
        Some(key) => result.get(key).cloned().unwrap_or(Value::Null),
        None => result,
    };
    if envelope::is_empty_record(&record) {
        return Err(ToolError::NotFound(format!("{} with ID {id} not found", entity.label)));
    }
    Ok(envelope::record(entity.key, record))
}

pub(super) async fn create(
    api: &dyn BitrixApi,
    entity: &EntitySpec,
    args: &ToolArgs,
) -> ToolResult<Value> {
    let fields = args.require_object("fields")?;
    entity.check_required(fields)?;

    let result =
        api.call(entity.add_method, params([("fields", Value::Object(fields.clone()))])).await?;
    let id = lookup(&result, entity.created_id_path).cloned().unwrap_or(Value::Null);
    Ok(envelope::created(
        &entity.id_argument(),
        id,
        format!("{} created successfully", entity.label),
    ))
}

pub(super) async fn update(
    api: &dyn BitrixApi,
    entity: &EntitySpec,
    args: &ToolArgs,
) -> ToolResult<Value> {
    let id_key = entity.id_argument();
    let id = args.require_text(&id_key)?;
    let fields = args.require_object("fields")?;

    let result = api
        .call(
            entity.update_method,
            params([(entity.id_param, Value::from(id)), ("fields", Value::Object(fields.clone()))]),
        )
        .await?;
    Ok(Ack::new(
        &id_key,
        id,
        format!("{} updated successfully", entity.label),
        format!("Failed to update {}", entity.key),
    )
    .render(&result))
}

pub(super) async fn fields(api: &dyn BitrixApi, entity: &EntitySpec) -> ToolResult<Value> {
    let result = api.call(entity.fields_method, Params::new()).await?;
    let fields = match entity.fields_key {
        Some(key) => match result.get(key) {
            Some(fields) => fields.clone(),
            None => result,
        },
        None => result,
    };
    Ok(envelope::record("fields", fields))
}
