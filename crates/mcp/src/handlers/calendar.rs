use std::collections::HashSet;

use bitrix_mcp_client::{BitrixApi, ListPage, Params, RemoteError};
use bitrix_mcp_core::catalog::{DEFAULT_LIST_LIMIT, DEFAULT_NEAREST_DAYS};
use bitrix_mcp_core::{CalendarOperation, ToolArgs};
use serde_json::{json, Value};

use super::params;
use crate::envelope::{self, Ack};
use crate::{ToolError, ToolResult};

pub(super) async fn handle(
    api: &dyn BitrixApi,
    operation: CalendarOperation,
    args: &ToolArgs,
) -> ToolResult<Value> {
    let method = operation.method();
    match operation {
        CalendarOperation::ListEvents => {
            let query = event_query(args);
            let result = api.call(method, query).await?;
            let mut events = into_items(result)?;
            let limit = args.integer("limit").unwrap_or(DEFAULT_LIST_LIMIT);
            if limit > 0 {
                events.truncate(limit as usize);
            }
            Ok(Value::Object(envelope::list(
                "events",
                ListPage { items: events, total: None, next: None },
            )))
        }
        CalendarOperation::CreateEvent => {
            let fields = args.require_object("fields")?.clone();
            let result = api.call(method, fields).await?;
            Ok(envelope::created("event_id", result, "Calendar event created successfully".to_owned()))
        }
        CalendarOperation::UpdateEvent => {
            let event_id = args.require_text("event_id")?;
            let mut fields = args.require_object("fields")?.clone();
            fields.insert("id".to_owned(), Value::from(event_id));
            let result = api.call(method, fields).await?;
            Ok(Ack::new(
                "event_id",
                event_id,
                "Calendar event updated successfully",
                "Failed to update event",
            )
            .render(&result))
        }
        CalendarOperation::DeleteEvent => {
            let event_id = args.require_text("event_id")?;
            let result = api.call(method, params([("id", Value::from(event_id))])).await?;
            Ok(Ack::new(
                "event_id",
                event_id,
                "Calendar event deleted successfully",
                "Failed to delete event",
            )
            .render(&result))
        }
        CalendarOperation::ListSections => {
            let query = section_query(args.object("filter_params").cloned().unwrap_or_default());
            let result = api.call(method, query).await?;
            let calendars = if result.is_null() { Value::Array(Vec::new()) } else { result };
            Ok(envelope::record("calendars", calendars))
        }
        CalendarOperation::GetEvent => {
            let event_id = args.require_text("event_id")?;
            let result = api.call(method, params([("id", Value::from(event_id))])).await?;
            if envelope::is_empty_record(&result) {
                return Err(ToolError::NotFound(format!("Event with ID {event_id} not found")));
            }
            Ok(envelope::record("event", result))
        }
        CalendarOperation::NearestEvents => {
            let result = api.call(method, nearest_query(args)).await?;
            let events = into_items(result)?;
            Ok(Value::Object(envelope::list(
                "events",
                ListPage { items: events, total: None, next: None },
            )))
        }
        CalendarOperation::GetMeetingStatus => {
            let event_id = args.require_text("event_id")?;
            let status = api.call(method, params([("eventId", Value::from(event_id))])).await?;
            if status.is_null() {
                return Err(ToolError::NotFound(format!(
                    "Could not get meeting status for event {event_id}"
                )));
            }
            Ok(json!({"success": true, "event_id": event_id, "status": status}))
        }
        CalendarOperation::SetMeetingStatus => {
            let event_id = args.require_text("event_id")?;
            let status = args.require_text("status")?;
            let result = api
                .call(
                    method,
                    params([("eventId", Value::from(event_id)), ("status", Value::from(status))]),
                )
                .await?;
            Ok(Ack::new(
                "event_id",
                event_id,
                "Meeting status updated successfully",
                "Failed to update meeting status",
            )
            .with("status", Value::from(status))
            .render(&result))
        }
    }
}

fn into_items(result: Value) -> Result<Vec<Value>, RemoteError> {
    match result {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Err(RemoteError::Decode(format!("expected a list of events, got {other}"))),
    }
}

/// Builds the `calendar.event.get` parameters: filter keys pass through,
/// section ids are merged and deduplicated, dates map to `from`/`to`.
fn event_query(args: &ToolArgs) -> Params {
    let mut query = args.object("filter_params").cloned().unwrap_or_default();

    let mut sections = Vec::new();
    if let Some(value) = query.get("section") {
        sections.extend(normalize_sections(value));
    }
    if let Some(raw) = args.text("sections") {
        sections.extend(normalize_sections(&Value::from(raw)));
    }

    let mut seen = HashSet::new();
    sections.retain(|section| seen.insert(section_key(section)));
    if sections.is_empty() {
        query.remove("section");
    } else {
        query.insert("section".to_owned(), Value::Array(sections));
    }

    if let Some(date_from) = args.text("date_from") {
        query.insert("from".to_owned(), Value::from(date_from));
    }
    if let Some(date_to) = args.text("date_to") {
        query.insert("to".to_owned(), Value::from(date_to));
    }
    query
}

/// Accepts an array, a number, a JSON-encoded value or a comma-separated list.
fn normalize_sections(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Number(number) => match number.as_i64() {
            Some(id) => vec![Value::from(id)],
            None => number.as_f64().map(|id| vec![Value::from(id.trunc() as i64)]).unwrap_or_default(),
        },
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Array(items)) => items,
            Ok(parsed) => vec![parsed],
            Err(_) => text
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| match item.parse::<u64>() {
                    Ok(id) if item.bytes().all(|byte| byte.is_ascii_digit()) => Value::from(id),
                    _ => Value::from(item),
                })
                .collect(),
        },
        Value::Null | Value::Bool(_) | Value::Object(_) => Vec::new(),
    }
}

fn section_key(section: &Value) -> String {
    match section {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Normalizes `calendar.section.get` parameters; the calendar type defaults to `user`.
fn section_query(mut query: Params) -> Params {
    if !query.contains_key("type") {
        if let Some(calendar_type) = query.remove("TYPE") {
            query.insert("type".to_owned(), calendar_type);
        }
    }
    if !query.contains_key("ownerId") {
        let owner = query.remove("OWNER_ID").or_else(|| query.remove("owner_id"));
        if let Some(owner) = owner {
            query.insert("ownerId".to_owned(), owner);
        }
    }
    query.entry("type").or_insert_with(|| Value::from("user"));

    let numeric_owner = match query.get("ownerId") {
        Some(Value::String(owner)) => owner.trim().parse::<i64>().ok(),
        _ => None,
    };
    if let Some(owner_id) = numeric_owner {
        query.insert("ownerId".to_owned(), Value::from(owner_id));
    }
    query
}

/// Only non-default settings are forwarded.
fn nearest_query(args: &ToolArgs) -> Params {
    let mut query = Params::new();
    if let Some(calendar_type) = args.text("calendar_type") {
        query.insert("type".to_owned(), Value::from(calendar_type));
    }
    if let Some(owner_id) = args.integer("owner_id") {
        query.insert("ownerId".to_owned(), Value::from(owner_id));
    }
    let days = args.integer("days").unwrap_or(DEFAULT_NEAREST_DAYS);
    if days != DEFAULT_NEAREST_DAYS {
        query.insert("days".to_owned(), Value::from(days));
    }
    if args.boolean("for_current_user") == Some(false) {
        query.insert("forCurrentUser".to_owned(), Value::Bool(false));
    }
    if let Some(max_events) = args.integer("max_events_count").filter(|count| *count > 0) {
        query.insert("maxEventsCount".to_owned(), Value::from(max_events));
    }
    if let Some(detail_url) = args.text("detail_url") {
        query.insert("detailUrl".to_owned(), Value::from(detail_url));
    }
    query
}
