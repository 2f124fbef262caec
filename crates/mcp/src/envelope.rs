//! Uniform response shapes returned to tool callers.

use bitrix_mcp_client::ListPage;
use serde_json::{json, Map, Value};

use crate::ToolError;

/// `{ success, count, <plural>: [...], total?, next_start? }`
pub(crate) fn list(plural: &str, page: ListPage) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("success".to_owned(), Value::Bool(true));
    body.insert("count".to_owned(), Value::from(page.items.len()));
    if let Some(total) = page.total {
        body.insert("total".to_owned(), Value::from(total));
    }
    if let Some(next) = page.next {
        body.insert("next_start".to_owned(), Value::from(next));
    }
    body.insert(plural.to_owned(), Value::Array(page.items));
    body
}

pub(crate) fn record(key: &str, record: Value) -> Value {
    let mut body = Map::new();
    body.insert("success".to_owned(), Value::Bool(true));
    body.insert(key.to_owned(), record);
    Value::Object(body)
}

pub(crate) fn created(id_key: &str, id: Value, message: String) -> Value {
    let mut body = Map::new();
    body.insert("success".to_owned(), Value::Bool(true));
    body.insert(id_key.to_owned(), id);
    body.insert("message".to_owned(), Value::from(message));
    Value::Object(body)
}

/// Acknowledgement of an update or action: success mirrors the remote answer.
pub(crate) struct Ack<'a> {
    pub id_key: &'a str,
    pub id: &'a str,
    pub success_message: String,
    pub failure_message: String,
    pub extra: Vec<(&'a str, Value)>,
}

impl<'a> Ack<'a> {
    pub(crate) fn new(
        id_key: &'a str,
        id: &'a str,
        success_message: impl Into<String>,
        failure_message: impl Into<String>,
    ) -> Self {
        Self {
            id_key,
            id,
            success_message: success_message.into(),
            failure_message: failure_message.into(),
            extra: Vec::new(),
        }
    }

    pub(crate) fn with(mut self, key: &'a str, value: Value) -> Self {
        self.extra.push((key, value));
        self
    }

    pub(crate) fn render(self, result: &Value) -> Value {
        let success = is_acknowledged(result);
        let mut body = Map::new();
        body.insert("success".to_owned(), Value::Bool(success));
        body.insert(self.id_key.to_owned(), Value::from(self.id));
        for (key, value) in self.extra {
            body.insert(key.to_owned(), value);
        }
        let message = if success { self.success_message } else { self.failure_message };
        body.insert("message".to_owned(), Value::from(message));
        Value::Object(body)
    }
}

pub(crate) fn failure(error: &ToolError) -> Value {
    json!({
        "success": false,
        "error": error.to_string(),
        "error_type": error.kind().as_str(),
    })
}

/// Truthiness of a remote acknowledgement.
pub(crate) fn is_acknowledged(result: &Value) -> bool {
    match result {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|value| value != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// A get answered with nothing usable.
pub(crate) fn is_empty_record(record: &Value) -> bool {
    !is_acknowledged(record)
}

/// Whether a rendered envelope reports success.
pub(crate) fn reports_success(body: &Value) -> bool {
    body.get("success").and_then(Value::as_bool).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use bitrix_mcp_client::{ListPage, RemoteError};
    use serde_json::{json, Value};

    use super::{failure, is_acknowledged, list, Ack};
    use crate::ToolError;

    #[test]
    fn list_envelope_reports_paging() {
        let page = ListPage { items: vec![json!({"ID": "1"})], total: Some(3), next: Some(1) };
        let body = Value::Object(list("leads", page));
        assert_eq!(
            body,
            json!({"success": true, "count": 1, "total": 3, "next_start": 1, "leads": [{"ID": "1"}]})
        );
    }

    #[test]
    fn ack_follows_remote_truthiness() {
        let ack = || Ack::new("task_id", "5", "Task started successfully", "Failed to start task");
        let ok = ack().render(&json!(true));
        assert_eq!(ok, json!({"success": true, "task_id": "5", "message": "Task started successfully"}));

        let rejected = ack().render(&json!(false));
        assert_eq!(rejected["success"], false);
        assert_eq!(rejected["message"], "Failed to start task");
    }

    #[test]
    fn truthiness_rules() {
        assert!(is_acknowledged(&json!({"task": {"id": 1}})));
        assert!(is_acknowledged(&json!(1)));
        assert!(!is_acknowledged(&json!(0)));
        assert!(!is_acknowledged(&json!([])));
        assert!(!is_acknowledged(&json!("")));
        assert!(!is_acknowledged(&Value::Null));
    }

    #[test]
    fn failure_carries_category() {
        let error = ToolError::Remote(RemoteError::Transport("connection refused".to_owned()));
        let body = failure(&error);
        assert_eq!(body["success"], false);
        assert_eq!(body["error_type"], "transport");
        assert!(body["error"].as_str().is_some_and(|message| message.contains("connection refused")));
    }
}
