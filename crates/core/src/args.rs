use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

use crate::catalog::{ParamKind, ParamSpec, ToolDescriptor};
use crate::errors::ArgumentError;

#[derive(Clone, Debug, PartialEq)]
pub enum ArgValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
    Object(Map<String, Value>),
    Fields(Vec<String>),
}

/// Arguments checked against a tool's declared parameters, with defaults applied.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToolArgs {
    values: BTreeMap<String, ArgValue>,
}

impl ToolArgs {
    pub fn validate(
        tool: &ToolDescriptor,
        raw: Option<&Map<String, Value>>,
    ) -> Result<Self, ArgumentError> {
        let empty = Map::new();
        let raw = raw.unwrap_or(&empty);

        if let Some(unknown) = raw.keys().find(|key| tool.param_spec(key).is_none()) {
            return Err(ArgumentError::Unknown(unknown.clone()));
        }

        let mut values = BTreeMap::new();
        for spec in &tool.params {
            let supplied = raw.get(&spec.name).filter(|value| !is_blank(value));
            let value = match (supplied, &spec.default) {
                (Some(value), _) => value,
                (None, _) if spec.required => {
                    return Err(ArgumentError::Missing(spec.name.clone()));
                }
                (None, Some(default)) => default,
                (None, None) => continue,
            };

            if let Some(parsed) = parse_value(spec, value)? {
                values.insert(spec.name.clone(), parsed);
            }
        }

        Ok(Self { values })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ArgValue::Text(value)) => Some(value),
            _ => None,
        }
    }

    pub fn require_text(&self, name: &str) -> Result<&str, ArgumentError> {
        self.text(name).ok_or_else(|| ArgumentError::Missing(name.to_owned()))
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ArgValue::Integer(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(ArgValue::Boolean(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn object(&self, name: &str) -> Option<&Map<String, Value>> {
        match self.values.get(name) {
            Some(ArgValue::Object(value)) => Some(value),
            _ => None,
        }
    }

    pub fn require_object(&self, name: &str) -> Result<&Map<String, Value>, ArgumentError> {
        self.object(name).ok_or_else(|| ArgumentError::Missing(name.to_owned()))
    }

    pub fn fields(&self, name: &str) -> Option<&[String]> {
        match self.values.get(name) {
            Some(ArgValue::Fields(value)) => Some(value),
            _ => None,
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

fn parse_value(spec: &ParamSpec, value: &Value) -> Result<Option<ArgValue>, ArgumentError> {
    let name = spec.name.as_str();
    let parsed = match spec.kind {
        ParamKind::Id => ArgValue::Text(parse_id(name, value)?),
        ParamKind::Text => ArgValue::Text(parse_text(name, value)?),
        ParamKind::Integer { min } => ArgValue::Integer(parse_integer(name, value, min)?),
        ParamKind::Boolean => ArgValue::Boolean(parse_boolean(name, value)?),
        ParamKind::JsonObject => ArgValue::Object(parse_object(name, value)?),
        ParamKind::FieldList => {
            let fields = parse_field_list(name, value)?;
            if fields.is_empty() {
                return Ok(None);
            }
            ArgValue::Fields(fields)
        }
        ParamKind::Date => ArgValue::Text(parse_date(name, value)?),
        ParamKind::Choice(choices) => ArgValue::Text(parse_choice(name, value, choices)?),
    };
    Ok(Some(parsed))
}

fn parse_id(name: &str, value: &Value) -> Result<String, ArgumentError> {
    match value {
        Value::String(text) => Ok(text.trim().to_owned()),
        Value::Number(number) if number.is_i64() || number.is_u64() => Ok(number.to_string()),
        _ => Err(ArgumentError::invalid(name, "expected an identifier string or integer")),
    }
}

fn parse_text(name: &str, value: &Value) -> Result<String, ArgumentError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        _ => Err(ArgumentError::invalid(name, "expected a string")),
    }
}

fn parse_integer(name: &str, value: &Value, min: i64) -> Result<i64, ArgumentError> {
    let parsed = match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    };
    let parsed = parsed.ok_or_else(|| ArgumentError::invalid(name, "expected an integer"))?;
    if parsed < min {
        return Err(ArgumentError::invalid(name, format!("must be at least {min}")));
    }
    Ok(parsed)
}

fn parse_boolean(name: &str, value: &Value) -> Result<bool, ArgumentError> {
    match value {
        Value::Bool(flag) => Ok(*flag),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(ArgumentError::invalid(name, "expected true or false")),
        },
        _ => Err(ArgumentError::invalid(name, "expected a boolean")),
    }
}

fn parse_object(name: &str, value: &Value) -> Result<Map<String, Value>, ArgumentError> {
    let decoded;
    let value = match value {
        Value::String(text) => {
            decoded = serde_json::from_str::<Value>(text).map_err(|err| {
                ArgumentError::MalformedJson { name: name.to_owned(), reason: err.to_string() }
            })?;
            &decoded
        }
        other => other,
    };
    match value {
        Value::Object(map) => Ok(map.clone()),
        _ => Err(ArgumentError::invalid(name, "expected a JSON object")),
    }
}

fn parse_field_list(name: &str, value: &Value) -> Result<Vec<String>, ArgumentError> {
    match value {
        Value::String(text) => Ok(text
            .split(',')
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .map(str::to_owned)
            .collect()),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(field) => Ok(field.trim().to_owned()),
                _ => Err(ArgumentError::invalid(name, "field names must be strings")),
            })
            .filter(|field| !matches!(field, Ok(field) if field.is_empty()))
            .collect(),
        _ => Err(ArgumentError::invalid(name, "expected comma-separated field names")),
    }
}

fn parse_date(name: &str, value: &Value) -> Result<String, ArgumentError> {
    let Value::String(text) = value else {
        return Err(ArgumentError::invalid(name, "expected a date string"));
    };
    let text = text.trim();
    let recognised = NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S").is_ok()
        || DateTime::parse_from_rfc3339(text).is_ok();
    if !recognised {
        return Err(ArgumentError::invalid(
            name,
            format!("`{text}` is not a date (expected YYYY-MM-DD)"),
        ));
    }
    Ok(text.to_owned())
}

fn parse_choice(name: &str, value: &Value, choices: &[&str]) -> Result<String, ArgumentError> {
    let Value::String(text) = value else {
        return Err(ArgumentError::invalid(name, "expected a string"));
    };
    if choices.contains(&text.as_str()) {
        Ok(text.clone())
    } else {
        Err(ArgumentError::invalid(
            name,
            format!("`{text}` must be one of {}", choices.join(", ")),
        ))
    }
}
