use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use bitrix_mcp_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE, NESTED_CONFIG_FILE};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

use super::{CommandResult, CONFIG_EXIT_CODE};

struct Sources {
    file_path: Option<PathBuf>,
    file_doc: Option<Value>,
}

impl Sources {
    fn detect(explicit: Option<&Path>) -> Self {
        let file_path = detect_config_path(explicit);
        let file_doc = load_config_file_doc(file_path.as_deref());
        Self { file_path, file_doc }
    }

    fn line(&self, key_path: &str, env_key: &str, value: &str) -> String {
        render_line(key_path, value, self.field_source(key_path, env_key))
    }

    fn field_source(&self, key_path: &str, env_key: &str) -> String {
        if env::var(env_key).is_ok_and(|value| !value.trim().is_empty()) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = &self.file_doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .file_path
                    .as_deref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

pub fn run(config_path: Option<PathBuf>) -> CommandResult {
    let options = LoadOptions {
        require_file: config_path.is_some(),
        config_path: config_path.clone(),
        ..LoadOptions::default()
    };
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                CONFIG_EXIT_CODE,
            )
        }
    };

    CommandResult::text(0, render(&config, &Sources::detect(config_path.as_deref())))
}

fn render(config: &AppConfig, sources: &Sources) -> String {
    let bitrix = &config.bitrix;
    let server = &config.server;
    let auth_mode = bitrix.auth().map(|auth| auth.mode()).unwrap_or("unconfigured");

    let lines = vec![
        "effective config (source precedence: env > file > default):".to_string(),
        format!("- bitrix.auth_mode = {auth_mode}"),
        sources.line(
            "bitrix.webhook_url",
            "BITRIX24_WEBHOOK_URL",
            &redact_url(bitrix.webhook_url.as_ref()),
        ),
        sources.line(
            "bitrix.access_token",
            "BITRIX24_ACCESS_TOKEN",
            if bitrix.access_token.is_some() { "<redacted>" } else { "<unset>" },
        ),
        sources.line(
            "bitrix.portal_url",
            "BITRIX24_PORTAL_URL",
            bitrix.portal_url.as_deref().unwrap_or("<unset>"),
        ),
        sources.line(
            "bitrix.requests_per_second",
            "BITRIX24_REQUESTS_PER_SECOND",
            &bitrix.requests_per_second.to_string(),
        ),
        sources.line(
            "bitrix.request_pool_size",
            "BITRIX24_REQUEST_POOL_SIZE",
            &bitrix.request_pool_size.to_string(),
        ),
        sources.line(
            "bitrix.respect_velocity_policy",
            "BITRIX24_RESPECT_VELOCITY_POLICY",
            &bitrix.respect_velocity_policy.to_string(),
        ),
        sources.line("bitrix.ssl_verify", "BITRIX24_SSL_VERIFY", &bitrix.ssl_verify.to_string()),
        sources.line(
            "bitrix.timeout_secs",
            "BITRIX24_TIMEOUT_SECS",
            &bitrix.timeout_secs.to_string(),
        ),
        sources.line("bitrix.max_retries", "BITRIX24_MAX_RETRIES", &bitrix.max_retries.to_string()),
        sources.line("server.name", "MCP_SERVER_NAME", &server.name),
        sources.line("server.version", "MCP_SERVER_VERSION", &server.version),
        sources.line("server.transport", "MCP_TRANSPORT", server.transport.as_str()),
        sources.line("server.host", "MCP_HOST", &server.host),
        sources.line("server.port", "MCP_PORT", &server.port.to_string()),
        sources.line("logging.level", "MCP_LOG_LEVEL", &config.logging.level),
        sources.line("logging.format", "MCP_LOG_FORMAT", &format!("{:?}", config.logging.format)),
    ];

    lines.join("\n")
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from(NESTED_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps scheme and host; the webhook path carries the credential.
fn redact_url(url: Option<&SecretString>) -> String {
    let Some(url) = url else {
        return "<unset>".to_string();
    };
    let url = url.expose_secret().trim();
    let Some((scheme, rest)) = url.split_once("://") else {
        return "<redacted>".to_string();
    };
    let host = rest.split('/').next().unwrap_or_default();
    if host.is_empty() {
        return "<redacted>".to_string();
    }
    format!("{scheme}://{host}/***")
}
