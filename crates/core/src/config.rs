use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "bitrix-mcp.toml";
pub const NESTED_CONFIG_FILE: &str = "config/bitrix-mcp.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bitrix: BitrixConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct BitrixConfig {
    pub webhook_url: Option<SecretString>,
    pub access_token: Option<SecretString>,
    pub portal_url: Option<String>,
    pub requests_per_second: f64,
    pub request_pool_size: u32,
    pub respect_velocity_policy: bool,
    pub ssl_verify: bool,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub name: String,
    pub version: String,
    pub description: String,
    pub transport: Transport,
    pub host: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transport {
    Stdio,
    StreamableHttp,
    Sse,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// Resolved credentials for the remote REST API.
#[derive(Clone, Debug)]
pub enum BitrixAuth {
    Webhook(SecretString),
    OAuth { access_token: SecretString, portal_url: String },
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub webhook_url: Option<String>,
    pub access_token: Option<String>,
    pub portal_url: Option<String>,
    pub transport: Option<Transport>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bitrix: BitrixConfig {
                webhook_url: None,
                access_token: None,
                portal_url: None,
                requests_per_second: 2.0,
                request_pool_size: 50,
                respect_velocity_policy: true,
                ssl_verify: true,
                timeout_secs: 30,
                max_retries: 3,
            },
            server: ServerConfig {
                name: "bitrix24-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: "Model Context Protocol server for Bitrix24 integration".to_string(),
                transport: Transport::Stdio,
                host: "localhost".to_string(),
                port: 8000,
                graceful_shutdown_secs: 10,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl Transport {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::StreamableHttp => "streamable-http",
            Self::Sse => "sse",
        }
    }

    pub fn is_http(self) -> bool {
        !matches!(self, Self::Stdio)
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Transport {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(Self::Stdio),
            "streamable-http" | "http" => Ok(Self::StreamableHttp),
            "sse" => Ok(Self::Sse),
            other => Err(ConfigError::Validation(format!(
                "unsupported transport `{other}` (expected stdio|streamable-http|sse)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl BitrixConfig {
    /// Webhook credentials take precedence over an OAuth token when both are set.
    pub fn auth(&self) -> Result<BitrixAuth, ConfigError> {
        if let Some(webhook_url) = non_blank_secret(self.webhook_url.as_ref()) {
            return Ok(BitrixAuth::Webhook(webhook_url));
        }

        let access_token = non_blank_secret(self.access_token.as_ref());
        let portal_url = self.portal_url.as_ref().filter(|value| !value.trim().is_empty());
        match (access_token, portal_url) {
            (Some(access_token), Some(portal_url)) => {
                Ok(BitrixAuth::OAuth { access_token, portal_url: portal_url.clone() })
            }
            _ => Err(ConfigError::Validation(
                "either bitrix.webhook_url (BITRIX24_WEBHOOK_URL) or both bitrix.access_token \
                 (BITRIX24_ACCESS_TOKEN) and bitrix.portal_url (BITRIX24_PORTAL_URL) must be provided"
                    .to_string(),
            )),
        }
    }
}

fn non_blank_secret(value: Option<&SecretString>) -> Option<SecretString> {
    value.filter(|secret| !secret.expose_secret().trim().is_empty()).cloned()
}

impl BitrixAuth {
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Webhook(_) => "webhook",
            Self::OAuth { .. } => "oauth",
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(bitrix) = patch.bitrix {
            if let Some(webhook_url) = bitrix.webhook_url {
                self.bitrix.webhook_url = Some(secret_value(webhook_url));
            }
            if let Some(access_token) = bitrix.access_token {
                self.bitrix.access_token = Some(secret_value(access_token));
            }
            if let Some(portal_url) = bitrix.portal_url {
                self.bitrix.portal_url = Some(portal_url);
            }
            if let Some(requests_per_second) = bitrix.requests_per_second {
                self.bitrix.requests_per_second = requests_per_second;
            }
            if let Some(request_pool_size) = bitrix.request_pool_size {
                self.bitrix.request_pool_size = request_pool_size;
            }
            if let Some(respect_velocity_policy) = bitrix.respect_velocity_policy {
                self.bitrix.respect_velocity_policy = respect_velocity_policy;
            }
            if let Some(ssl_verify) = bitrix.ssl_verify {
                self.bitrix.ssl_verify = ssl_verify;
            }
            if let Some(timeout_secs) = bitrix.timeout_secs {
                self.bitrix.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = bitrix.max_retries {
                self.bitrix.max_retries = max_retries;
            }
        }

        if let Some(server) = patch.server {
            if let Some(name) = server.name {
                self.server.name = name;
            }
            if let Some(version) = server.version {
                self.server.version = version;
            }
            if let Some(description) = server.description {
                self.server.description = description;
            }
            if let Some(transport) = server.transport {
                self.server.transport = transport;
            }
            if let Some(host) = server.host {
                self.server.host = host;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("BITRIX24_WEBHOOK_URL") {
            self.bitrix.webhook_url = Some(secret_value(value));
        }
        if let Some(value) = read_env("BITRIX24_ACCESS_TOKEN") {
            self.bitrix.access_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("BITRIX24_PORTAL_URL") {
            self.bitrix.portal_url = Some(value);
        }
        if let Some(value) = read_env("BITRIX24_REQUESTS_PER_SECOND") {
            self.bitrix.requests_per_second = parse_f64("BITRIX24_REQUESTS_PER_SECOND", &value)?;
        }
        if let Some(value) = read_env("BITRIX24_REQUEST_POOL_SIZE") {
            self.bitrix.request_pool_size = parse_u32("BITRIX24_REQUEST_POOL_SIZE", &value)?;
        }
        if let Some(value) = read_env("BITRIX24_RESPECT_VELOCITY_POLICY") {
            self.bitrix.respect_velocity_policy =
                parse_bool("BITRIX24_RESPECT_VELOCITY_POLICY", &value)?;
        }
        if let Some(value) = read_env("BITRIX24_SSL_VERIFY") {
            self.bitrix.ssl_verify = parse_bool("BITRIX24_SSL_VERIFY", &value)?;
        }
        if let Some(value) = read_env("BITRIX24_TIMEOUT_SECS") {
            self.bitrix.timeout_secs = parse_u64("BITRIX24_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("BITRIX24_MAX_RETRIES") {
            self.bitrix.max_retries = parse_u32("BITRIX24_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("MCP_SERVER_NAME") {
            self.server.name = value;
        }
        if let Some(value) = read_env("MCP_SERVER_VERSION") {
            self.server.version = value;
        }
        if let Some(value) = read_env("MCP_SERVER_DESCRIPTION") {
            self.server.description = value;
        }
        if let Some(value) = read_env("MCP_TRANSPORT") {
            self.server.transport = value.parse()?;
        }
        if let Some(value) = read_env("MCP_HOST") {
            self.server.host = value;
        }
        if let Some(value) = read_env("MCP_PORT") {
            self.server.port = parse_u16("MCP_PORT", &value)?;
        }

        if let Some(value) = read_env("MCP_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("MCP_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(webhook_url) = overrides.webhook_url {
            self.bitrix.webhook_url = Some(secret_value(webhook_url));
        }
        if let Some(access_token) = overrides.access_token {
            self.bitrix.access_token = Some(secret_value(access_token));
        }
        if let Some(portal_url) = overrides.portal_url {
            self.bitrix.portal_url = Some(portal_url);
        }
        if let Some(transport) = overrides.transport {
            self.server.transport = transport;
        }
        if let Some(host) = overrides.host {
            self.server.host = host;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_bitrix(&self.bitrix)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from(NESTED_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_bitrix(bitrix: &BitrixConfig) -> Result<(), ConfigError> {
    match bitrix.auth()? {
        BitrixAuth::Webhook(url) => {
            if !is_http_url(url.expose_secret()) {
                return Err(ConfigError::Validation(
                    "bitrix.webhook_url must start with http:// or https://".to_string(),
                ));
            }
        }
        BitrixAuth::OAuth { portal_url, .. } => {
            if !is_http_url(&portal_url) {
                return Err(ConfigError::Validation(
                    "bitrix.portal_url must start with http:// or https://".to_string(),
                ));
            }
        }
    }

    if !bitrix.requests_per_second.is_finite() || bitrix.requests_per_second <= 0.0 {
        return Err(ConfigError::Validation(
            "bitrix.requests_per_second must be greater than zero".to_string(),
        ));
    }

    if bitrix.request_pool_size == 0 {
        return Err(ConfigError::Validation(
            "bitrix.request_pool_size must be greater than zero".to_string(),
        ));
    }

    if bitrix.timeout_secs == 0 || bitrix.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "bitrix.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.name.trim().is_empty() {
        return Err(ConfigError::Validation("server.name must not be empty".to_string()));
    }

    if server.transport.is_http() && server.port == 0 {
        return Err(ConfigError::Validation(
            "server.port must be greater than zero for http transports".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "warning" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn is_http_url(value: &str) -> bool {
    let value = value.trim();
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.trim().parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.trim().to_ascii_lowercase().parse::<bool>().map_err(|_| {
        ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    bitrix: Option<BitrixPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct BitrixPatch {
    webhook_url: Option<String>,
    access_token: Option<String>,
    portal_url: Option<String>,
    requests_per_second: Option<f64>,
    request_pool_size: Option<u32>,
    respect_velocity_policy: Option<bool>,
    ssl_verify: Option<bool>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    name: Option<String>,
    version: Option<String>,
    description: Option<String>,
    transport: Option<Transport>,
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

/// Environment keys read by [`AppConfig::load`], in the order they are applied.
pub const ENV_KEYS: &[&str] = &[
    "BITRIX24_WEBHOOK_URL",
    "BITRIX24_ACCESS_TOKEN",
    "BITRIX24_PORTAL_URL",
    "BITRIX24_REQUESTS_PER_SECOND",
    "BITRIX24_REQUEST_POOL_SIZE",
    "BITRIX24_RESPECT_VELOCITY_POLICY",
    "BITRIX24_SSL_VERIFY",
    "BITRIX24_TIMEOUT_SECS",
    "BITRIX24_MAX_RETRIES",
    "MCP_SERVER_NAME",
    "MCP_SERVER_VERSION",
    "MCP_SERVER_DESCRIPTION",
    "MCP_TRANSPORT",
    "MCP_HOST",
    "MCP_PORT",
    "MCP_LOG_LEVEL",
    "MCP_LOG_FORMAT",
];

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, BitrixAuth, ConfigError, ConfigOverrides, LoadOptions, LogFormat, Transport,
        ENV_KEYS,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ENV_KEYS);
        env::set_var("TEST_BITRIX_WEBHOOK", "https://portal.example.com/rest/1/abc/");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("bitrix-mcp.toml");
            fs::write(
                &path,
                r#"
[bitrix]
webhook_url = "${TEST_BITRIX_WEBHOOK}"
requests_per_second = 1.5
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let webhook = config.bitrix.webhook_url.as_ref().map(|url| url.expose_secret());
            ensure(
                webhook == Some("https://portal.example.com/rest/1/abc/"),
                "webhook should be interpolated from the environment",
            )?;
            ensure(
                (config.bitrix.requests_per_second - 1.5).abs() < f64::EPSILON,
                "requests_per_second should come from the file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_BITRIX_WEBHOOK"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ENV_KEYS);

        env::set_var("BITRIX24_WEBHOOK_URL", "https://from-env.example.com/rest/1/x/");
        env::set_var("MCP_PORT", "9100");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("bitrix-mcp.toml");
            fs::write(
                &path,
                r#"
[bitrix]
webhook_url = "https://from-file.example.com/rest/1/y/"
request_pool_size = 10

[server]
port = 8100
transport = "streamable-http"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            let webhook = config.bitrix.webhook_url.as_ref().map(|url| url.expose_secret());
            ensure(
                webhook == Some("https://from-env.example.com/rest/1/x/"),
                "env webhook should win over the file",
            )?;
            ensure(config.bitrix.request_pool_size == 10, "file pool size should apply")?;
            ensure(config.server.port == 9100, "env port should win over the file")?;
            ensure(
                config.server.transport == Transport::StreamableHttp,
                "file transport should apply",
            )?;
            ensure(config.logging.level == "debug", "override log level should win")?;
            Ok(())
        })();

        clear_vars(ENV_KEYS);
        result
    }

    #[test]
    fn missing_credentials_fail_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ENV_KEYS);

        let error = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => return Err("expected validation failure without credentials".to_string()),
            Err(error) => error,
        };

        ensure(matches!(error, ConfigError::Validation(_)), "expected validation error")?;
        ensure(
            error.to_string().contains("BITRIX24_WEBHOOK_URL"),
            "error should name the webhook variable",
        )
    }

    #[test]
    fn oauth_requires_both_token_and_portal() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ENV_KEYS);
        env::set_var("BITRIX24_ACCESS_TOKEN", "token-only");

        let partial = AppConfig::load(LoadOptions::default());
        env::set_var("BITRIX24_PORTAL_URL", "https://portal.example.com");
        let complete = AppConfig::load(LoadOptions::default());
        clear_vars(ENV_KEYS);

        ensure(partial.is_err(), "token without portal should be rejected")?;
        let config = complete.map_err(|err| format!("config load failed: {err}"))?;
        let auth = config.bitrix.auth().map_err(|err| err.to_string())?;
        ensure(auth.mode() == "oauth", "token and portal should resolve to oauth")?;
        ensure(
            matches!(auth, BitrixAuth::OAuth { ref portal_url, .. } if portal_url == "https://portal.example.com"),
            "portal url should be carried through",
        )
    }

    #[test]
    fn webhook_wins_over_oauth_when_both_present() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ENV_KEYS);

        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                webhook_url: Some("https://portal.example.com/rest/1/abc/".to_string()),
                access_token: Some("token".to_string()),
                portal_url: Some("https://portal.example.com".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .map_err(|err| format!("config load failed: {err}"))?;

        let auth = config.bitrix.auth().map_err(|err| err.to_string())?;
        ensure(auth.mode() == "webhook", "webhook should take precedence")
    }

    #[test]
    fn env_overrides_reject_malformed_numbers() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ENV_KEYS);
        env::set_var("BITRIX24_WEBHOOK_URL", "https://portal.example.com/rest/1/abc/");
        env::set_var("BITRIX24_REQUEST_POOL_SIZE", "many");

        let result = AppConfig::load(LoadOptions::default());
        clear_vars(ENV_KEYS);

        ensure(
            matches!(
                result,
                Err(ConfigError::InvalidEnvOverride { ref key, .. }) if key == "BITRIX24_REQUEST_POOL_SIZE"
            ),
            "malformed pool size should be reported with its key",
        )
    }

    #[test]
    fn logging_and_transport_env_values_are_parsed() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ENV_KEYS);
        env::set_var("BITRIX24_WEBHOOK_URL", "https://portal.example.com/rest/1/abc/");
        env::set_var("MCP_LOG_FORMAT", "json");
        env::set_var("MCP_TRANSPORT", "sse");
        env::set_var("BITRIX24_RESPECT_VELOCITY_POLICY", "FALSE");

        let result = AppConfig::load(LoadOptions::default());
        clear_vars(ENV_KEYS);

        let config = result.map_err(|err| format!("config load failed: {err}"))?;
        ensure(matches!(config.logging.format, LogFormat::Json), "json log format expected")?;
        ensure(config.server.transport == Transport::Sse, "sse transport expected")?;
        ensure(!config.bitrix.respect_velocity_policy, "velocity policy should be disabled")
    }

    #[test]
    fn zero_rate_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ENV_KEYS);
        env::set_var("BITRIX24_WEBHOOK_URL", "https://portal.example.com/rest/1/abc/");
        env::set_var("BITRIX24_REQUESTS_PER_SECOND", "0");

        let result = AppConfig::load(LoadOptions::default());
        clear_vars(ENV_KEYS);

        let message = match result {
            Ok(_) => return Err("zero requests_per_second should be rejected".to_string()),
            Err(error) => error.to_string(),
        };
        ensure(message.contains("requests_per_second"), "error should name the field")
    }
}
