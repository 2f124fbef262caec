use std::time::{Duration, Instant};

use async_trait::async_trait;
use bitrix_mcp_core::config::{BitrixAuth, BitrixConfig};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::RemoteError;
use crate::retry::backoff_delay;
use crate::throttle::Throttle;
use crate::{BitrixApi, ListPage, ListRequest, Params};

/// Tuning knobs forwarded from `[bitrix]` configuration.
#[derive(Clone, Debug)]
pub struct ClientSettings {
    pub requests_per_second: f64,
    pub request_pool_size: usize,
    pub respect_velocity_policy: bool,
    pub ssl_verify: bool,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            requests_per_second: 2.0,
            request_pool_size: 50,
            respect_velocity_policy: true,
            ssl_verify: true,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

impl ClientSettings {
    pub fn from_config(config: &BitrixConfig) -> Self {
        Self {
            requests_per_second: config.requests_per_second,
            request_pool_size: config.request_pool_size as usize,
            respect_velocity_policy: config.respect_velocity_policy,
            ssl_verify: config.ssl_verify,
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
enum Endpoint {
    Webhook { base: SecretString },
    OAuth { base: String, access_token: SecretString },
}

impl Endpoint {
    fn url(&self, method: &str) -> String {
        let base = match self {
            Self::Webhook { base } => base.expose_secret().trim_end_matches('/').to_owned(),
            Self::OAuth { base, .. } => base.clone(),
        };
        format!("{base}/{method}.json")
    }

    fn body(&self, params: &Params) -> Params {
        let mut body = params.clone();
        if let Self::OAuth { access_token, .. } = self {
            body.insert("auth".to_owned(), Value::from(access_token.expose_secret()));
        }
        body
    }
}

/// Remote client speaking the Bitrix24 REST protocol over reqwest.
#[derive(Debug)]
pub struct HttpBitrixClient {
    http: reqwest::Client,
    endpoint: Endpoint,
    throttle: Throttle,
    max_retries: u32,
    retry_base_delay: Duration,
}

#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    next: Option<u64>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug)]
struct RemoteResponse {
    result: Value,
    next: Option<u64>,
    total: Option<u64>,
}

impl HttpBitrixClient {
    pub fn new(auth: BitrixAuth, settings: ClientSettings) -> Result<Self, RemoteError> {
        let endpoint = match auth {
            BitrixAuth::Webhook(base) => Endpoint::Webhook { base },
            BitrixAuth::OAuth { access_token, portal_url } => Endpoint::OAuth {
                base: format!("{}/rest", portal_url.trim_end_matches('/')),
                access_token,
            },
        };

        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .danger_accept_invalid_certs(!settings.ssl_verify)
            .build()?;

        Ok(Self {
            http,
            endpoint,
            throttle: Throttle::new(
                settings.request_pool_size,
                settings.requests_per_second,
                settings.respect_velocity_policy,
            ),
            max_retries: settings.max_retries,
            retry_base_delay: settings.retry_base_delay,
        })
    }

    pub fn from_config(config: &BitrixConfig) -> Result<Self, RemoteError> {
        let auth = config
            .auth()
            .map_err(|err| RemoteError::Transport(format!("client is not configured: {err}")))?;
        Self::new(auth, ClientSettings::from_config(config))
    }

    async fn request(&self, method: &str, params: &Params) -> Result<RemoteResponse, RemoteError> {
        let mut attempt = 0;
        loop {
            match self.send_once(method, params, attempt).await {
                Err(err) if err.is_rate_limited() && attempt < self.max_retries => {
                    let delay = backoff_delay(self.retry_base_delay, attempt);
                    warn!(
                        event_name = "bitrix.request.rate_limited",
                        method,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "remote rejected request velocity, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    async fn send_once(
        &self,
        method: &str,
        params: &Params,
        attempt: u32,
    ) -> Result<RemoteResponse, RemoteError> {
        let _permit = self.throttle.acquire().await?;
        let started = Instant::now();

        let response =
            self.http.post(self.endpoint.url(method)).json(&self.endpoint.body(params)).send().await;
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                let err = RemoteError::from(err);
                warn!(
                    event_name = "bitrix.request.failed",
                    method,
                    attempt,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %err,
                    "remote request failed in transit"
                );
                return Err(err);
            }
        };

        let status = response.status();
        let bytes = response.bytes().await?;
        debug!(
            event_name = "bitrix.request.completed",
            method,
            attempt,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "remote request completed"
        );

        let envelope: ResponseEnvelope = serde_json::from_slice(&bytes).map_err(|err| {
            if status.is_success() {
                RemoteError::Decode(err.to_string())
            } else {
                RemoteError::Api {
                    status: status.as_u16(),
                    code: status.canonical_reason().unwrap_or("HTTP_ERROR").to_owned(),
                    description: String::from_utf8_lossy(&bytes).chars().take(200).collect(),
                }
            }
        })?;

        if let Some(code) = envelope.error {
            return Err(RemoteError::Api {
                status: status.as_u16(),
                code,
                description: envelope.error_description.unwrap_or_default(),
            });
        }
        if !status.is_success() {
            return Err(RemoteError::Api {
                status: status.as_u16(),
                code: status.canonical_reason().unwrap_or("HTTP_ERROR").to_owned(),
                description: envelope.error_description.unwrap_or_default(),
            });
        }

        Ok(RemoteResponse {
            result: envelope.result.unwrap_or(Value::Null),
            next: envelope.next,
            total: envelope.total,
        })
    }
}

#[async_trait]
impl BitrixApi for HttpBitrixClient {
    async fn call(&self, method: &str, params: Params) -> Result<Value, RemoteError> {
        Ok(self.request(method, &params).await?.result)
    }

    async fn list(
        &self,
        method: &str,
        params: Params,
        request: ListRequest,
    ) -> Result<ListPage, RemoteError> {
        let mut params = params;
        let mut items = Vec::new();
        let mut offset = request.start;
        let mut total = None;

        loop {
            params.insert("start".to_owned(), Value::from(offset));
            let response = self.request(method, &params).await?;
            total = response.total.or(total);

            let page = list_items(response.result)?;
            let page_len = page.len() as u64;
            let wanted = request.remaining(items.len());
            if wanted < page_len {
                items.extend(page.into_iter().take(wanted as usize));
                return Ok(ListPage { items, total, next: Some(offset + wanted) });
            }
            items.extend(page);

            match response.next {
                Some(next) if next > offset && request.remaining(items.len()) > 0 => offset = next,
                next => return Ok(ListPage { items, total, next }),
            }
        }
    }
}

/// List results are either an array or an object wrapping one (`{"tasks": [...]}`).
fn list_items(result: Value) -> Result<Vec<Value>, RemoteError> {
    match result {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => unwrap_single_array(map),
        other => Err(RemoteError::Decode(format!("expected a list result, got {other}"))),
    }
}

fn unwrap_single_array(map: Map<String, Value>) -> Result<Vec<Value>, RemoteError> {
    let mut arrays = map.into_iter().filter_map(|(_, value)| match value {
        Value::Array(items) => Some(items),
        _ => None,
    });
    match (arrays.next(), arrays.next()) {
        (Some(items), None) => Ok(items),
        _ => Err(RemoteError::Decode("list result has no single record array".to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::list_items;
    use crate::RemoteError;

    #[test]
    fn nested_task_lists_are_unwrapped() {
        let items = list_items(json!({"tasks": [{"id": "1"}, {"id": "2"}]}));
        assert_eq!(items.map(|items| items.len()), Ok(2));
    }

    #[test]
    fn scalar_results_are_not_lists() {
        assert!(matches!(list_items(json!(true)), Err(RemoteError::Decode(_))));
        assert_eq!(list_items(json!(null)), Ok(Vec::new()));
    }
}
