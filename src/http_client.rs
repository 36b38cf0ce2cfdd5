//! Single-request HTTP execution: merge headers, encode the body, dispatch,
//! and classify the outcome into transport/timeout rather than letting a
//! `reqwest::Error` escape unclassified.
//!
//! Kept to one operation — [`HttpClient::execute`] — because everything
//! upstream of it (substitution, retry, assertion) belongs to
//! [`crate::scenario_engine`], not here.

use crate::errors::EngineError;
use crate::model::HttpMethod;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Result of a single dispatched request.
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
    pub elapsed_ms: f64,
}

/// Thin wrapper around a shared `reqwest::Client`.
///
/// One `HttpClient` is built per `HostConfig` (its TLS verification policy
/// is fixed at construction, matching `reqwest::ClientBuilder`'s own
/// one-shot build) and reused across every step and every virtual request
/// against that host.
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Build a client honoring `verify_ssl` from the owning `HostConfig`.
    pub fn new(verify_ssl: bool) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!verify_ssl)
            .build()
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    /// Issue one request. `base_url` has already had its trailing slash
    /// stripped by the caller; `path` is concatenated directly with no
    /// further normalization.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute(
        &self,
        method: HttpMethod,
        base_url: &str,
        path: &str,
        headers: &HashMap<String, String>,
        query_params: &HashMap<String, Value>,
        body: Option<&Value>,
        timeout: Duration,
    ) -> Result<HttpResponse, EngineError> {
        let url = format!("{}{}", base_url, path);

        let mut header_map = HeaderMap::new();
        for (key, value) in headers {
            let name = HeaderName::try_from(key.as_str())
                .map_err(|e| EngineError::Validation(format!("invalid header name {key}: {e}")))?;
            let val = HeaderValue::from_str(value)
                .map_err(|e| EngineError::Validation(format!("invalid header value for {key}: {e}")))?;
            header_map.insert(name, val);
        }

        let mut builder = self
            .client
            .request(method.as_reqwest(), &url)
            .headers(header_map)
            .timeout(timeout);

        if !query_params.is_empty() {
            let pairs: Vec<(String, String)> = query_params
                .iter()
                .map(|(k, v)| (k.clone(), value_as_query_string(v)))
                .collect();
            builder = builder.query(&pairs);
        }

        if let Some(b) = body {
            builder = builder.json(b);
        }

        debug!(method = %method, url = %url, "dispatching request");
        let start = Instant::now();
        let result = builder.send().await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let response = match result {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                warn!(url = %url, "request timed out after {:?}", timeout);
                return Err(EngineError::Timeout(timeout));
            }
            Err(e) => {
                warn!(url = %url, error = %e, "transport error");
                return Err(EngineError::Transport(e.to_string()));
            }
        };

        let status = response.status().as_u16();
        let response_headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();

        let text = response
            .text()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        let parsed_body = parse_body(&text);

        Ok(HttpResponse {
            status,
            headers: response_headers,
            body: parsed_body,
            elapsed_ms,
        })
    }
}

/// Parse JSON first; fall back to the raw text so assertions/extraction
/// always have *something* to resolve against.
fn parse_body(text: &str) -> Option<Value> {
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(text) {
        Ok(v) => Some(v),
        Err(_) => Some(Value::String(text.to_string())),
    }
}

fn value_as_query_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
