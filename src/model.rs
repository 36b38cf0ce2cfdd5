//! Data model shared by scenario execution and load execution: hosts,
//! scenarios, steps, assertions, and the result/report shapes they produce.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A named HTTP target. Immutable for the lifetime of a test run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
    /// Opaque passthrough — the core never interprets this.
    #[serde(default)]
    pub auth: Option<Value>,
}

impl HostConfig {
    /// Base URL with exactly one trailing `/` stripped, matching the
    /// concatenation rule `HttpClient` uses to join base URL and path.
    pub fn base_url_trimmed(&self) -> &str {
        self.base_url.strip_suffix('/').unwrap_or(&self.base_url)
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_reqwest(&self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_reqwest())
    }
}

/// A single comparison against the response's `{status, body}` tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assertion {
    pub field: String,
    pub operator: AssertOperator,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertOperator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    Contains,
    NotContains,
    In,
    NotIn,
    Regex,
    Exists,
}

/// One ordered call within a `Scenario`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub method: HttpMethod,
    pub path: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub query_params: HashMap<String, Value>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub delay_before: f64,
    #[serde(default)]
    pub delay_after: f64,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
    #[serde(default)]
    pub extract: HashMap<String, String>,
    #[serde(default)]
    pub skip_on_failure: bool,
    #[serde(default)]
    pub retry: u32,
}

/// `{constant, linear, exponential}` ramp-up shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    #[default]
    Constant,
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub duration_seconds: f64,
    pub target_tps: f64,
    #[serde(default)]
    pub ramp_up_seconds: f64,
    pub max_concurrent: usize,
    #[serde(default)]
    pub distribution: Distribution,
}

/// An ordered sequence of steps sharing one variable scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub load: Option<LoadConfig>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Terminal classification of a step attempt or a whole scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    Error,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionRecord {
    pub field: String,
    pub operator: AssertOperator,
    pub passed: bool,
    pub actual: Value,
    pub expected: Option<Value>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_name: String,
    pub method: HttpMethod,
    pub url: String,
    pub outcome: Outcome,
    pub status_code: Option<u16>,
    pub response_time_ms: f64,
    pub request_headers: HashMap<String, String>,
    pub request_body: Option<Value>,
    pub response_headers: HashMap<String, String>,
    pub response_body: Option<Value>,
    pub assertion_results: Vec<AssertionRecord>,
    pub extracted_variables: HashMap<String, Value>,
    pub error_message: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_name: String,
    pub outcome: Outcome,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: chrono::DateTime<chrono::Utc>,
    pub duration_seconds: f64,
    pub steps: Vec<StepResult>,
    pub variables: HashMap<String, Value>,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadMetrics {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub elapsed_seconds: f64,
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub errors: u64,
    pub current_tps: f64,
    pub avg_response_time_ms: f64,
    pub min_response_time_ms: f64,
    pub max_response_time_ms: f64,
    pub p50_response_time_ms: f64,
    pub p95_response_time_ms: f64,
    pub p99_response_time_ms: f64,
    pub active_in_flight: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadResult {
    pub test_name: String,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: chrono::DateTime<chrono::Utc>,
    pub duration_seconds: f64,
    pub target_tps: f64,
    pub actual_avg_tps: f64,
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub errors: u64,
    pub success_rate: f64,
    pub response_times_ms: Vec<f64>,
    pub status_code_distribution: HashMap<u16, u64>,
    pub error_distribution: HashMap<String, u64>,
    pub metrics_timeline: Vec<LoadMetrics>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_strips_one_trailing_slash() {
        let host = HostConfig {
            base_url: "https://api.example.com/".to_string(),
            timeout: 30,
            headers: HashMap::new(),
            verify_ssl: true,
            auth: None,
        };
        assert_eq!(host.base_url_trimmed(), "https://api.example.com");
    }

    #[test]
    fn base_url_without_trailing_slash_is_unchanged() {
        let host = HostConfig {
            base_url: "https://api.example.com".to_string(),
            timeout: 30,
            headers: HashMap::new(),
            verify_ssl: true,
            auth: None,
        };
        assert_eq!(host.base_url_trimmed(), "https://api.example.com");
    }

    #[test]
    fn scenario_round_trips_through_json() {
        let scenario = Scenario {
            name: "Checkout".to_string(),
            description: None,
            host: Some("default".to_string()),
            variables: HashMap::new(),
            steps: vec![Step {
                name: "Health".to_string(),
                method: HttpMethod::Get,
                path: "/health".to_string(),
                headers: HashMap::new(),
                query_params: HashMap::new(),
                body: None,
                timeout: None,
                delay_before: 0.0,
                delay_after: 0.0,
                assertions: vec![],
                extract: HashMap::new(),
                skip_on_failure: false,
                retry: 0,
            }],
            load: None,
            tags: vec![],
        };

        let json = serde_json::to_string(&scenario).unwrap();
        let back: Scenario = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, scenario.name);
        assert_eq!(back.steps.len(), 1);
        assert_eq!(back.steps[0].path, "/health");
    }
}
