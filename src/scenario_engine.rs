//! Orchestrates a scenario's ordered steps: substitution, dispatch, retry,
//! assertion, extraction, and skip-on-failure continuation.
//!
//! One `ScenarioEngine` is bound to a single `HostConfig` for its lifetime
//! (mirroring `HttpClient`); `LoadEngine` constructs a fresh variable
//! context per virtual request but can share the engine itself since
//! `execute` takes no `&mut self`.

use crate::assertions::run_assertions;
use crate::errors::EngineError;
use crate::field_path::{extraction_tree, resolve};
use crate::http_client::HttpClient;
use crate::model::{
    AssertionRecord, HostConfig, Outcome, Scenario, ScenarioResult, Step, StepResult,
};
use crate::substitution::{substitute_str, substitute_value};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Callback invoked once per step, before the first attempt is dispatched.
/// `(step_name, 1-based index, total steps)`.
pub type ProgressCallback<'a> = dyn FnMut(&str, usize, usize) + Send + 'a;

const RETRY_BACKOFF: Duration = Duration::from_secs(1);

pub struct ScenarioEngine {
    http: HttpClient,
    host: HostConfig,
}

impl ScenarioEngine {
    pub fn new(host: HostConfig) -> Result<Self, EngineError> {
        let http = HttpClient::new(host.verify_ssl)?;
        Ok(Self { http, host })
    }

    /// Run `scenario` to completion with no progress reporting.
    pub async fn execute(&self, scenario: &Scenario) -> ScenarioResult {
        self.execute_with_progress(scenario, &mut |_, _, _| {}).await
    }

    /// Run `scenario`, invoking `progress` before each step's first attempt.
    pub async fn execute_with_progress(
        &self,
        scenario: &Scenario,
        progress: &mut ProgressCallback<'_>,
    ) -> ScenarioResult {
        let start_time = chrono::Utc::now();
        let start_instant = Instant::now();
        let mut vars = scenario.variables.clone();
        let mut steps = Vec::with_capacity(scenario.steps.len());

        info!(scenario = %scenario.name, steps = scenario.steps.len(), "starting scenario");

        let total = scenario.steps.len();
        for (idx, step) in scenario.steps.iter().enumerate() {
            progress(&step.name, idx + 1, total);

            let result = self.run_step_with_retry(step, &vars).await;

            if result.outcome == Outcome::Success {
                for (name, value) in &result.extracted_variables {
                    vars.insert(name.clone(), value.clone());
                }
            }

            let terminate = matches!(result.outcome, Outcome::Failure | Outcome::Error) && !step.skip_on_failure;
            steps.push(result);

            if terminate {
                warn!(scenario = %scenario.name, step = %step.name, "scenario terminated, remaining steps not executed");
                break;
            }
        }

        let end_time = chrono::Utc::now();
        let duration_seconds = start_instant.elapsed().as_secs_f64();

        let successful = steps.iter().filter(|s| s.outcome == Outcome::Success).count();
        let failed = steps.iter().filter(|s| s.outcome == Outcome::Failure).count();
        let errors = steps.iter().filter(|s| s.outcome == Outcome::Error).count();
        let non_skipped_all_success = steps
            .iter()
            .filter(|s| s.outcome != Outcome::Skipped)
            .all(|s| s.outcome == Outcome::Success);

        let outcome = if non_skipped_all_success {
            Outcome::Success
        } else if errors == 0 {
            Outcome::Failure
        } else {
            Outcome::Error
        };

        info!(scenario = %scenario.name, ?outcome, successful, failed, errors, "scenario finished");

        ScenarioResult {
            scenario_name: scenario.name.clone(),
            outcome,
            start_time,
            end_time,
            duration_seconds,
            steps,
            variables: vars,
            total: successful + failed + errors,
            successful,
            failed,
            errors,
        }
    }

    async fn run_step_with_retry(&self, step: &Step, vars: &HashMap<String, Value>) -> StepResult {
        let max_attempts = step.retry + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let (result, retryable) = self.run_one_attempt(step, vars).await;

            let should_retry = result.outcome == Outcome::Error && retryable && attempt < max_attempts;
            if !should_retry {
                return result;
            }

            debug!(step = %step.name, attempt, max_attempts, "attempt errored, backing off before retry");
            tokio::time::sleep(RETRY_BACKOFF).await;
        }
    }

    /// Runs a single attempt. The `bool` alongside the result is whether a
    /// transport-level failure is eligible for retry per
    /// [`EngineError::is_retryable`] — a malformed-header `Validation`
    /// error, for instance, collapses to the same `Outcome::Error` but
    /// should not be retried, since retrying it can never succeed.
    async fn run_one_attempt(&self, step: &Step, vars: &HashMap<String, Value>) -> (StepResult, bool) {
        let resolved_path = substitute_str(&step.path, vars);
        let resolved_url = format!("{}{}", self.host.base_url_trimmed(), resolved_path);

        let mut headers: HashMap<String, String> = self.host.headers.clone();
        for (k, v) in &step.headers {
            headers.insert(k.clone(), substitute_str(v, vars));
        }

        let query_params: HashMap<String, Value> = step
            .query_params
            .iter()
            .map(|(k, v)| (k.clone(), substitute_value(v, vars)))
            .collect();

        let request_body = step.body.as_ref().map(|b| substitute_value(b, vars));

        let timeout = Duration::from_secs(step.timeout.unwrap_or(self.host.timeout));

        if step.delay_before > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(step.delay_before)).await;
        }

        let dispatch_start = Instant::now();
        let outcome_result = self
            .http
            .execute(
                step.method,
                self.host.base_url_trimmed(),
                &resolved_path,
                &headers,
                &query_params,
                request_body.as_ref(),
                timeout,
            )
            .await;
        let response_time_ms = dispatch_start.elapsed().as_secs_f64() * 1000.0;

        if step.delay_after > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(step.delay_after)).await;
        }

        let timestamp = chrono::Utc::now();

        match outcome_result {
            Ok(response) => {
                // Assertion expected values are never templated — only
                // path/headers/query/body are. Substitution shapes the
                // request; assertions validate against the step as written.
                let batch = run_assertions(&step.assertions, response.status, response.body.as_ref());
                let outcome = if batch.all_passed() {
                    Outcome::Success
                } else {
                    Outcome::Failure
                };

                let extracted_variables = if outcome == Outcome::Success {
                    extract(&step.extract, response.body.as_ref())
                } else {
                    HashMap::new()
                };

                if outcome == Outcome::Failure {
                    warn!(step = %step.name, status = response.status, "assertion failure");
                } else {
                    debug!(step = %step.name, status = response.status, response_time_ms, "step succeeded");
                }

                let step_result = StepResult {
                    step_name: step.name.clone(),
                    method: step.method,
                    url: resolved_url,
                    outcome,
                    status_code: Some(response.status),
                    response_time_ms,
                    request_headers: headers,
                    request_body,
                    response_headers: response.headers,
                    response_body: response.body,
                    assertion_results: batch.records,
                    extracted_variables,
                    error_message: None,
                    timestamp,
                };
                (step_result, false)
            }
            Err(err) => {
                error!(step = %step.name, error = %err, "request attempt failed");
                let retryable = err.is_retryable();
                let step_result = StepResult {
                    step_name: step.name.clone(),
                    method: step.method,
                    url: resolved_url,
                    outcome: Outcome::Error,
                    status_code: None,
                    response_time_ms,
                    request_headers: headers,
                    request_body,
                    response_headers: HashMap::new(),
                    response_body: None,
                    assertion_results: Vec::<AssertionRecord>::new(),
                    extracted_variables: HashMap::new(),
                    error_message: Some(err.to_string()),
                    timestamp,
                };
                (step_result, retryable)
            }
        }
    }
}

fn extract(extract_map: &HashMap<String, String>, body: Option<&Value>) -> HashMap<String, Value> {
    let tree = extraction_tree(body);
    extract_map
        .iter()
        .filter_map(|(name, path)| resolve(&tree, path).map(|v| (name.clone(), v.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssertOperator, Assertion, HttpMethod};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn host(base_url: String) -> HostConfig {
        HostConfig {
            base_url,
            timeout: 5,
            headers: HashMap::new(),
            verify_ssl: true,
            auth: None,
        }
    }

    fn step(name: &str, method: HttpMethod, path: &str) -> Step {
        Step {
            name: name.to_string(),
            method,
            path: path.to_string(),
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
        }
    }

    #[tokio::test]
    async fn s1_single_get_with_status_assertion() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let mut s = step("health", HttpMethod::Get, "/health");
        s.assertions.push(Assertion {
            field: "status".to_string(),
            operator: AssertOperator::Eq,
            value: Some(serde_json::json!(200)),
            message: None,
        });

        let scenario = Scenario {
            name: "S1".to_string(),
            description: None,
            host: None,
            variables: HashMap::new(),
            steps: vec![s],
            load: None,
            tags: vec![],
        };

        let engine = ScenarioEngine::new(host(server.uri())).unwrap();
        let result = engine.execute(&scenario).await;

        assert_eq!(result.outcome, Outcome::Success);
        assert_eq!(result.total, 1);
        assert_eq!(result.successful, 1);
        assert_eq!(result.failed, 0);
        assert_eq!(result.errors, 0);
        assert_eq!(result.steps[0].outcome, Outcome::Success);
    }

    #[tokio::test]
    async fn s2_variable_extraction_and_chaining() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 42})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 42})))
            .mount(&server)
            .await;

        let mut create = step("create", HttpMethod::Post, "/users");
        create.body = Some(serde_json::json!({"name": "a"}));
        create.extract.insert("user_id".to_string(), "body.id".to_string());

        // The path is substituted with the extracted variable; the mock
        // only matches `/users/42`, so this step only succeeds if chaining
        // worked. Assertion expected values are never templated, so the
        // check here is on the untouched response field.
        let mut fetch = step("fetch", HttpMethod::Get, "/users/{{user_id}}");
        fetch.assertions.push(Assertion {
            field: "body.id".to_string(),
            operator: AssertOperator::Eq,
            value: Some(serde_json::json!(42)),
            message: None,
        });

        let scenario = Scenario {
            name: "S2".to_string(),
            description: None,
            host: None,
            variables: HashMap::new(),
            steps: vec![create, fetch],
            load: None,
            tags: vec![],
        };

        let engine = ScenarioEngine::new(host(server.uri())).unwrap();
        let result = engine.execute(&scenario).await;

        assert_eq!(result.outcome, Outcome::Success);
        assert_eq!(result.variables.get("user_id"), Some(&serde_json::json!(42)));
    }

    #[tokio::test]
    async fn s3_assertion_failure_is_not_retried() {
        let server = MockServer::start().await;
        let hits = Arc::new(AtomicUsize::new(0));
        Mock::given(method("GET"))
            .and(path("/x"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": false})))
            .mount(&server)
            .await;

        let mut s = step("x", HttpMethod::Get, "/x");
        s.retry = 3;
        s.assertions = vec![
            Assertion {
                field: "status".to_string(),
                operator: AssertOperator::Eq,
                value: Some(serde_json::json!(200)),
                message: None,
            },
            Assertion {
                field: "body.ok".to_string(),
                operator: AssertOperator::Eq,
                value: Some(serde_json::json!(true)),
                message: None,
            },
        ];

        let scenario = Scenario {
            name: "S3".to_string(),
            description: None,
            host: None,
            variables: HashMap::new(),
            steps: vec![s],
            load: None,
            tags: vec![],
        };

        let engine = ScenarioEngine::new(host(server.uri())).unwrap();
        let result = engine.execute(&scenario).await;
        let _ = hits;

        assert_eq!(result.steps.len(), 1);
        assert_eq!(result.steps[0].outcome, Outcome::Failure);
        let passed = result.steps[0].assertion_results.iter().filter(|r| r.passed).count();
        let failed = result.steps[0].assertion_results.iter().filter(|r| !r.passed).count();
        assert_eq!(passed, 1);
        assert_eq!(failed, 1);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn s5_skip_on_failure_continues_remaining_steps() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/one"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/two"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/three"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let mut one = step("one", HttpMethod::Get, "/one");
        one.assertions.push(Assertion {
            field: "status".to_string(),
            operator: AssertOperator::Eq,
            value: Some(serde_json::json!(200)),
            message: None,
        });

        let mut two = step("two", HttpMethod::Get, "/two");
        two.skip_on_failure = true;
        two.assertions.push(Assertion {
            field: "status".to_string(),
            operator: AssertOperator::Eq,
            value: Some(serde_json::json!(200)),
            message: None,
        });

        let mut three = step("three", HttpMethod::Get, "/three");
        three.assertions.push(Assertion {
            field: "status".to_string(),
            operator: AssertOperator::Eq,
            value: Some(serde_json::json!(200)),
            message: None,
        });

        let scenario = Scenario {
            name: "S5".to_string(),
            description: None,
            host: None,
            variables: HashMap::new(),
            steps: vec![one, two, three],
            load: None,
            tags: vec![],
        };

        let engine = ScenarioEngine::new(host(server.uri())).unwrap();
        let result = engine.execute(&scenario).await;

        assert_eq!(result.steps.len(), 3);
        assert_eq!(result.outcome, Outcome::Failure);
        assert_eq!(result.successful, 2);
        assert_eq!(result.failed, 1);
    }

    #[tokio::test]
    async fn retries_exhausted_on_persistent_transport_error() {
        let mut s = step("flaky", HttpMethod::Get, "/flaky");
        s.retry = 2;

        let engine = ScenarioEngine::new(host("http://127.0.0.1:1".to_string())).unwrap();
        let (result, retryable) = engine.run_one_attempt(&s, &HashMap::new()).await;
        assert_eq!(result.outcome, Outcome::Error);
        assert!(retryable, "connection refused is a transport error, not a validation failure");

        let started = Instant::now();
        let final_result = engine.run_step_with_retry(&s, &HashMap::new()).await;
        assert_eq!(final_result.outcome, Outcome::Error);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn malformed_header_validation_error_is_not_retried() {
        let mut s = step("bad-header", HttpMethod::Get, "/anything");
        s.retry = 3;
        s.headers.insert("x-bad".to_string(), "line1\nline2".to_string());

        let engine = ScenarioEngine::new(host("http://127.0.0.1:1".to_string())).unwrap();
        let (attempt, retryable) = engine.run_one_attempt(&s, &HashMap::new()).await;
        assert_eq!(attempt.outcome, Outcome::Error);
        assert!(!retryable, "a malformed header can never succeed on retry");

        let started = Instant::now();
        let final_result = engine.run_step_with_retry(&s, &HashMap::new()).await;
        assert_eq!(final_result.outcome, Outcome::Error);
        assert!(
            started.elapsed() < Duration::from_millis(500),
            "a non-retryable error must return on the first attempt, with no backoff"
        );
    }

    #[tokio::test]
    async fn s4_transport_error_with_retry_then_success() {
        let server = MockServer::start().await;

        // First two attempts exceed the step's timeout (a timeout error,
        // classified and retried the same as a transport error); the third
        // mock has no delay and is only reached once the first two stop
        // matching, matching wiremock's mount-order/up_to_n_times fallthrough.
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(1500)))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let mut s = step("flaky", HttpMethod::Get, "/flaky");
        s.retry = 2;
        s.timeout = Some(1); // the u64-seconds timeout field's minimum granularity;
                              // the delayed mock exceeds it, the fast one doesn't
        s.assertions.push(Assertion {
            field: "status".to_string(),
            operator: AssertOperator::Eq,
            value: Some(serde_json::json!(200)),
            message: None,
        });

        let scenario = Scenario {
            name: "S4".to_string(),
            description: None,
            host: None,
            variables: HashMap::new(),
            steps: vec![s],
            load: None,
            tags: vec![],
        };

        let engine = ScenarioEngine::new(host(server.uri())).unwrap();
        let started = Instant::now();
        let result = engine.execute(&scenario).await;

        assert_eq!(result.outcome, Outcome::Success);
        assert_eq!(result.steps[0].outcome, Outcome::Success);
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }
}
