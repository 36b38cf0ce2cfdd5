//! Canonical report shapes produced by both execution modes.
//!
//! A `Report` always carries a `report_id` of the form
//! `scenario_<name>_<yyyymmdd_HHMMSS>` or `loadtest_<name>_<yyyymmdd_HHMMSS>`,
//! a `test_type` tag, and a `summary` map — one shape for both scenario and
//! load-test runs rather than two unrelated types, so
//! `RepositoryPort::save_report`/`load_report` have one thing to round-trip.

use crate::model::{LoadResult, ScenarioResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub report_id: String,
    pub test_type: String,
    pub project_name: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub scenario_results: Vec<ScenarioResult>,
    #[serde(default)]
    pub load_test_result: Option<LoadResult>,
    pub summary: HashMap<String, Value>,
}

impl Report {
    /// Wrap a single `ScenarioResult` as a `"scenario"` report.
    pub fn for_scenario(result: ScenarioResult, project_name: &str) -> Self {
        let created_at = chrono::Utc::now();
        let report_id = format!(
            "scenario_{}_{}",
            result.scenario_name,
            created_at.format("%Y%m%d_%H%M%S")
        );

        let mut summary = HashMap::new();
        summary.insert("scenario_name".to_string(), Value::String(result.scenario_name.clone()));
        summary.insert("status".to_string(), serde_json::to_value(result.outcome).unwrap());
        summary.insert("duration_seconds".to_string(), serde_json::json!(result.duration_seconds));
        summary.insert("total_steps".to_string(), serde_json::json!(result.steps.len()));
        summary.insert("successful_steps".to_string(), serde_json::json!(result.successful));
        summary.insert("failed_steps".to_string(), serde_json::json!(result.failed));
        summary.insert("error_steps".to_string(), serde_json::json!(result.errors));

        Self {
            report_id,
            test_type: "scenario".to_string(),
            project_name: project_name.to_string(),
            created_at,
            scenario_results: vec![result],
            load_test_result: None,
            summary,
        }
    }

    /// Wrap a single `LoadResult` as a `"load_test"` report.
    pub fn for_load(result: LoadResult, project_name: &str) -> Self {
        let created_at = chrono::Utc::now();
        let report_id = format!(
            "loadtest_{}_{}",
            result.test_name,
            created_at.format("%Y%m%d_%H%M%S")
        );

        let mut summary = HashMap::new();
        summary.insert("test_name".to_string(), Value::String(result.test_name.clone()));
        summary.insert("target_tps".to_string(), serde_json::json!(result.target_tps));
        summary.insert("actual_avg_tps".to_string(), serde_json::json!(round2(result.actual_avg_tps)));
        summary.insert("duration_seconds".to_string(), serde_json::json!(result.duration_seconds));
        summary.insert("total_requests".to_string(), serde_json::json!(result.total));
        summary.insert("successful_requests".to_string(), serde_json::json!(result.successful));
        summary.insert("failed_requests".to_string(), serde_json::json!(result.failed));
        summary.insert("error_requests".to_string(), serde_json::json!(result.errors));
        summary.insert("success_rate".to_string(), serde_json::json!(round2(result.success_rate)));

        Self {
            report_id,
            test_type: "load_test".to_string(),
            project_name: project_name.to_string(),
            created_at,
            scenario_results: vec![],
            load_test_result: Some(result),
            summary,
        }
    }

    /// Reports live under
    /// `…/result/{scenarios|loadtests}/YYYYMMDD/<report_id>.json`.
    pub fn relative_path(&self) -> String {
        let kind = if self.test_type == "scenario" { "scenarios" } else { "loadtests" };
        let date = self.created_at.format("%Y%m%d");
        format!("result/{kind}/{date}/{}.json", self.report_id)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Outcome;
    use std::collections::HashMap as Map;

    fn scenario_result() -> ScenarioResult {
        ScenarioResult {
            scenario_name: "Checkout".to_string(),
            outcome: Outcome::Success,
            start_time: chrono::Utc::now(),
            end_time: chrono::Utc::now(),
            duration_seconds: 1.5,
            steps: vec![],
            variables: Map::new(),
            total: 0,
            successful: 0,
            failed: 0,
            errors: 0,
        }
    }

    #[test]
    fn report_id_follows_scenario_naming_convention() {
        let report = Report::for_scenario(scenario_result(), "demo");
        assert!(report.report_id.starts_with("scenario_Checkout_"));
        assert_eq!(report.test_type, "scenario");
    }

    #[test]
    fn relative_path_organizes_by_kind_and_date() {
        let report = Report::for_scenario(scenario_result(), "demo");
        let date = report.created_at.format("%Y%m%d").to_string();
        assert_eq!(report.relative_path(), format!("result/scenarios/{date}/{}.json", report.report_id));
    }

    #[test]
    fn round_trips_through_json_preserving_report_id_and_counts() {
        let report = Report::for_scenario(scenario_result(), "demo");
        let json = serde_json::to_string(&report).unwrap();
        let back: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(back.report_id, report.report_id);
        assert_eq!(back.scenario_results.len(), 1);
    }

    #[test]
    fn status_code_histogram_keys_serialize_as_strings() {
        let mut status_code_distribution = Map::new();
        status_code_distribution.insert(200u16, 5u64);

        let load = LoadResult {
            test_name: "Soak".to_string(),
            start_time: chrono::Utc::now(),
            end_time: chrono::Utc::now(),
            duration_seconds: 10.0,
            target_tps: 50.0,
            actual_avg_tps: 48.0,
            total: 5,
            successful: 5,
            failed: 0,
            errors: 0,
            success_rate: 100.0,
            response_times_ms: vec![],
            status_code_distribution,
            error_distribution: Map::new(),
            metrics_timeline: vec![],
        };

        let report = Report::for_load(load, "demo");
        let json = serde_json::to_value(&report).unwrap();
        let dist = &json["load_test_result"]["status_code_distribution"];
        assert!(dist.get("200").is_some());
    }
}
