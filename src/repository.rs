//! `RepositoryPort`: the one I/O boundary the core engines demand, plus a
//! filesystem-backed reference implementation over a
//! `projects/<name>/{config,scenario,result}` layout.
//!
//! The trait is `async_trait`-based, the same pattern used elsewhere in
//! this crate for storage/network boundary traits.

use crate::errors::EngineError;
use crate::model::{HostConfig, Scenario};
use crate::report::Report;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Abstract read/write of scenarios, host configs, and reports. The core
/// engines never touch a filesystem directly — everything crosses this
/// boundary so a caller can back it with an embedded store, a remote API,
/// or (as here) plain files.
#[async_trait]
pub trait RepositoryPort: Send + Sync {
    async fn list_projects(&self) -> Result<Vec<String>, EngineError>;
    async fn load_hosts(&self, project: &str) -> Result<HashMap<String, HostConfig>, EngineError>;
    /// Project-wide variable defaults, seeded under a scenario's own
    /// `variables` before execution. Absent for repositories/projects that
    /// don't carry a `config/variables.json` — returns an empty map rather
    /// than erroring, since this is a pure enrichment over spec.md's model.
    async fn load_project_variables(&self, project: &str) -> Result<HashMap<String, serde_json::Value>, EngineError>;
    async fn list_scenarios(&self, project: &str) -> Result<Vec<String>, EngineError>;
    async fn load_scenario(&self, project: &str, name: &str) -> Result<Scenario, EngineError>;
    async fn save_scenario(&self, project: &str, name: &str, scenario: &Scenario) -> Result<(), EngineError>;
    async fn delete_scenario(&self, project: &str, name: &str) -> Result<(), EngineError>;
    async fn save_report(&self, project: &str, report: &Report) -> Result<PathBuf, EngineError>;
    async fn load_report(&self, path: &Path) -> Result<Report, EngineError>;
}

/// Reference implementation backed by a root directory of named project
/// subdirectories, each with `config/hosts.json`, `scenario/*.json`, and
/// `result/{scenarios,loadtests}/YYYYMMDD/*.json`.
pub struct FileRepository {
    root: PathBuf,
}

impl FileRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn project_dir(&self, project: &str) -> PathBuf {
        self.root.join(project)
    }

    fn hosts_path(&self, project: &str) -> PathBuf {
        self.project_dir(project).join("config").join("hosts.json")
    }

    fn variables_path(&self, project: &str) -> PathBuf {
        self.project_dir(project).join("config").join("variables.json")
    }

    fn scenario_path(&self, project: &str, name: &str) -> PathBuf {
        self.project_dir(project).join("scenario").join(format!("{name}.json"))
    }
}

#[async_trait]
impl RepositoryPort for FileRepository {
    async fn list_projects(&self) -> Result<Vec<String>, EngineError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut projects = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if !name.starts_with('.') {
                        projects.push(name.to_string());
                    }
                }
            }
        }
        projects.sort();
        Ok(projects)
    }

    async fn load_hosts(&self, project: &str) -> Result<HashMap<String, HostConfig>, EngineError> {
        let path = self.hosts_path(project);
        debug!(project, path = %path.display(), "loading host config");
        let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            warn!(project, path = %path.display(), "hosts.json not found or unreadable");
            EngineError::Io(e)
        })?;
        let hosts: HashMap<String, HostConfig> = serde_json::from_str(&text)?;
        Ok(hosts)
    }

    async fn load_project_variables(&self, project: &str) -> Result<HashMap<String, serde_json::Value>, EngineError> {
        let path = self.variables_path(project);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(EngineError::Io(e)),
        };
        debug!(project, path = %path.display(), "loading project variables");
        let variables: HashMap<String, serde_json::Value> = serde_json::from_str(&text)?;
        Ok(variables)
    }

    async fn list_scenarios(&self, project: &str) -> Result<Vec<String>, EngineError> {
        let dir = self.project_dir(project).join("scenario");
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = tokio::fs::read_dir(&dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn load_scenario(&self, project: &str, name: &str) -> Result<Scenario, EngineError> {
        let path = self.scenario_path(project, name);
        let text = tokio::fs::read_to_string(&path).await?;
        let scenario: Scenario = serde_json::from_str(&text)
            .map_err(|e| EngineError::Validation(format!("malformed scenario '{name}': {e}")))?;
        if scenario.steps.is_empty() {
            return Err(EngineError::Validation(format!("scenario '{name}' has no steps")));
        }
        Ok(scenario)
    }

    async fn save_scenario(&self, project: &str, name: &str, scenario: &Scenario) -> Result<(), EngineError> {
        let path = self.scenario_path(project, name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let text = serde_json::to_string_pretty(scenario)?;
        tokio::fs::write(&path, text).await?;
        Ok(())
    }

    async fn delete_scenario(&self, project: &str, name: &str) -> Result<(), EngineError> {
        let path = self.scenario_path(project, name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::Io(e)),
        }
    }

    async fn save_report(&self, project: &str, report: &Report) -> Result<PathBuf, EngineError> {
        let relative = report.relative_path();
        let path = self.project_dir(project).join(&relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let text = serde_json::to_string_pretty(report)?;
        tokio::fs::write(&path, text).await?;
        debug!(project, path = %path.display(), "saved report");
        Ok(path)
    }

    async fn load_report(&self, path: &Path) -> Result<Report, EngineError> {
        let text = tokio::fs::read_to_string(path).await?;
        let report: Report = serde_json::from_str(&text)?;
        Ok(report)
    }
}
