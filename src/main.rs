//! CLI entry point: run a scenario or a load test against a project
//! stored on disk and print (or save) the resulting report.
//!
//! An interactive terminal UI, diagram generation, or process-singleton
//! locking could layer on top of this, but this binary stays a thin driver
//! over the engines and [`loadcraft::repository::FileRepository`].

use clap::{Parser, Subcommand};
use loadcraft::load_engine::LoadEngine;
use loadcraft::report::Report;
use loadcraft::repository::{FileRepository, RepositoryPort};
use loadcraft::scenario_engine::ScenarioEngine;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "loadcraft", about = "Scripted HTTP scenario and load execution engine")]
struct Cli {
    /// Root directory containing project subdirectories.
    #[arg(long, default_value = "projects")]
    projects_root: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single scenario once and print/save the resulting report.
    RunScenario {
        project: String,
        scenario: String,
        /// Host name within the project's hosts.json to target.
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        save: bool,
    },
    /// Run a scenario's load configuration (or an override) repeatedly
    /// under a rate/concurrency envelope.
    RunLoad {
        project: String,
        scenario: String,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        save: bool,
    },
    /// List projects under the projects root.
    ListProjects,
    /// List scenarios within a project.
    ListScenarios { project: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let repo = FileRepository::new(&cli.projects_root);

    match cli.command {
        Command::ListProjects => {
            for project in repo.list_projects().await? {
                println!("{project}");
            }
        }
        Command::ListScenarios { project } => {
            for scenario in repo.list_scenarios(&project).await? {
                println!("{scenario}");
            }
        }
        Command::RunScenario { project, scenario, host, save } => {
            let mut scenario_def = repo.load_scenario(&project, &scenario).await?;
            seed_project_variables(&repo, &project, &mut scenario_def).await?;
            let host_config = resolve_host(&repo, &project, &scenario_def, host).await?;
            let engine = ScenarioEngine::new(host_config)?;

            info!(scenario = %scenario_def.name, "running scenario");
            let result = engine
                .execute_with_progress(&scenario_def, &mut |name, idx, total| {
                    info!(step = name, idx, total, "step progress");
                })
                .await;

            println!(
                "{} -> {:?} ({} total, {} success, {} failed, {} errors)",
                result.scenario_name, result.outcome, result.total, result.successful, result.failed, result.errors
            );

            if save {
                let report = Report::for_scenario(result, &project);
                let path = repo.save_report(&project, &report).await?;
                println!("report saved to {}", path.display());
            }
        }
        Command::RunLoad { project, scenario, host, save } => {
            let mut scenario_def = repo.load_scenario(&project, &scenario).await?;
            seed_project_variables(&repo, &project, &mut scenario_def).await?;
            let host_config = resolve_host(&repo, &project, &scenario_def, host).await?;
            let Some(load_config) = scenario_def.load.clone() else {
                error!(scenario = %scenario_def.name, "scenario has no load configuration");
                return Err("scenario has no `load` configuration".into());
            };

            let engine = ScenarioEngine::new(host_config)?;
            let load_engine = LoadEngine::new(engine);

            info!(scenario = %scenario_def.name, "running load test");
            let callback: Box<dyn FnMut(&loadcraft::model::LoadMetrics) + Send> =
                Box::new(|m| info!(elapsed = m.elapsed_seconds, tps = m.current_tps, in_flight = m.active_in_flight, "metrics tick"));
            let result = load_engine.execute(&scenario_def, &load_config, Some(callback)).await;

            println!(
                "{} -> {} total, {:.1}% success, avg tps {:.1}",
                result.test_name, result.total, result.success_rate, result.actual_avg_tps
            );

            if save {
                let report = Report::for_load(result, &project);
                let path = repo.save_report(&project, &report).await?;
                println!("report saved to {}", path.display());
            }
        }
    }

    Ok(())
}

/// Seeds `scenario.variables` with the project's `config/variables.json`
/// defaults, without overriding anything the scenario already sets —
/// project defaults fill gaps, the scenario's own bindings always win.
async fn seed_project_variables(
    repo: &FileRepository,
    project: &str,
    scenario: &mut loadcraft::model::Scenario,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let project_variables = repo.load_project_variables(project).await?;
    for (key, value) in project_variables {
        scenario.variables.entry(key).or_insert(value);
    }
    Ok(())
}

async fn resolve_host(
    repo: &FileRepository,
    project: &str,
    scenario: &loadcraft::model::Scenario,
    host_override: Option<String>,
) -> Result<loadcraft::model::HostConfig, Box<dyn std::error::Error + Send + Sync>> {
    let hosts = repo.load_hosts(project).await?;
    let host_name = host_override
        .or_else(|| scenario.host.clone())
        .unwrap_or_else(|| "default".to_string());

    hosts
        .get(&host_name)
        .cloned()
        .ok_or_else(|| format!("host '{host_name}' not found in project '{project}'").into())
}
