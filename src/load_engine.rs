//! Paces a scenario under a rate/concurrency envelope and aggregates
//! streaming metrics while requests complete asynchronously.
//!
//! Three cooperating activities share the test's lifetime: a generator that
//! paces dispatch against the ramp-up curve and caps concurrency by simply
//! dropping a tick when full; a worker per dispatched virtual request that
//! runs a full scenario and folds its outcome into shared aggregates; and a
//! sampler that snapshots those aggregates once a second. None of the three
//! hold a lock across an await point — the aggregate is a handful of atomics
//! for hot scalar counters plus a couple of short `std::sync::Mutex`
//! sections around the response time buffer and the distribution maps.

use crate::model::{Distribution, LoadConfig, LoadMetrics, LoadResult, Outcome, Scenario};
use crate::scenario_engine::ScenarioEngine;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

const SAMPLER_TICK: Duration = Duration::from_secs(1);
const DRAIN_DEADLINE: Duration = Duration::from_secs(30);
const DRAIN_POLL: Duration = Duration::from_millis(100);

/// Callback invoked once per sampler tick. Must not block — it runs inline
/// on the sampler's own task.
pub type MetricsCallback = dyn FnMut(&LoadMetrics) + Send;

#[derive(Default)]
struct Aggregate {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    errors: AtomicU64,
    in_flight: AtomicI64,
    response_times_ms: Mutex<Vec<f64>>,
    status_code_distribution: Mutex<HashMap<u16, u64>>,
    error_distribution: Mutex<HashMap<String, u64>>,
}

impl Aggregate {
    fn record_status(&self, code: u16) {
        let mut map = self.status_code_distribution.lock().unwrap();
        *map.entry(code).or_insert(0) += 1;
    }

    fn record_error(&self, message: &str) {
        let mut map = self.error_distribution.lock().unwrap();
        *map.entry(message.to_string()).or_insert(0) += 1;
    }

    fn record_response_time(&self, ms: f64) {
        self.response_times_ms.lock().unwrap().push(ms);
    }
}

pub struct LoadEngine {
    engine: Arc<ScenarioEngine>,
}

impl LoadEngine {
    pub fn new(engine: ScenarioEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    /// Run `scenario` under `config` for its full duration plus drain,
    /// invoking `callback` once per sampler tick.
    pub async fn execute(
        &self,
        scenario: &Scenario,
        config: &LoadConfig,
        mut callback: Option<Box<MetricsCallback>>,
    ) -> LoadResult {
        let start_time = chrono::Utc::now();
        let start_instant = Instant::now();
        let aggregate = Arc::new(Aggregate::default());
        let timeline: Arc<Mutex<Vec<LoadMetrics>>> = Arc::new(Mutex::new(Vec::new()));

        info!(
            test = %scenario.name,
            duration = config.duration_seconds,
            target_tps = config.target_tps,
            max_concurrent = config.max_concurrent,
            "starting load test"
        );

        let sampler_handle = {
            let aggregate = aggregate.clone();
            let timeline = timeline.clone();
            tokio::spawn(async move {
                run_sampler(aggregate, timeline, &mut callback, start_instant).await;
            })
        };

        run_generator(self.engine.clone(), scenario.clone(), config.clone(), aggregate.clone(), start_instant).await;

        let drain_start = Instant::now();
        while aggregate.in_flight.load(Ordering::SeqCst) > 0 && drain_start.elapsed() < DRAIN_DEADLINE {
            sleep(DRAIN_POLL).await;
        }
        if aggregate.in_flight.load(Ordering::SeqCst) > 0 {
            warn!(
                test = %scenario.name,
                in_flight = aggregate.in_flight.load(Ordering::SeqCst),
                "drain deadline elapsed with requests still in flight"
            );
        }

        // One last snapshot covering the drain window, then stop the sampler.
        {
            let snap = snapshot(&aggregate, start_instant.elapsed().as_secs_f64());
            timeline.lock().unwrap().push(snap);
        }
        sampler_handle.abort();

        let end_time = chrono::Utc::now();
        let duration_seconds = start_instant.elapsed().as_secs_f64();

        let total = aggregate.total.load(Ordering::SeqCst);
        let successful = aggregate.successful.load(Ordering::SeqCst);
        let failed = aggregate.failed.load(Ordering::SeqCst);
        let errors = aggregate.errors.load(Ordering::SeqCst);
        let actual_avg_tps = if duration_seconds > 0.0 { total as f64 / duration_seconds } else { 0.0 };
        let success_rate = if total > 0 { 100.0 * successful as f64 / total as f64 } else { 0.0 };

        info!(
            test = %scenario.name,
            total, successful, failed, errors, actual_avg_tps,
            "load test finished"
        );

        LoadResult {
            test_name: scenario.name.clone(),
            start_time,
            end_time,
            duration_seconds,
            target_tps: config.target_tps,
            actual_avg_tps,
            total,
            successful,
            failed,
            errors,
            success_rate,
            response_times_ms: aggregate.response_times_ms.lock().unwrap().clone(),
            status_code_distribution: aggregate.status_code_distribution.lock().unwrap().clone(),
            error_distribution: aggregate.error_distribution.lock().unwrap().clone(),
            metrics_timeline: timeline.lock().unwrap().clone(),
        }
    }
}

/// Instantaneous target TPS for the configured ramp-up curve.
fn instantaneous_tps(config: &LoadConfig, elapsed: f64) -> f64 {
    if config.ramp_up_seconds <= 0.0 || elapsed >= config.ramp_up_seconds {
        return config.target_tps;
    }
    let progress = elapsed / config.ramp_up_seconds;
    match config.distribution {
        Distribution::Constant => config.target_tps,
        Distribution::Linear => config.target_tps * progress,
        Distribution::Exponential => config.target_tps * progress * progress,
    }
}

async fn run_generator(
    engine: Arc<ScenarioEngine>,
    scenario: Scenario,
    config: LoadConfig,
    aggregate: Arc<Aggregate>,
    start_instant: Instant,
) {
    loop {
        let elapsed = start_instant.elapsed().as_secs_f64();
        if elapsed >= config.duration_seconds {
            break;
        }

        let current_tps = instantaneous_tps(&config, elapsed);
        let in_flight = aggregate.in_flight.load(Ordering::SeqCst);

        if in_flight < config.max_concurrent as i64 {
            aggregate.in_flight.fetch_add(1, Ordering::SeqCst);
            let engine = engine.clone();
            let scenario = scenario.clone();
            let aggregate = aggregate.clone();
            tokio::spawn(async move {
                run_worker(engine, scenario, aggregate).await;
            });
        } else {
            debug!(in_flight, max_concurrent = config.max_concurrent, "concurrency cap reached, dropping tick");
        }

        let interval = 1.0 / current_tps.max(1.0);
        sleep(Duration::from_secs_f64(interval)).await;
    }
}

async fn run_worker(engine: Arc<ScenarioEngine>, scenario: Scenario, aggregate: Arc<Aggregate>) {
    let result = engine.execute(&scenario).await;

    aggregate.total.fetch_add(1, Ordering::SeqCst);
    match result.outcome {
        Outcome::Success => {
            aggregate.successful.fetch_add(1, Ordering::SeqCst);
        }
        Outcome::Failure => {
            aggregate.failed.fetch_add(1, Ordering::SeqCst);
        }
        Outcome::Error | Outcome::Skipped => {
            aggregate.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    for step in &result.steps {
        if step.response_time_ms > 0.0 {
            aggregate.record_response_time(step.response_time_ms);
        }
        if let Some(code) = step.status_code {
            aggregate.record_status(code);
        }
        if let Some(message) = &step.error_message {
            aggregate.record_error(message);
        }
    }

    aggregate.in_flight.fetch_sub(1, Ordering::SeqCst);
}

async fn run_sampler(
    aggregate: Arc<Aggregate>,
    timeline: Arc<Mutex<Vec<LoadMetrics>>>,
    callback: &mut Option<Box<MetricsCallback>>,
    start_instant: Instant,
) {
    loop {
        sleep(SAMPLER_TICK).await;
        let snap = snapshot(&aggregate, start_instant.elapsed().as_secs_f64());
        if let Some(cb) = callback.as_mut() {
            cb(&snap);
        }
        timeline.lock().unwrap().push(snap);
    }
}

fn snapshot(aggregate: &Aggregate, elapsed_seconds: f64) -> LoadMetrics {
    let total = aggregate.total.load(Ordering::SeqCst);
    let successful = aggregate.successful.load(Ordering::SeqCst);
    let failed = aggregate.failed.load(Ordering::SeqCst);
    let errors = aggregate.errors.load(Ordering::SeqCst);
    let current_tps = if elapsed_seconds > 0.0 { total as f64 / elapsed_seconds } else { 0.0 };

    let mut sorted = aggregate.response_times_ms.lock().unwrap().clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let percentiles = Percentiles::from_sorted(&sorted);

    LoadMetrics {
        timestamp: chrono::Utc::now(),
        elapsed_seconds,
        total,
        successful,
        failed,
        errors,
        current_tps,
        avg_response_time_ms: percentiles.avg,
        min_response_time_ms: percentiles.min,
        max_response_time_ms: percentiles.max,
        p50_response_time_ms: percentiles.p50,
        p95_response_time_ms: percentiles.p95,
        p99_response_time_ms: percentiles.p99,
        active_in_flight: aggregate.in_flight.load(Ordering::SeqCst).max(0) as u64,
    }
}

struct Percentiles {
    avg: f64,
    min: f64,
    max: f64,
    p50: f64,
    p95: f64,
    p99: f64,
}

impl Percentiles {
    /// `sorted` must already be non-decreasing. Empty input yields all
    /// zeros. Indices are `floor(q * N)`, clamped to the last element.
    fn from_sorted(sorted: &[f64]) -> Self {
        if sorted.is_empty() {
            return Self { avg: 0.0, min: 0.0, max: 0.0, p50: 0.0, p95: 0.0, p99: 0.0 };
        }

        let n = sorted.len();
        let sum: f64 = sorted.iter().sum();
        let avg = sum / n as f64;
        let idx = |q: f64| -> usize { ((n as f64 * q) as usize).min(n - 1) };

        Self {
            avg,
            min: sorted[0],
            max: sorted[n - 1],
            p50: median(sorted),
            p95: sorted[idx(0.95)],
            p99: sorted[idx(0.99)],
        }
    }
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}
