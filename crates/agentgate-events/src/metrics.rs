//! Metrics collector: counters, histograms, and gauges for queue depth,
//! run outcomes, and gate results, exported as Prometheus text and as a
//! JSON snapshot.

use agentgate_core::Result;
use prometheus::{
    CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};

const DURATION_BUCKETS: &[f64] = &[
    0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0,
];

pub struct MetricsCollector {
    registry: Registry,
    runs_started_total: prometheus::Counter,
    runs_completed_total: CounterVec,
    iterations_total: prometheus::Counter,
    phase_executions_total: CounterVec,
    run_duration_seconds: Histogram,
    iteration_duration_seconds: Histogram,
    phase_duration_seconds: HistogramVec,
    active_runs: Gauge,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let registry = Registry::new();

        let runs_started_total =
            prometheus::Counter::with_opts(Opts::new("runs_started_total", "runs admitted"))
                .unwrap();
        let runs_completed_total = CounterVec::new(
            Opts::new("runs_completed_total", "runs reaching a terminal outcome"),
            &["result"],
        )
        .unwrap();
        let iterations_total =
            prometheus::Counter::with_opts(Opts::new("iterations_total", "build/verify cycles run"))
                .unwrap();
        let phase_executions_total = CounterVec::new(
            Opts::new("phase_executions_total", "per-phase execution count"),
            &["phase", "success"],
        )
        .unwrap();
        let run_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("run_duration_seconds", "end-to-end run duration")
                .buckets(DURATION_BUCKETS.to_vec()),
        )
        .unwrap();
        let iteration_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("iteration_duration_seconds", "per-iteration duration")
                .buckets(DURATION_BUCKETS.to_vec()),
        )
        .unwrap();
        let phase_duration_seconds = HistogramVec::new(
            HistogramOpts::new("phase_duration_seconds", "per-phase duration")
                .buckets(DURATION_BUCKETS.to_vec()),
            &["phase"],
        )
        .unwrap();
        let active_runs = Gauge::with_opts(Opts::new("active_runs", "currently running work orders")).unwrap();

        registry
            .register(Box::new(runs_started_total.clone()))
            .unwrap();
        registry
            .register(Box::new(runs_completed_total.clone()))
            .unwrap();
        registry
            .register(Box::new(iterations_total.clone()))
            .unwrap();
        registry
            .register(Box::new(phase_executions_total.clone()))
            .unwrap();
        registry
            .register(Box::new(run_duration_seconds.clone()))
            .unwrap();
        registry
            .register(Box::new(iteration_duration_seconds.clone()))
            .unwrap();
        registry
            .register(Box::new(phase_duration_seconds.clone()))
            .unwrap();
        registry.register(Box::new(active_runs.clone())).unwrap();

        Self {
            registry,
            runs_started_total,
            runs_completed_total,
            iterations_total,
            phase_executions_total,
            run_duration_seconds,
            iteration_duration_seconds,
            phase_duration_seconds,
            active_runs,
        }
    }

    pub fn record_run_started(&self) {
        self.runs_started_total.inc();
        self.active_runs.inc();
    }

    pub fn record_run_completed(&self, result: &str, duration_seconds: f64) {
        self.runs_completed_total.with_label_values(&[result]).inc();
        self.run_duration_seconds.observe(duration_seconds);
        self.active_runs.dec();
    }

    pub fn record_iteration(&self, duration_seconds: f64) {
        self.iterations_total.inc();
        self.iteration_duration_seconds.observe(duration_seconds);
    }

    pub fn record_phase(&self, phase: &str, success: bool, duration_seconds: f64) {
        self.phase_executions_total
            .with_label_values(&[phase, if success { "true" } else { "false" }])
            .inc();
        self.phase_duration_seconds
            .with_label_values(&[phase])
            .observe(duration_seconds);
    }

    pub fn export_text(&self) -> Result<String> {
        let families = self.registry.gather();
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&families, &mut buf)
            .map_err(|e| agentgate_core::Error::Internal(format!("metrics encode: {e}")))?;
        String::from_utf8(buf).map_err(|e| agentgate_core::Error::Internal(e.to_string()))
    }

    pub fn export_json(&self) -> serde_json::Value {
        serde_json::json!({
            "runs_started_total": self.runs_started_total.get(),
            "iterations_total": self.iterations_total.get(),
            "active_runs": self.active_runs.get(),
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_lifecycle_updates_counters_and_gauge() {
        let m = MetricsCollector::new();
        m.record_run_started();
        assert_eq!(m.active_runs.get(), 1.0);
        m.record_run_completed("converged", 12.5);
        assert_eq!(m.active_runs.get(), 0.0);
        assert_eq!(m.runs_completed_total.with_label_values(&["converged"]).get(), 1.0);
    }

    #[test]
    fn text_export_contains_metric_names() {
        let m = MetricsCollector::new();
        m.record_run_started();
        let text = m.export_text().unwrap();
        assert!(text.contains("runs_started_total"));
    }

    #[test]
    fn json_snapshot_reflects_state() {
        let m = MetricsCollector::new();
        m.record_iteration(1.0);
        let json = m.export_json();
        assert_eq!(json["iterations_total"], 1.0);
    }
}
