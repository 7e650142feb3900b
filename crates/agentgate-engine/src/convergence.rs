//! Convergence controller: the build -> snapshot -> verify -> feedback
//! loop that drives a single run to `converged`, `diverged`, or `stopped`.

use agentgate_core::{
    parse_duration_spec, Gate, GateAction, GateFailure, GateResult, Result, RunOutcome, Snapshot,
};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub struct BuildOutcome {
    pub success: bool,
    pub failures: Vec<GateFailure>,
}

/// Hooks the coordinator wires up per run: agent invocation, git
/// plumbing, gate dispatch, and feedback formatting.
#[async_trait]
pub trait ConvergenceCallbacks: Send + Sync {
    async fn on_build(&self, feedback: Option<&str>) -> Result<BuildOutcome>;
    async fn on_snapshot(&self) -> Result<Snapshot>;
    async fn on_gate_check(&self, snapshot: &Snapshot) -> Result<Vec<GateResult>>;
    async fn on_feedback(&self, failures: &[GateFailure]) -> String;
    async fn on_iteration_start(&self, _iteration: u32) {}
    async fn on_iteration_end(&self, _iteration: u32, _decision: &StrategyDecision) {}
}

#[derive(Clone, Debug)]
pub struct StrategyDecision {
    pub should_continue: bool,
    pub reason: String,
}

#[derive(Clone, Copy, Debug)]
pub struct IterationGateSummary {
    pub iteration: u32,
    pub pass_ratio: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trend {
    Improving,
    Regressing,
    Stagnant,
}

/// Advisory trend over the ratio of passing gates across history.
pub fn trend(history: &[IterationGateSummary]) -> Trend {
    if history.len() < 2 {
        return Trend::Stagnant;
    }
    let prev = history[history.len() - 2].pass_ratio;
    let last = history[history.len() - 1].pass_ratio;
    if last > prev {
        Trend::Improving
    } else if last < prev {
        Trend::Regressing
    } else {
        Trend::Stagnant
    }
}

/// Pluggable continuation policy consulted each iteration after gate checks
/// and limit checks pass. The default never stops early.
pub trait ConvergenceStrategy: Send + Sync {
    fn should_continue(&self, history: &[IterationGateSummary]) -> StrategyDecision;
}

pub struct AlwaysContinue;

impl ConvergenceStrategy for AlwaysContinue {
    fn should_continue(&self, _history: &[IterationGateSummary]) -> StrategyDecision {
        StrategyDecision {
            should_continue: true,
            reason: String::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConvergenceSpec {
    pub max_iterations: u32,
    pub max_wall_clock: String,
    pub gates: Vec<Gate>,
}

#[derive(Clone, Debug)]
pub struct ConvergenceOutcome {
    pub outcome: RunOutcome,
    pub reason: String,
    pub iterations: u32,
}

/// Cooperative external-stop signal: `request` records a reason, the
/// controller checks it at the top of each iteration.
#[derive(Default)]
pub struct StopSignal(Mutex<Option<String>>);

impl StopSignal {
    pub fn new() -> Self {
        Self(Mutex::new(None))
    }

    pub fn request(&self, reason: impl Into<String>) {
        *self.0.lock().unwrap() = Some(reason.into());
    }

    pub fn reason(&self) -> Option<String> {
        self.0.lock().unwrap().clone()
    }
}

pub struct ConvergenceController {
    strategy: Box<dyn ConvergenceStrategy>,
}

impl ConvergenceController {
    pub fn new(strategy: Box<dyn ConvergenceStrategy>) -> Self {
        Self { strategy }
    }

    pub async fn run(
        &self,
        spec: &ConvergenceSpec,
        callbacks: &dyn ConvergenceCallbacks,
        cancel: &CancellationToken,
        stop: &StopSignal,
    ) -> Result<ConvergenceOutcome> {
        let max_wall_clock = parse_duration_spec(&spec.max_wall_clock, Duration::from_secs(3600));
        let started = Instant::now();
        let mut feedback: Option<String> = None;
        let mut history: Vec<IterationGateSummary> = Vec::new();

        for i in 1..=spec.max_iterations {
            if cancel.is_cancelled() || stop.reason().is_some() {
                let reason = stop.reason().unwrap_or_else(|| "canceled".to_string());
                return Ok(ConvergenceOutcome {
                    outcome: RunOutcome::Stopped,
                    reason,
                    iterations: i.saturating_sub(1),
                });
            }

            callbacks.on_iteration_start(i).await;
            let build = match callbacks.on_build(feedback.as_deref()).await {
                Ok(build) => build,
                Err(e) => {
                    if cancel.is_cancelled() || stop.reason().is_some() {
                        let reason = stop.reason().unwrap_or_else(|| "canceled".to_string());
                        return Ok(ConvergenceOutcome {
                            outcome: RunOutcome::Stopped,
                            reason,
                            iterations: i.saturating_sub(1),
                        });
                    }
                    return Err(e);
                }
            };
            feedback = None;

            if !build.success {
                if !build.failures.is_empty() {
                    feedback = Some(callbacks.on_feedback(&build.failures).await);
                }
                let decision = StrategyDecision {
                    should_continue: true,
                    reason: "build failed, retrying".into(),
                };
                callbacks.on_iteration_end(i, &decision).await;
                continue;
            }

            let snapshot = callbacks.on_snapshot().await?;
            let gate_results = callbacks.on_gate_check(&snapshot).await?;

            let mut failures = Vec::new();
            let mut stop_requested: Option<String> = None;
            for result in &gate_results {
                if result.passed {
                    continue;
                }
                failures.extend(result.failures.clone());
                if let Some(gate) = spec.gates.iter().find(|g| g.name == result.gate_name) {
                    if gate.on_failure.action == GateAction::Stop {
                        stop_requested = Some(format!("Gate '{}' requested stop", gate.name));
                    }
                }
            }

            let pass_ratio = if gate_results.is_empty() {
                1.0
            } else {
                gate_results.iter().filter(|r| r.passed).count() as f64 / gate_results.len() as f64
            };
            history.push(IterationGateSummary {
                iteration: i,
                pass_ratio,
            });

            if let Some(reason) = stop_requested {
                return Ok(ConvergenceOutcome {
                    outcome: RunOutcome::Diverged,
                    reason,
                    iterations: i,
                });
            }

            if failures.is_empty() {
                return Ok(ConvergenceOutcome {
                    outcome: RunOutcome::Converged,
                    reason: "all gates passed".into(),
                    iterations: i,
                });
            }

            if i == spec.max_iterations {
                return Ok(ConvergenceOutcome {
                    outcome: RunOutcome::Diverged,
                    reason: "Reached max iterations".into(),
                    iterations: i,
                });
            }
            if started.elapsed() >= max_wall_clock {
                return Ok(ConvergenceOutcome {
                    outcome: RunOutcome::Diverged,
                    reason: "Timeout".into(),
                    iterations: i,
                });
            }

            let decision = self.strategy.should_continue(&history);
            if !decision.should_continue {
                return Ok(ConvergenceOutcome {
                    outcome: RunOutcome::Diverged,
                    reason: decision.reason,
                    iterations: i,
                });
            }

            feedback = Some(callbacks.on_feedback(&failures).await);
            callbacks.on_iteration_end(i, &decision).await;
        }

        Ok(ConvergenceOutcome {
            outcome: RunOutcome::Diverged,
            reason: "Reached max iterations".into(),
            iterations: spec.max_iterations,
        })
    }
}
