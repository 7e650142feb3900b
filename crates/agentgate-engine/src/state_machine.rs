//! Run state machine: `queued -> leased -> building -> snapshotting
//! -> verifying -> {succeeded | feedback -> building}`, plus the `canceled`
//! and `failed` edges reachable from any non-terminal state.
//!
//! Transitions are idempotent: delivering an event that doesn't match a
//! valid edge from the current state is a no-op, not an error — this lets
//! a resumed process re-deliver the last event safely.

use agentgate_core::{BuildError, Run, RunOutcome, RunResult, RunState};

#[derive(Clone, Debug, PartialEq)]
pub enum RunEvent {
    Lease,
    StartBuild,
    BuildFailed(BuildError),
    SnapshotTaken,
    VerifyPassed,
    VerifyFailedRetryable,
    VerifyFailedTerminal,
    FeedbackReady,
    Cancel(String),
    SystemError(BuildError),
}

/// Apply `event` to `run` in place. Returns `true` if the state actually
/// changed (a valid, non-idempotent-no-op transition occurred).
pub fn apply(run: &mut Run, event: RunEvent) -> bool {
    if run.state.is_terminal() {
        return false;
    }

    let next = match (run.state, &event) {
        (RunState::Queued, RunEvent::Lease) => Some(RunState::Leased),
        (RunState::Leased, RunEvent::StartBuild) => Some(RunState::Building),
        (RunState::Feedback, RunEvent::StartBuild) => Some(RunState::Building),
        (RunState::Building, RunEvent::SnapshotTaken) => Some(RunState::Snapshotting),
        (RunState::Snapshotting, RunEvent::SnapshotTaken) => Some(RunState::Verifying),
        (RunState::Verifying, RunEvent::VerifyPassed) => Some(RunState::Succeeded),
        (RunState::Verifying, RunEvent::VerifyFailedRetryable) => Some(RunState::Feedback),
        (RunState::Verifying, RunEvent::VerifyFailedTerminal) => Some(RunState::Failed),
        (RunState::Building, RunEvent::BuildFailed(_)) => Some(RunState::Failed),
        (_, RunEvent::Cancel(_)) => Some(RunState::Canceled),
        (_, RunEvent::SystemError(_)) => Some(RunState::Failed),
        _ => None,
    };

    let Some(next) = next else { return false };
    run.state = next;

    match event {
        RunEvent::StartBuild if next == RunState::Building => {
            run.iteration += 1;
        }
        RunEvent::VerifyPassed => {
            run.completed_at = Some(chrono::Utc::now());
            run.result = Some(RunResult {
                outcome: RunOutcome::Converged,
                reason: "all gates passed".into(),
            });
        }
        RunEvent::VerifyFailedTerminal => {
            run.completed_at = Some(chrono::Utc::now());
            run.result = Some(RunResult {
                outcome: RunOutcome::Diverged,
                reason: "reached max iterations".into(),
            });
        }
        RunEvent::BuildFailed(err) => {
            run.completed_at = Some(chrono::Utc::now());
            run.error = Some(err);
        }
        RunEvent::Cancel(reason) => {
            run.completed_at = Some(chrono::Utc::now());
            run.result = Some(RunResult {
                outcome: RunOutcome::Stopped,
                reason,
            });
        }
        RunEvent::SystemError(err) => {
            run.completed_at = Some(chrono::Utc::now());
            run.error = Some(err);
        }
        _ => {}
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentgate_core::Id;

    fn new_run() -> Run {
        Run::new(Id::new(), Id::new(), 3)
    }

    #[test]
    fn happy_path_to_succeeded() {
        let mut run = new_run();
        assert!(apply(&mut run, RunEvent::Lease));
        assert_eq!(run.state, RunState::Leased);
        assert!(apply(&mut run, RunEvent::StartBuild));
        assert_eq!(run.state, RunState::Building);
        assert_eq!(run.iteration, 1);
        assert!(apply(&mut run, RunEvent::SnapshotTaken));
        assert_eq!(run.state, RunState::Snapshotting);
        assert!(apply(&mut run, RunEvent::SnapshotTaken));
        assert_eq!(run.state, RunState::Verifying);
        assert!(apply(&mut run, RunEvent::VerifyPassed));
        assert_eq!(run.state, RunState::Succeeded);
        assert!(run.completed_at.is_some());
    }

    #[test]
    fn retryable_failure_loops_back_to_building() {
        let mut run = new_run();
        apply(&mut run, RunEvent::Lease);
        apply(&mut run, RunEvent::StartBuild);
        apply(&mut run, RunEvent::SnapshotTaken);
        apply(&mut run, RunEvent::SnapshotTaken);
        assert!(apply(&mut run, RunEvent::VerifyFailedRetryable));
        assert_eq!(run.state, RunState::Feedback);
        assert!(apply(&mut run, RunEvent::StartBuild));
        assert_eq!(run.state, RunState::Building);
        assert_eq!(run.iteration, 2);
    }

    #[test]
    fn terminal_state_ignores_further_events() {
        let mut run = new_run();
        apply(&mut run, RunEvent::Lease);
        apply(&mut run, RunEvent::Cancel("user requested".into()));
        assert_eq!(run.state, RunState::Canceled);
        assert!(!apply(&mut run, RunEvent::StartBuild));
        assert_eq!(run.state, RunState::Canceled);
    }

    #[test]
    fn invalid_transition_from_current_state_is_noop() {
        let mut run = new_run();
        // Queued can't jump straight to SnapshotTaken.
        assert!(!apply(&mut run, RunEvent::SnapshotTaken));
        assert_eq!(run.state, RunState::Queued);
    }

    #[test]
    fn cancel_reachable_from_any_nonterminal_state() {
        let mut run = new_run();
        apply(&mut run, RunEvent::Lease);
        apply(&mut run, RunEvent::StartBuild);
        assert!(apply(&mut run, RunEvent::Cancel("stop".into())));
        assert_eq!(run.state, RunState::Canceled);
    }
}
