//! Convergence gate: passes when the
//! agent's consecutive textual outputs stop changing meaningfully — Jaccard
//! similarity over word sets at or above `similarity_threshold` for
//! `consecutive_rounds` consecutive pairs signals stagnation-or-completion.

use agentgate_core::{GateFailure, GateResult};
use std::collections::HashSet;
use std::time::Instant;

pub fn run_convergence(
    recent_outputs: &[String],
    similarity_threshold: f64,
    consecutive_rounds: u32,
) -> GateResult {
    let started = Instant::now();
    let duration_ms = || started.elapsed().as_millis() as u64;

    if recent_outputs.len() < consecutive_rounds as usize + 1 {
        return GateResult::fail(
            "convergence",
            vec![GateFailure::new("not enough history to evaluate convergence yet")],
            duration_ms(),
        );
    }

    let window = &recent_outputs[recent_outputs.len() - (consecutive_rounds as usize + 1)..];
    let all_stagnant = window
        .windows(2)
        .all(|pair| jaccard_similarity(&pair[0], &pair[1]) >= similarity_threshold);

    if all_stagnant {
        GateResult::pass("convergence", duration_ms())
    } else {
        GateResult::fail(
            "convergence",
            vec![GateFailure::new("outputs still changing between iterations")],
            duration_ms(),
        )
    }
}

fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let set_a: HashSet<&str> = a.split_whitespace().collect();
    let set_b: HashSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        1.0
    } else {
        intersection as f64 / union as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_outputs_are_fully_similar() {
        assert_eq!(jaccard_similarity("a b c", "a b c"), 1.0);
    }

    #[test]
    fn disjoint_outputs_have_zero_similarity() {
        assert_eq!(jaccard_similarity("a b", "c d"), 0.0);
    }

    #[test]
    fn not_enough_history_fails() {
        let result = run_convergence(&["one".into()], 0.92, 2);
        assert!(!result.passed);
    }

    #[test]
    fn stagnant_history_passes() {
        let outputs = vec![
            "fixed the bug in parser".to_string(),
            "fixed the bug in parser module".to_string(),
            "fixed the bug in parser module code".to_string(),
        ];
        let result = run_convergence(&outputs, 0.5, 2);
        assert!(result.passed);
    }

    #[test]
    fn changing_history_fails() {
        let outputs = vec![
            "implemented feature A".to_string(),
            "refactored unrelated module B".to_string(),
            "rewrote the entire networking layer".to_string(),
        ];
        let result = run_convergence(&outputs, 0.92, 2);
        assert!(!result.passed);
    }
}
