//! Verification levels L0-L3.
//!
//! L0 is static: path-policy plus the gate contract's required/forbidden
//! files and naming rules, evaluated against the workspace tree — no
//! subprocess involved. L1-L3 run a conventional per-level script under
//! `.agentgate/verify/<level>.sh` inside the sandbox; a level with no script
//! present is treated as passing (nothing to verify at that level).

use agentgate_core::{GateContract, GateFailure, GateResult};
use agentgate_sandbox::{ExecOpts, Sandbox};
use agentgate_store::{PathPolicy, PathViolation};
use std::path::Path;
use std::time::Instant;
use walkdir::WalkDir;

pub async fn run_levels(
    levels: &[String],
    contract: &GateContract,
    workspace_path: &Path,
    sandbox: &dyn Sandbox,
) -> GateResult {
    let started = Instant::now();
    let mut failures = Vec::new();

    for level in levels {
        let level_failures = if level == "L0" {
            check_l0(contract, workspace_path)
        } else {
            run_scripted_level(level, workspace_path, sandbox).await
        };
        failures.extend(level_failures);
    }

    let duration_ms = started.elapsed().as_millis() as u64;
    if failures.is_empty() {
        GateResult::pass("verification-levels", duration_ms)
    } else {
        GateResult::fail("verification-levels", failures, duration_ms)
    }
}

fn check_l0(contract: &GateContract, workspace_path: &Path) -> Vec<GateFailure> {
    let mut failures = Vec::new();

    for required in &contract.required_files {
        if !workspace_path.join(required).exists() {
            failures.push(
                GateFailure::new(format!("required file missing: {required}")).at(required, 0),
            );
        }
    }

    let Ok(policy) = PathPolicy::compile(&contract.forbidden_files, &contract.naming_rules) else {
        failures.push(GateFailure::new("invalid forbidden_files/naming_rules glob pattern"));
        return failures;
    };

    for entry in WalkDir::new(workspace_path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let relative = match entry.path().strip_prefix(workspace_path) {
            Ok(r) => r,
            Err(_) => continue,
        };
        if let Err(violation) = policy.check(relative) {
            let message = match violation {
                PathViolation::Denied => format!("forbidden file present: {}", relative.display()),
                PathViolation::NotAllowed => format!("file violates naming rules: {}", relative.display()),
                _ => continue,
            };
            failures.push(GateFailure::new(message).at(relative.to_string_lossy(), 0));
        }
    }

    failures
}

async fn run_scripted_level(level: &str, workspace_path: &Path, sandbox: &dyn Sandbox) -> Vec<GateFailure> {
    let script = format!(".agentgate/verify/{level}.sh");
    if !workspace_path.join(&script).exists() {
        return Vec::new();
    }
    match sandbox
        .execute("bash", &[script.clone()], ExecOpts::default())
        .await
    {
        Ok(result) if result.exit_code == 0 && !result.timed_out => Vec::new(),
        Ok(result) => vec![GateFailure::new(format!(
            "{level} verification failed (exit {}): {}",
            result.exit_code,
            result.stderr.trim()
        ))],
        Err(e) => vec![GateFailure::new(format!("{level} verification errored: {e}"))],
    }
}
