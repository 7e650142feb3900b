//! Round-trip and invariant tests for agentgate-core's data model.

use agentgate_core::*;

#[test]
fn work_order_round_trips_through_json() {
    let gate_plan = GatePlan::default();
    let wo = WorkOrder::new_root(
        "Add hello.txt",
        WorkspaceSource::Fresh {
            dest_path: "/w".into(),
            template: None,
        },
        3,
        3600,
        gate_plan,
    );
    let json = serde_json::to_string(&wo).unwrap();
    let back: WorkOrder = serde_json::from_str(&json).unwrap();
    assert_eq!(wo.id, back.id);
    assert_eq!(wo.task_prompt, back.task_prompt);
    assert_eq!(wo.status, back.status);
    assert_eq!(wo.created_at, back.created_at);
}

#[test]
fn child_work_order_inherits_root_and_depth() {
    let root = WorkOrder::new_root(
        "root task",
        WorkspaceSource::Local { path: "/w".into() },
        3,
        3600,
        GatePlan::default(),
    );
    let child = WorkOrder::new_child(
        &root,
        0,
        "child task",
        WorkspaceSource::Local { path: "/w/c0".into() },
        3,
        3600,
        GatePlan::default(),
    );
    assert_eq!(child.root_id, root.id);
    assert_eq!(child.parent_id, Some(root.id.clone()));
    assert_eq!(child.depth, 1);
}

#[test]
fn lease_expiry() {
    let now = chrono::Utc::now();
    let lease = Lease {
        id: Id::new(),
        workspace_id: Id::new(),
        owner_run_id: Id::new(),
        acquired_at: now,
        expires_at: now + chrono::Duration::seconds(10),
    };
    assert!(!lease.is_expired(now));
    assert!(lease.is_expired(now + chrono::Duration::seconds(11)));
}

#[test]
fn tree_status_any_failed_child_fails_tree() {
    let root_id = Id::new();
    let mut tree = Tree::new_root(root_id.clone());
    let root = tree.nodes.get_mut(&root_id).unwrap();
    root.status = WorkOrderStatus::WaitingForChildren;

    for (i, status) in [
        WorkOrderStatus::Succeeded,
        WorkOrderStatus::Succeeded,
        WorkOrderStatus::Failed,
    ]
    .into_iter()
    .enumerate()
    {
        let child_id = Id::new();
        tree.nodes.insert(
            child_id.clone(),
            TreeNode {
                work_order_id: child_id.clone(),
                parent_id: Some(root_id.clone()),
                child_ids: Vec::new(),
                status,
                depth: 1,
                sibling_index: i as u32,
                created_at: chrono::Utc::now(),
                completed_at: Some(chrono::Utc::now()),
                integration_status: None,
                integration_work_order_id: None,
            },
        );
        tree.nodes.get_mut(&root_id).unwrap().child_ids.push(child_id);
    }

    assert_eq!(tree.status(), TreeStatus::Failed);
    assert!(tree.are_all_children_complete(&root_id));
    assert!(!tree.all_children_succeeded(&root_id));
}

#[test]
fn tree_status_all_succeeded_is_completed() {
    let root_id = Id::new();
    let mut tree = Tree::new_root(root_id.clone());
    for i in 0..2 {
        let child_id = Id::new();
        tree.nodes.insert(
            child_id.clone(),
            TreeNode {
                work_order_id: child_id.clone(),
                parent_id: Some(root_id.clone()),
                child_ids: Vec::new(),
                status: WorkOrderStatus::Succeeded,
                depth: 1,
                sibling_index: i,
                created_at: chrono::Utc::now(),
                completed_at: Some(chrono::Utc::now()),
                integration_status: None,
                integration_work_order_id: None,
            },
        );
        tree.nodes.get_mut(&root_id).unwrap().child_ids.push(child_id);
    }
    tree.nodes.get_mut(&root_id).unwrap().status = WorkOrderStatus::Succeeded;
    assert_eq!(tree.status(), TreeStatus::Completed);
    assert!(tree.all_children_succeeded(&root_id));
}

#[test]
fn gate_result_pass_and_fail_constructors() {
    let pass = GateResult::pass("files-exist", 12);
    assert!(pass.passed);
    assert!(pass.failures.is_empty());

    let fail = GateResult::fail(
        "unit-tests",
        vec![GateFailure::new("expected 3, got 2").at("src/a.ts", 12)],
        340,
    );
    assert!(!fail.passed);
    assert_eq!(fail.failures[0].line, Some(12));
}

#[test]
fn error_kind_default_retryable_set() {
    assert!(ErrorKind::AgentTimeout.default_retryable());
    assert!(ErrorKind::SystemError.default_retryable());
    assert!(ErrorKind::GithubError.default_retryable());
    assert!(!ErrorKind::AgentCrash.default_retryable());
    assert!(!ErrorKind::Validation.default_retryable());
}

#[test]
fn progress_event_critical_classification() {
    let failed = ProgressEventKind::RunFailed {
        error: BuildError::new(ErrorKind::SystemError, "boom"),
    };
    assert!(failed.is_critical());
    let heartbeat = ProgressEventKind::Heartbeat;
    assert!(!heartbeat.is_critical());
}

#[test]
fn progress_event_sse_mapping_includes_event_name() {
    let event = ProgressEvent::new(Id::new(), Id::new(), ProgressEventKind::Heartbeat);
    let sse = progress_event_to_sse(&event);
    assert!(sse.starts_with("event: heartbeat\n"));
    assert!(sse.contains("data: "));
}
