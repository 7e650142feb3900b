//! agentgate — contained builder with a verification gate for AI coding
//! agents. Wires the artifact store, lease manager, sandbox, agent driver,
//! gate registry, progress bus, queue, dispatcher, tree coordinator, and the
//! HTTP/WebSocket gateway into one process.

use agentgate_driver::{AgentDriver, MockAgentDriver, SubprocessAgentDriver};
use agentgate_engine::{Coordinator, CoordinatorConfig, Dispatcher, QueueConfig, TreeCoordinator, WorkOrderQueue};
use agentgate_events::{BusConfig, MetricsCollector, ProgressBus};
use agentgate_gates::{ApprovalSource, GateRegistry};
use agentgate_gateway::auth::ApiKey;
use agentgate_gateway::state::GatewayState;
use agentgate_sandbox::{NetworkMode, SandboxConfig, SubprocessSandbox};
use agentgate_store::{ArtifactStore, LeaseManager, Layout};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "agentgate", about = "Contained builder with a verification gate for AI coding agents")]
struct Cli {
    /// Address to bind the HTTP/WebSocket gateway to.
    #[arg(long, default_value = "127.0.0.1:8420")]
    bind: SocketAddr,

    /// Agent driver command to run per iteration. Defaults to a mock driver
    /// useful for smoke-testing a fresh AGENTGATE_ROOT.
    #[arg(long)]
    agent_command: Option<String>,

    /// Maximum number of work orders running concurrently.
    #[arg(long, default_value_t = 4)]
    max_concurrent_runs: usize,
}

/// No dashboard-approval source wired yet — every gate requiring a human
/// approval token fails closed until one exists.
struct NoApprovals;
impl ApprovalSource for NoApprovals {
    fn has_token(&self, _token: &str) -> bool {
        false
    }
}

fn init_tracing() {
    let security_audit = std::env::var("AGENTGATE_SECURITY_AUDIT").is_ok();
    let default_filter = if security_audit {
        "agentgate=debug,agentgate_sandbox=debug,tower_http=info"
    } else {
        "agentgate=info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn network_mode() -> NetworkMode {
    if std::env::var("AGENTGATE_NEW_SECURITY").is_ok() {
        NetworkMode::None
    } else {
        NetworkMode::Bridge
    }
}

fn github_token() -> Option<String> {
    std::env::var("AGENTGATE_GITHUB_TOKEN")
        .or_else(|_| std::env::var("GITHUB_TOKEN"))
        .ok()
}

fn build_driver(agent_command: Option<String>) -> Arc<dyn AgentDriver> {
    match agent_command {
        Some(cmd) => {
            let mut parts = cmd.split_whitespace();
            let program = parts.next().unwrap_or("agent").to_string();
            let args: Vec<String> = parts.map(str::to_string).collect();
            Arc::new(SubprocessAgentDriver::new(program, args).with_oauth_env_filter())
        }
        None => {
            warn!("no --agent-command given; running with a mock driver that always succeeds");
            Arc::new(MockAgentDriver::succeeding("mock driver: nothing built"))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let layout = Layout::from_env();
    info!(root = %layout.root().display(), "agentgate starting");
    let store = ArtifactStore::new(layout.clone());

    let leases = Arc::new(LeaseManager::new(store.clone()));
    leases.rehydrate().await?;

    let sandbox = SubprocessSandbox::new(
        "agentgate",
        SandboxConfig {
            workspace_root: layout.root().join("workspaces-live"),
            network_mode: network_mode(),
            ..Default::default()
        },
    );
    let driver = build_driver(cli.agent_command);
    let gates = Arc::new(GateRegistry::new());
    let bus = Arc::new(ProgressBus::new(BusConfig::default()));
    let metrics = Arc::new(MetricsCollector::new());

    let coordinator_config = CoordinatorConfig {
        github_token: github_token(),
        ..Default::default()
    };
    let coordinator = Arc::new(Coordinator::new(
        store.clone(),
        leases.clone(),
        sandbox,
        driver,
        gates,
        Arc::new(NoApprovals),
        bus.clone(),
        metrics.clone(),
        coordinator_config,
    ));

    let queue_config = QueueConfig {
        max_concurrent_runs: cli.max_concurrent_runs,
        ..Default::default()
    };
    let queue = Arc::new(WorkOrderQueue::new(store.clone(), leases.clone(), queue_config));
    for id in store.list_work_order_ids().await? {
        if let Some(wo) = store.try_read_work_order(&id).await? {
            if matches!(wo.status, agentgate_core::WorkOrderStatus::Queued) {
                queue.enqueue(wo.id.0.clone()).await;
            }
        }
    }

    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        queue.clone(),
        coordinator,
        Duration::from_secs(1),
    ));
    let tree = Arc::new(TreeCoordinator::new(store.clone()));

    let state = Arc::new(GatewayState {
        store,
        queue: queue.clone(),
        dispatcher: dispatcher.clone(),
        tree,
        bus,
        metrics,
        auth: ApiKey::from_env(),
        started_at: Arc::new(std::time::Instant::now()),
    });

    let cancel = CancellationToken::new();
    let reaper = tokio::spawn(leases.clone().run_reaper(Duration::from_secs(30), cancel.child_token()));
    let stale_detector = tokio::spawn(queue.clone().run_stale_detector(cancel.child_token()));
    let dispatch_loop = tokio::spawn(dispatcher.run(cancel.child_token()));

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        shutdown.cancel();
    });

    let serve_result = agentgate_gateway::serve(state, cli.bind).await;

    cancel.cancel();
    let _ = tokio::join!(reaper, stale_detector, dispatch_loop);

    serve_result
}
