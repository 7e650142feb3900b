//! agentgate-engine — the run engine: work-order queueing, retry
//! policy, the `Run` state machine, the convergence controller
//!, workspace provisioning, the execution coordinator, and the
//! work-order tree coordinator.

pub mod convergence;
pub mod coordinator;
pub mod delivery;
pub mod dispatcher;
pub mod queue;
pub mod retry;
pub mod state_machine;
pub mod tree;
pub mod workspace;

pub use convergence::{
    AlwaysContinue, BuildOutcome, ConvergenceCallbacks, ConvergenceController, ConvergenceOutcome,
    ConvergenceSpec, ConvergenceStrategy, IterationGateSummary, StopSignal, StrategyDecision, Trend,
};
pub use coordinator::{Coordinator, CoordinatorConfig};
pub use delivery::{DeliveryRequest, DeliveryResult, GitHubVcsClient, NoopVcsClient, VCSClient};
pub use dispatcher::Dispatcher;
pub use queue::{HealthStatus, ProcessHandle, QueueConfig, WorkOrderQueue};
pub use retry::{RetryDecision, RetryPolicy};
pub use state_machine::{apply, RunEvent};
pub use tree::TreeCoordinator;
