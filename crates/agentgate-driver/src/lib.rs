//! agentgate-driver — the agent driver plug: launches an AI coding
//! agent inside a sandbox, collects its structured message stream, and
//! returns an `AgentResult`.

pub mod collector;
pub mod driver;
pub mod types;

pub use collector::{CollectorEvent, MessageCollector};
pub use driver::{AgentDriver, EventSink, MockAgentDriver, SubprocessAgentDriver};
pub use types::{
    AgentConstraints, AgentRequest, AgentResult, Capability, PermissionMode, StructuredOutput,
    TokenUsage, ToolCallRecord,
};
