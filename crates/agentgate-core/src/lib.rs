//! agentgate-core — data model, error taxonomy, and wire protocol shared
//! across the AgentGate execution kernel.

pub mod duration;
pub mod error;
pub mod protocol;
pub mod types;

pub use duration::parse_duration_spec;
pub use error::{BuildError, Error, ErrorKind, Result};
pub use protocol::*;
pub use types::*;
