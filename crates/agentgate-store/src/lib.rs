//! agentgate-store — crash-safe on-disk persistence for the execution
//! kernel: artifact layout, typed read/write API, path containment policy,
//! and the workspace lease manager.

pub mod artifact_store;
pub mod atomic;
pub mod layout;
pub mod lease;
pub mod path_policy;

pub use artifact_store::{ArtifactStore, AuditEntry, Feedback, VerificationReport};
pub use layout::Layout;
pub use lease::{AcquireError, LeaseManager};
pub use path_policy::{validate_path, PathPolicy, PathViolation};
