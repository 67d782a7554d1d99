//! Core domain model and contracts for autofix.

pub mod change;
pub mod failure;
pub mod fix;
pub mod protocol;
pub mod session;
pub mod snapshot;
pub mod syntax;

pub use change::{ChangeRecord, ChangeType};
pub use failure::{ExecutionResult, FailureDescriptor, FailureKind};
pub use fix::{FixCandidate, FixMethod, LineEdit};
pub use protocol::*;
pub use session::{IterationReport, RepairStatus, SessionReport};
pub use snapshot::{Snapshot, SnapshotChain};
