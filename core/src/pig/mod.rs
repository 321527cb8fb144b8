//! Parametric Intention Graph: parameters, operations, dependency
//! tracking, and per-session version history.

pub mod graph;
pub mod history;
pub mod operation;
pub mod parameter;

pub use graph::{NodeRef, Pig};
pub use history::{HistoryEntry, HistoryEntryKind, VersionHistory};
pub use operation::{Operation, OperationNode};
pub use parameter::{ParamValue, ParameterNode};
