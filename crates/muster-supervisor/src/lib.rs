//! Session-graph expansion and worker process supervision: the core of the
//! orchestrator.

pub mod expander;
pub mod graph;
pub mod process;

pub use graph::{AvatarIdentifier, RunningView, SessionGraph};
pub use process::ProcessSupervisor;
