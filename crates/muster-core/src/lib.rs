//! Shared types used across the orchestrator: branded ids, the session and
//! entity kind enums, the top-level error type, and the logging bootstrap.

pub mod error;
pub mod ids;
pub mod kinds;
pub mod logging;

pub use error::{Error, Result};
pub use ids::{GroupId, InfoCopyId, ProfileId, RequestId, SessionId};
pub use kinds::{EntityKind, GroupKind, SessionKind, SessionStatus};
