//! Session coordinator.
//!
//! [`core`] is the synchronous state machine: events in, effects out.
//! [`runtime`] executes those effects on tokio and feeds results back as
//! events.

pub mod core;
pub mod events;
pub mod runtime;

pub use self::core::{Orchestrator, OrchestratorSettings};
pub use events::{Effect, Event, SessionNotice, SessionStatus, TimerId, TimerKind};
pub use runtime::{Collaborators, RuntimeSettings, SessionHandle, SessionRuntime};
