//! Saga orchestration over the messaging fabric.
//!
//! A saga is an ordered list of steps, each an [`Action`] sent as a command
//! to one domain service. The orchestrator dispatches one step at a time and
//! advances when the matching status event arrives. When a step fails,
//! completed steps are compensated in reverse order and the saga ends FAILED.
//! Every terminal saga emits exactly one `SAGA_COMPLETED` or `SAGA_FAILED`.
//!
//! ```text
//! PENDING ──success──▶ PENDING (next step) ──last success──▶ COMPLETED
//!    │
//!    └─failure/timeout──▶ COMPENSATING ──all undone──▶ FAILED
//!                              │
//!                              └─compensation failed──▶ FAILED (compensationIncomplete)
//! ```

pub mod action;
pub mod builder;
pub mod compensator;
pub mod emitter;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod model;
pub mod orchestrator;
pub mod reducer;
pub mod registry;

pub use action::{Action, ActionKind, ActionContract, Domain, Outcome};
pub use builder::{SagaBuilder, SagaDefinition, StepDefinition};
pub use emitter::{SAGA_COMPLETED, SAGA_FAILED, SAGA_STATUS_TOPIC, SagaOutcome};
pub use error::{Result, SagaError};
pub use handlers::{
    SAGA_COMMAND_TOPIC, SagaCommandHandler, StatusEventHandler, await_outcome, register_handlers,
    required_topics, status_topics,
};
pub use model::{Saga, SagaType, Step, StepStatus};
pub use orchestrator::{OrchestratorSettings, SagaOrchestrator, SweepReport};
pub use reducer::{IgnoreReason, ReduceOutcome};
pub use registry::SagaRegistry;
