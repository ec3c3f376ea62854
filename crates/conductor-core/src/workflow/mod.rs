//! Workflow Engine: ordered, stage-partitioned steps delegated to external
//! step controllers through apply-and-poll.
//!
//! - `context` -- the handoff payload attached to each step's target object
//! - `renderer` -- turns a declared step into its target object
//! - `dispatcher` -- applies a step target with its context, polls it back
//! - `condition` -- classifies a target's `workflow-finish` condition
//! - `checkpoint` -- persists step and state transitions in the application status
//! - `engine` -- the per-application state machine

pub mod checkpoint;
pub mod condition;
pub mod context;
pub mod dispatcher;
pub mod engine;
pub mod renderer;

pub use checkpoint::{CheckpointError, CheckpointManager};
pub use condition::{StepProgress, evaluate};
pub use context::WorkflowContext;
pub use dispatcher::{AppliedStep, DispatchError, StepDispatcher};
pub use engine::{EngineError, EngineOutcome, WorkflowEngine};
pub use renderer::{StepRenderer, TypedStepRenderer};
