//! Per-user listing workflow: steps, validation, and the driving engine.

pub mod engine;
pub mod steps;
pub mod validate;

pub use engine::{Engine, SETUP_COMMAND};
pub use steps::{ItemEntry, Step, StepToken, TagSelection, WorkflowState};
