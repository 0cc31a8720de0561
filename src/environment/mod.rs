//! Environment Module
//!
//! Resolves where the external tools live and how the scheduler is
//! reached for a run.

pub mod paths;

pub use paths::{Backend, SchedulerSettings, Settings, ToolPaths};
