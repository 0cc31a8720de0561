//! Alignment Workflow Module
//!
//! Everything that decides *what* gets submitted, independent of how a
//! scheduler runs it.
//!
//! # Structure
//!
//! - [`model`]: Batches, handles, resources and dependency descriptors
//! - [`commands`]: bwa and samtools command-line templates
//! - [`builder`]: Single- and paired-end stage plans
//! - [`state`]: Run record written after submission

pub mod builder;
pub mod commands;
pub mod model;
pub mod state;

pub use builder::{build_paired_end, build_single_end, AlignmentParams};
pub use model::{
    CommandBatch, Dependency, DependencyCondition, DependencyKind, JobHandle, ResourceSpec,
    SemaphoreGroup, StagePlan,
};
pub use state::RunRecord;
