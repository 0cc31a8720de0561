//! Alignment Execution Module
//!
//! Submits planned work to a scheduler and waits for it.
//!
//! # Architecture
//!
//! - [`engine`]: Runs one alignment from inputs to updated library file
//! - [`scheduler`]: The `Scheduler` trait and dry-run backend
//! - [`moab`]: Moab cluster backend (`msub` / `mjobctl`)
//! - [`local`]: Local bash backend
//! - [`submit`]: Batch and stage submission with dependency wiring
//! - [`wait`]: Semaphore-based completion wait
//! - [`runner`]: Shell command execution
//! - [`filter`]: MAPQ filter and sort of a BAM file

pub mod engine;
pub mod filter;
pub mod local;
pub mod moab;
pub mod runner;
pub mod scheduler;
pub mod submit;
pub mod wait;

pub use engine::{AlignmentOutcome, AlignmentRequest, Engine};
pub use filter::FilterSortJob;
pub use local::LocalScheduler;
pub use moab::MoabScheduler;
pub use runner::{CommandRunner, ShellRunner};
pub use scheduler::{DryRunScheduler, JobRequest, Scheduler};
pub use submit::{submit_batch, submit_stage};
pub use wait::wait_semaphore;
