//! genobox - bwa Alignment Orchestration
//!
//! Prepares a reference index, classifies FASTQ inputs and submits bwa
//! alignment jobs to a batch scheduler with dependency ordering, then
//! waits for the whole run and records the resulting BAM files in a
//! library file.
//!
//! # Architecture
//!
//! - [`input`]: Read-file classification and the library file
//! - [`reference`]: bwa index checks and building with fallback
//! - [`workflow`]: Command templates, batches and stage plans
//! - [`execution`]: Schedulers, submission, waiting and the engine
//! - [`environment`]: Tool locations and scheduler settings
//!
//! # Example
//!
//! ```rust,no_run
//! use genobox::environment::Settings;
//! use genobox::execution::{AlignmentRequest, Engine};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::resolve(None)?;
//!     let mut engine = Engine::new(settings);
//!     engine.set_working_dir("/data/analysis");
//!
//!     let request = AlignmentRequest {
//!         single_end: vec!["a.fq".into(), "b.fq".into()],
//!         mate1: vec![],
//!         mate2: vec![],
//!         reference: "/ref/hg19.fa".into(),
//!         qtrim: 20,
//!         max_insert: 500,
//!         threads: 1,
//!         libfile: None,
//!         sample: "P1".to_string(),
//!         mapq: vec![],
//!         libs: vec![],
//!     };
//!     engine.run(&request)?;
//!     Ok(())
//! }
//! ```

pub mod environment;
pub mod error;
pub mod execution;
pub mod input;
pub mod reference;
pub mod workflow;

// Re-export commonly used types
pub use environment::Settings;
pub use error::{PipelineError, Result};
pub use execution::engine::Engine;
pub use input::LibraryFile;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "genobox-align";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "genobox-align");
    }

    #[test]
    fn test_version_format() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert!(parts.len() >= 2, "Version should have at least major.minor");
        for part in parts {
            assert!(part.parse::<u32>().is_ok(), "Version components should be numeric");
        }
    }
}
