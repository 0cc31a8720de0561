//! Pipeline Errors
//!
//! Every failure in an alignment run is fatal. The only retry in the
//! crate is the reference index fallback in [`crate::reference`].

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while preparing, submitting or waiting on alignments.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input is not the expected read-file type.
    #[error("{}: expected {expected} input, found {found}", path.display())]
    Format {
        path: PathBuf,
        expected: String,
        found: String,
    },

    /// Paired inputs disagree (encodings or list lengths).
    #[error("{0}")]
    Mismatch(String),

    /// Every index-building strategy failed.
    #[error("bwa index could not be created from {} (attempted: {})", reference.display(), attempted.join("; "))]
    IndexBuild {
        reference: PathBuf,
        attempted: Vec<String>,
    },

    /// The completion wait exceeded its ceiling.
    #[error("timed out after {waited:?} waiting for job group '{label}'")]
    Timeout { label: String, waited: Duration },

    /// Upstream handles cannot be wired onto the batch.
    #[error("cannot wire {upstream} upstream jobs onto {jobs} jobs as {kind}")]
    DependencyWiring {
        kind: String,
        jobs: usize,
        upstream: usize,
    },

    /// The scheduler client refused or garbled a request.
    #[error("scheduler command '{command}' failed: {message}")]
    Scheduler { command: String, message: String },

    /// An external command exited unsuccessfully.
    #[error("command '{command}' failed with exit code {code:?}")]
    Command { command: String, code: Option<i32> },

    /// The run finished but some alignments were never written.
    #[error("job group '{label}' finished without producing {}", missing.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", "))]
    MissingArtifacts { label: String, missing: Vec<PathBuf> },

    /// Library metadata file is malformed or incomplete.
    #[error("library file {}: {message}", path.display())]
    Library { path: PathBuf, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("no read files given (use --se and/or --pe1/--pe2)")]
    NoInput,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
