//! Input Module
//!
//! Everything read before jobs are built: the read files themselves and
//! the library table describing them.
//!
//! - [`classify`]: FASTQ detection and quality-encoding detection
//! - [`library`]: Library metadata file (read groups, MAPQ, BAM paths)

pub mod classify;
pub mod library;

pub use classify::{classify_fastq, PairRole, QualityEncoding, ReadFile};
pub use library::{LibraryEntry, LibraryFile, ReadGroup};
