//! Read File Classification
//!
//! Decides whether an input is FASTQ and which quality-score offset it
//! uses, by looking at its content rather than its name.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use bio::io::fastq;
use flate2::read::MultiGzDecoder;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Records inspected when guessing the quality encoding.
const MAX_RECORDS_SCANNED: usize = 10_000;

/// Lowest quality byte a Phred+64 file can contain (Solexa Q-5).
const PHRED64_MIN: u8 = b';';

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const BAM_MAGIC: &[u8; 4] = b"BAM\x01";

/// Detected format of an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Fastq,
    Fasta,
    Sam,
    Bam,
    Empty,
    Unknown,
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fastq => "fastq",
            Self::Fasta => "fasta",
            Self::Sam => "sam",
            Self::Bam => "bam",
            Self::Empty => "empty file",
            Self::Unknown => "unrecognized content",
        };
        f.write_str(name)
    }
}

/// Quality-score offset convention of a FASTQ file.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityEncoding {
    /// Phred+33
    Sanger,
    /// Phred+64 (Illumina 1.3 to 1.7)
    Illumina,
}

impl fmt::Display for QualityEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sanger => f.write_str("Sanger"),
            Self::Illumina => f.write_str("Illumina"),
        }
    }
}

/// Role of a read file within its sequencing run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairRole {
    Unpaired,
    FirstOfPair,
    SecondOfPair,
}

/// A classified read file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ReadFile {
    pub path: PathBuf,
    pub encoding: QualityEncoding,
    pub role: PairRole,
}

impl ReadFile {
    /// Classifies `path` and tags it with its pairing role.
    pub fn classify(path: impl Into<PathBuf>, role: PairRole) -> Result<Self> {
        let path = path.into();
        let encoding = classify_fastq(&path)?;
        Ok(Self {
            path,
            encoding,
            role,
        })
    }

    /// File name without directories, used to derive artifact names.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Checks that `path` is FASTQ and returns its quality encoding.
pub fn classify_fastq(path: &Path) -> Result<QualityEncoding> {
    let file_type = detect_file_type(path)?;
    if file_type != FileType::Fastq {
        return Err(PipelineError::Format {
            path: path.to_path_buf(),
            expected: FileType::Fastq.to_string(),
            found: file_type.to_string(),
        });
    }

    let mut reader = open_text(path)?;
    skip_blank_lines(&mut reader)?;
    let encoding = detect_quality_encoding(reader)
        .map_err(|e| PipelineError::Format {
            path: path.to_path_buf(),
            expected: FileType::Fastq.to_string(),
            found: format!("malformed record ({})", e),
        })?
        .ok_or_else(|| PipelineError::Format {
            path: path.to_path_buf(),
            expected: "fastq with quality lines".to_string(),
            found: "no quality data".to_string(),
        })?;

    debug!("{}: {} quality encoding", path.display(), encoding);
    Ok(encoding)
}

/// Detects the file type from the first bytes (and first line) of a file.
pub fn detect_file_type(path: &Path) -> Result<FileType> {
    let mut magic = [0u8; 4];
    let read = read_prefix(File::open(path)?, &mut magic)?;
    if read == 0 {
        return Ok(FileType::Empty);
    }

    if read >= 2 && magic[..2] == GZIP_MAGIC {
        // BGZF-compressed BAM shares the gzip magic
        let mut inner = [0u8; 4];
        let inner_read = read_prefix(MultiGzDecoder::new(File::open(path)?), &mut inner)?;
        if inner_read == 4 && &inner == BAM_MAGIC {
            return Ok(FileType::Bam);
        }
    }

    let mut reader = open_text(path)?;
    skip_blank_lines(&mut reader)?;
    let mut first_line = String::new();
    if reader.read_line(&mut first_line)? == 0 {
        return Ok(FileType::Empty);
    }

    Ok(classify_first_line(&first_line))
}

fn classify_first_line(line: &str) -> FileType {
    if line.starts_with('@') {
        // SAM headers are two-letter record types followed by a tab
        let bytes = line.as_bytes();
        let is_sam_header =
            bytes.len() > 3 && bytes[1..3].iter().all(u8::is_ascii_uppercase) && bytes[3] == b'\t';
        if is_sam_header {
            FileType::Sam
        } else {
            FileType::Fastq
        }
    } else if line.starts_with('>') {
        FileType::Fasta
    } else if line.split('\t').count() >= 11 {
        FileType::Sam
    } else {
        FileType::Unknown
    }
}

/// Guesses the quality offset from the records of a FASTQ stream.
///
/// Any byte below `;` can only be Phred+33; otherwise the file is taken
/// to be Phred+64. Returns `None` if the stream holds no record with
/// qualities, and the parser error if a record is malformed.
pub fn detect_quality_encoding(
    reader: impl BufRead,
) -> std::result::Result<Option<QualityEncoding>, fastq::Error> {
    let mut min_quality: Option<u8> = None;

    for record in fastq::Reader::from_bufread(reader)
        .records()
        .take(MAX_RECORDS_SCANNED)
    {
        let record = record?;
        if let Some(record_min) = record.qual().iter().copied().min() {
            min_quality = Some(min_quality.map_or(record_min, |m| m.min(record_min)));
        }
        if matches!(min_quality, Some(q) if q < PHRED64_MIN) {
            return Ok(Some(QualityEncoding::Sanger));
        }
    }

    Ok(min_quality.map(|_| QualityEncoding::Illumina))
}

/// Consumes blank lines (and other leading whitespace) before the first record.
fn skip_blank_lines(reader: &mut impl BufRead) -> Result<()> {
    loop {
        let buf = reader.fill_buf()?;
        let blank = buf.iter().take_while(|b| b.is_ascii_whitespace()).count();
        if blank == 0 {
            return Ok(());
        }
        reader.consume(blank);
    }
}

fn open_text(path: &Path) -> Result<Box<dyn BufRead>> {
    let mut magic = [0u8; 2];
    let read = read_prefix(File::open(path)?, &mut magic)?;
    let file = File::open(path)?;

    if read == 2 && magic == GZIP_MAGIC {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

fn read_prefix(mut reader: impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Write};
    use tempfile::tempdir;

    const SANGER_FASTQ: &str = "@r1\nACGT\n+\nII#I\n@r2\nACGT\n+\nIIII\n";
    const ILLUMINA_FASTQ: &str = "@r1\nACGT\n+\nhhBh\n@r2\nACGT\n+\nhhhh\n";

    fn write_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_detect_sanger() {
        let encoding = detect_quality_encoding(Cursor::new(SANGER_FASTQ)).unwrap();
        assert_eq!(encoding, Some(QualityEncoding::Sanger));
    }

    #[test]
    fn test_detect_illumina() {
        let encoding = detect_quality_encoding(Cursor::new(ILLUMINA_FASTQ)).unwrap();
        assert_eq!(encoding, Some(QualityEncoding::Illumina));
    }

    #[test]
    fn test_detect_sanger_in_later_record() {
        let fastq = "@r1\nAC\n+\nhh\n@r2\nAC\n+\nh5\n";
        assert_eq!(
            detect_quality_encoding(Cursor::new(fastq)).unwrap(),
            Some(QualityEncoding::Sanger)
        );
    }

    #[test]
    fn test_detect_empty_stream() {
        assert_eq!(detect_quality_encoding(Cursor::new("")).unwrap(), None);
    }

    #[test]
    fn test_detect_truncated_record() {
        assert!(detect_quality_encoding(Cursor::new("@r1\nACGT\n")).is_err());
    }

    #[test]
    fn test_classify_leading_blank_line() {
        let temp_dir = tempdir().unwrap();
        let content = format!("\n{}", "@r1\nACGT\n+\nhhhh\n@r2\nACGT\n+\nhhhh\n");
        let path = write_file(temp_dir.path(), "reads.fq", content.as_bytes());

        assert_eq!(detect_file_type(&path).unwrap(), FileType::Fastq);
        assert_eq!(classify_fastq(&path).unwrap(), QualityEncoding::Illumina);
    }

    #[test]
    fn test_classify_malformed_record() {
        let temp_dir = tempdir().unwrap();
        let path = write_file(temp_dir.path(), "reads.fq", b"@r1\nACGT\n+\nIIII\nACGT\n+\nIIII\n");

        match classify_fastq(&path) {
            Err(PipelineError::Format { found, .. }) => assert!(found.starts_with("malformed record")),
            other => panic!("Expected format error, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_fastq_file() {
        let temp_dir = tempdir().unwrap();
        let path = write_file(temp_dir.path(), "reads.fq", SANGER_FASTQ.as_bytes());

        assert_eq!(classify_fastq(&path).unwrap(), QualityEncoding::Sanger);
    }

    #[test]
    fn test_classify_gzipped_fastq() {
        let temp_dir = tempdir().unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(ILLUMINA_FASTQ.as_bytes()).unwrap();
        let path = write_file(temp_dir.path(), "reads.fq.gz", &encoder.finish().unwrap());

        assert_eq!(detect_file_type(&path).unwrap(), FileType::Fastq);
        assert_eq!(classify_fastq(&path).unwrap(), QualityEncoding::Illumina);
    }

    #[test]
    fn test_classify_rejects_fasta() {
        let temp_dir = tempdir().unwrap();
        let path = write_file(temp_dir.path(), "ref.fq", b">chr1\nACGT\n");

        match classify_fastq(&path) {
            Err(PipelineError::Format { found, .. }) => assert_eq!(found, "fasta"),
            other => panic!("Expected format error, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_rejects_sam() {
        let temp_dir = tempdir().unwrap();
        let path = write_file(temp_dir.path(), "aln.sam", b"@HD\tVN:1.0\n");
        assert_eq!(detect_file_type(&path).unwrap(), FileType::Sam);
        assert!(classify_fastq(&path).is_err());
    }

    #[test]
    fn test_classify_rejects_bam() {
        let temp_dir = tempdir().unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"BAM\x01\x00\x00\x00\x00").unwrap();
        let path = write_file(temp_dir.path(), "aln.bam", &encoder.finish().unwrap());

        assert_eq!(detect_file_type(&path).unwrap(), FileType::Bam);
        assert!(classify_fastq(&path).is_err());
    }

    #[test]
    fn test_classify_rejects_empty() {
        let temp_dir = tempdir().unwrap();
        let path = write_file(temp_dir.path(), "empty.fq", b"");
        assert_eq!(detect_file_type(&path).unwrap(), FileType::Empty);
        assert!(matches!(classify_fastq(&path), Err(PipelineError::Format { .. })));
    }

    #[test]
    fn test_classify_missing_file() {
        let result = classify_fastq(Path::new("/nonexistent/reads.fq"));
        assert!(matches!(result, Err(PipelineError::Io(_))));
    }

    #[test]
    fn test_read_file_classify() {
        let temp_dir = tempdir().unwrap();
        let path = write_file(temp_dir.path(), "s_1.fq", ILLUMINA_FASTQ.as_bytes());

        let read = ReadFile::classify(&path, PairRole::FirstOfPair).unwrap();
        assert_eq!(read.encoding, QualityEncoding::Illumina);
        assert_eq!(read.role, PairRole::FirstOfPair);
        assert_eq!(read.file_name(), "s_1.fq");
    }
}
