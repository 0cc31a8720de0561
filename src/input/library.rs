//! Library Metadata File
//!
//! A tab-separated table with one row per input read file, holding the
//! read-group fields and mapping-quality cutoff for that file. After a
//! run the produced BAM path is added in a `BAM` column.
//!
//! ```text
//! ID        Data              Library  Sample  MAPQ  BAM
//! s_1.fq    reads/s_1.fq      lib1     NA128   30    alignment/s_1.fq.bam
//! ```
//!
//! Columns other than the ones above are carried through unchanged.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Trim, WriterBuilder};
use log::{debug, info, warn};

use crate::error::{PipelineError, Result};

/// Mapping-quality cutoff used when none is given.
pub const DEFAULT_MAPQ: u32 = 30;

const DEFAULT_MAPQS: &[u32] = &[DEFAULT_MAPQ];

const COL_ID: &str = "ID";
const COL_DATA: &str = "Data";
const COL_LIBRARY: &str = "Library";
const COL_SAMPLE: &str = "Sample";
const COL_MAPQ: &str = "MAPQ";
const COL_BAM: &str = "BAM";

const REQUIRED_COLUMNS: [&str; 5] = [COL_ID, COL_DATA, COL_LIBRARY, COL_SAMPLE, COL_MAPQ];

/// One row of the library file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryEntry {
    pub id: String,
    /// Read file this row describes
    pub data: PathBuf,
    pub library: String,
    pub sample: String,
    pub mapq: u32,
    /// Alignment produced from `data`, filled in after a run
    pub bam: Option<PathBuf>,
    /// Unrecognized columns, by header name
    pub extra: BTreeMap<String, String>,
}

impl LibraryEntry {
    pub fn read_group(&self) -> ReadGroup {
        ReadGroup {
            id: self.id.clone(),
            sample: self.sample.clone(),
            library: self.library.clone(),
        }
    }
}

/// Read-group tags written into the alignment header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadGroup {
    pub id: String,
    pub sample: String,
    pub library: String,
}

impl fmt::Display for ReadGroup {
    /// Renders the `@RG` line with literal `\t` separators, the form bwa's
    /// `-r` option expects.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@RG\\tID:{}\\tSM:{}\\tLB:{}",
            self.id, self.sample, self.library
        )
    }
}

/// The library table and the file backing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryFile {
    path: PathBuf,
    entries: Vec<LibraryEntry>,
    extra_columns: Vec<String>,
}

impl LibraryFile {
    /// Loads a library file.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        info!("Loading library file: {}", path.display());

        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .trim(Trim::All)
            .from_path(&path)?;

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('#').to_string())
            .collect();

        let column = |name: &str| headers.iter().position(|h| h == name);
        let mut required = Vec::with_capacity(REQUIRED_COLUMNS.len());
        for name in REQUIRED_COLUMNS {
            let index = column(name).ok_or_else(|| PipelineError::Library {
                path: path.clone(),
                message: format!("missing column '{}'", name),
            })?;
            required.push(index);
        }
        let bam_column = column(COL_BAM);

        let extra_columns: Vec<String> = headers
            .iter()
            .filter(|h| !REQUIRED_COLUMNS.contains(&h.as_str()) && h.as_str() != COL_BAM)
            .cloned()
            .collect();

        let mut entries = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let field = |index: usize| record.get(index).unwrap_or("").to_string();

            let mapq_text = field(required[4]);
            let mapq = mapq_text.parse().map_err(|_| PipelineError::Library {
                path: path.clone(),
                message: format!("row {}: invalid MAPQ '{}'", row + 1, mapq_text),
            })?;

            let extra = headers
                .iter()
                .enumerate()
                .filter(|(_, h)| extra_columns.contains(h))
                .map(|(i, h)| (h.clone(), field(i)))
                .collect();

            entries.push(LibraryEntry {
                id: field(required[0]),
                data: PathBuf::from(field(required[1])),
                library: field(required[2]),
                sample: field(required[3]),
                mapq,
                bam: bam_column
                    .map(field)
                    .filter(|b| !b.is_empty())
                    .map(PathBuf::from),
                extra,
            });
        }

        debug!("Library file holds {} entries", entries.len());
        Ok(Self {
            path,
            entries,
            extra_columns,
        })
    }

    /// Builds a library table from the run's inputs.
    ///
    /// `mapq` and `libs` may each hold a single value shared by every
    /// input or one value per input. An empty `mapq` means
    /// [`DEFAULT_MAPQ`]; empty `libs` names the library after the sample.
    pub fn from_inputs(
        path: impl Into<PathBuf>,
        inputs: &[PathBuf],
        sample: &str,
        mapq: &[u32],
        libs: &[String],
    ) -> Result<Self> {
        let path = path.into();
        let mapq = if mapq.is_empty() { DEFAULT_MAPQS } else { mapq };

        let mut entries = Vec::with_capacity(inputs.len());
        for (i, input) in inputs.iter().enumerate() {
            let mapq = *per_input(mapq, i, inputs.len(), "--mapq")?;
            let library = if libs.is_empty() {
                sample.to_string()
            } else {
                per_input(libs, i, inputs.len(), "--libs")?.clone()
            };

            let id = input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| input.display().to_string());

            entries.push(LibraryEntry {
                id,
                data: input.clone(),
                library,
                sample: sample.to_string(),
                mapq,
                bam: None,
                extra: BTreeMap::new(),
            });
        }

        info!(
            "Created library table for {} inputs (sample '{}')",
            entries.len(),
            sample
        );

        Ok(Self {
            path,
            entries,
            extra_columns: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[LibraryEntry] {
        &self.entries
    }

    /// Joins relative `Data` paths onto `base`, so rows match read files
    /// given relative to the same directory.
    pub fn resolve_data_paths(&mut self, base: &Path) {
        for entry in &mut self.entries {
            if entry.data.is_relative() {
                entry.data = base.join(&entry.data);
            }
        }
    }

    /// Finds the row for a read file.
    pub fn entry(&self, data: &Path) -> Option<&LibraryEntry> {
        self.entries.iter().find(|e| e.data == data)
    }

    /// Returns the read group of a read file, failing if it has no row.
    pub fn read_group(&self, data: &Path) -> Result<ReadGroup> {
        self.entry(data)
            .map(LibraryEntry::read_group)
            .ok_or_else(|| PipelineError::Library {
                path: self.path.clone(),
                message: format!("no entry for read file '{}'", data.display()),
            })
    }

    /// Records produced BAM paths against their read files.
    ///
    /// With `force` an existing BAM path is overwritten. Returns the number
    /// of rows changed.
    pub fn update_artifacts(&mut self, artifacts: &BTreeMap<PathBuf, PathBuf>, force: bool) -> usize {
        let mut updated = 0;
        for entry in &mut self.entries {
            let Some(bam) = artifacts.get(&entry.data) else {
                continue;
            };
            if entry.bam.is_some() && !force {
                warn!(
                    "Keeping existing BAM for {} (not forced)",
                    entry.data.display()
                );
                continue;
            }
            entry.bam = Some(bam.clone());
            updated += 1;
        }

        for data in artifacts.keys() {
            if self.entry(data).is_none() {
                warn!("No library entry for {}, BAM path not recorded", data.display());
            }
        }

        updated
    }

    /// Writes the table back to its file.
    pub fn save(&self) -> Result<()> {
        let mut writer = WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(&self.path)?;

        let with_bam = self.entries.iter().any(|e| e.bam.is_some());

        let mut header: Vec<&str> = REQUIRED_COLUMNS.to_vec();
        if with_bam {
            header.push(COL_BAM);
        }
        header.extend(self.extra_columns.iter().map(String::as_str));
        writer.write_record(&header)?;

        for entry in &self.entries {
            let mut row = vec![
                entry.id.clone(),
                entry.data.display().to_string(),
                entry.library.clone(),
                entry.sample.clone(),
                entry.mapq.to_string(),
            ];
            if with_bam {
                row.push(
                    entry
                        .bam
                        .as_ref()
                        .map(|b| b.display().to_string())
                        .unwrap_or_default(),
                );
            }
            for column in &self.extra_columns {
                row.push(entry.extra.get(column).cloned().unwrap_or_default());
            }
            writer.write_record(&row)?;
        }

        writer.flush()?;
        info!("Library file written: {}", self.path.display());
        Ok(())
    }
}

fn per_input<'a, T>(values: &'a [T], index: usize, inputs: usize, option: &str) -> Result<&'a T> {
    match values.len() {
        1 => Ok(&values[0]),
        n if n == inputs => Ok(&values[index]),
        n => Err(PipelineError::Config(format!(
            "{} takes one value or one per input ({} inputs, {} values)",
            option, inputs, n
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn inputs() -> Vec<PathBuf> {
        vec![PathBuf::from("reads/a.fq"), PathBuf::from("reads/b.fq")]
    }

    #[test]
    fn test_from_inputs_defaults() {
        let lib = LibraryFile::from_inputs("libs.txt", &inputs(), "NA128", &[], &[]).unwrap();

        assert_eq!(lib.entries().len(), 2);
        let a = lib.entry(Path::new("reads/a.fq")).unwrap();
        assert_eq!(a.id, "a.fq");
        assert_eq!(a.mapq, DEFAULT_MAPQ);
        assert_eq!(a.library, "NA128");
        assert!(a.bam.is_none());
    }

    #[test]
    fn test_from_inputs_per_input_values() {
        let libs = vec!["lib1".to_string(), "lib2".to_string()];
        let lib = LibraryFile::from_inputs("libs.txt", &inputs(), "S", &[20, 25], &libs).unwrap();

        let b = lib.entry(Path::new("reads/b.fq")).unwrap();
        assert_eq!(b.mapq, 25);
        assert_eq!(b.library, "lib2");
    }

    #[test]
    fn test_from_inputs_rejects_wrong_count() {
        let three = vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")];
        let result = LibraryFile::from_inputs("libs.txt", &three, "S", &[20, 25], &[]);
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_read_group_line() {
        let lib = LibraryFile::from_inputs("libs.txt", &inputs(), "NA128", &[], &["L1".into()]).unwrap();
        let rg = lib.read_group(Path::new("reads/a.fq")).unwrap();

        assert_eq!(rg.to_string(), "@RG\\tID:a.fq\\tSM:NA128\\tLB:L1");
    }

    #[test]
    fn test_read_group_missing_entry() {
        let lib = LibraryFile::from_inputs("libs.txt", &inputs(), "S", &[], &[]).unwrap();
        assert!(lib.read_group(Path::new("reads/zzz.fq")).is_err());
    }

    #[test]
    fn test_save_and_load_with_artifacts() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("libs.txt");

        let mut lib = LibraryFile::from_inputs(&path, &inputs(), "S", &[], &[]).unwrap();
        let artifacts: BTreeMap<_, _> = [(
            PathBuf::from("reads/a.fq"),
            PathBuf::from("alignment/a.fq.bam"),
        )]
        .into();
        assert_eq!(lib.update_artifacts(&artifacts, true), 1);
        lib.save().unwrap();

        let loaded = LibraryFile::load(&path).unwrap();
        assert_eq!(
            loaded.entry(Path::new("reads/a.fq")).unwrap().bam,
            Some(PathBuf::from("alignment/a.fq.bam"))
        );
        assert!(loaded.entry(Path::new("reads/b.fq")).unwrap().bam.is_none());
    }

    #[test]
    fn test_resolve_data_paths() {
        let mut lib = LibraryFile::from_inputs(
            "libs.txt",
            &[PathBuf::from("reads/a.fq"), PathBuf::from("/data/b.fq")],
            "NA128",
            &[],
            &[],
        )
        .unwrap();

        lib.resolve_data_paths(Path::new("/launch"));
        assert!(lib.entry(Path::new("/launch/reads/a.fq")).is_some());
        assert!(lib.entry(Path::new("/data/b.fq")).is_some());
        assert!(lib.entry(Path::new("reads/a.fq")).is_none());
    }

    #[test]
    fn test_update_without_force_keeps_existing() {
        let mut lib = LibraryFile::from_inputs("libs.txt", &inputs(), "S", &[], &[]).unwrap();
        let first: BTreeMap<_, _> = [(PathBuf::from("reads/a.fq"), PathBuf::from("old.bam"))].into();
        let second: BTreeMap<_, _> = [(PathBuf::from("reads/a.fq"), PathBuf::from("new.bam"))].into();

        lib.update_artifacts(&first, true);
        assert_eq!(lib.update_artifacts(&second, false), 0);
        assert_eq!(
            lib.entry(Path::new("reads/a.fq")).unwrap().bam,
            Some(PathBuf::from("old.bam"))
        );

        assert_eq!(lib.update_artifacts(&second, true), 1);
        assert_eq!(
            lib.entry(Path::new("reads/a.fq")).unwrap().bam,
            Some(PathBuf::from("new.bam"))
        );
    }

    #[test]
    fn test_load_preserves_extra_columns() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("libs.txt");
        fs::write(
            &path,
            "#ID\tData\tLibrary\tSample\tMAPQ\tPlatform\nr1\tx.fq\tL\tS\t25\tILLUMINA\n",
        )
        .unwrap();

        let lib = LibraryFile::load(&path).unwrap();
        let entry = lib.entry(Path::new("x.fq")).unwrap();
        assert_eq!(entry.mapq, 25);
        assert_eq!(entry.extra.get("Platform").map(String::as_str), Some("ILLUMINA"));

        lib.save().unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.lines().next().unwrap().ends_with("Platform"));
        assert!(content.contains("ILLUMINA"));
    }

    #[test]
    fn test_load_missing_column() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("libs.txt");
        fs::write(&path, "ID\tData\tSample\nr1\tx.fq\tS\n").unwrap();

        match LibraryFile::load(&path) {
            Err(PipelineError::Library { message, .. }) => assert!(message.contains("Library")),
            other => panic!("Expected library error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_invalid_mapq() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("libs.txt");
        fs::write(&path, "ID\tData\tLibrary\tSample\tMAPQ\nr1\tx.fq\tL\tS\thigh\n").unwrap();

        assert!(matches!(
            LibraryFile::load(&path),
            Err(PipelineError::Library { .. })
        ));
    }
}
