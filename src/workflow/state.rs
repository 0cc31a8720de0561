//! Run Record Persistence
//!
//! After submission every run writes what it submitted to
//! `<workdir>/.genobox/<label>.json`: the handles of each batch and the
//! alignment each read file maps to. The record lets an operator trace
//! cluster jobs back to inputs after the fact. Dry runs write no record.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::model::JobHandle;

/// Directory under the working directory holding run bookkeeping.
pub const STATE_DIR: &str = ".genobox";

/// What one pipeline run submitted.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RunRecord {
    /// Label of the semaphore group the run waited on
    pub label: String,

    pub started: DateTime<Local>,

    /// Batch name -> handles, in submission order
    pub batches: BTreeMap<String, Vec<JobHandle>>,

    /// Read file -> alignment produced from it
    pub artifacts: BTreeMap<PathBuf, PathBuf>,
}

impl RunRecord {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            started: Local::now(),
            batches: BTreeMap::new(),
            artifacts: BTreeMap::new(),
        }
    }

    /// Appends handles submitted under `batch`.
    pub fn record_batch(&mut self, batch: &str, handles: &[JobHandle]) {
        self.batches
            .entry(batch.to_string())
            .or_default()
            .extend(handles.iter().cloned());
    }

    pub fn record_artifacts(&mut self, artifacts: &BTreeMap<PathBuf, PathBuf>) {
        self.artifacts
            .extend(artifacts.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    pub fn job_count(&self) -> usize {
        self.batches.values().map(Vec::len).sum()
    }

    /// Saves the record under `working_dir` and returns its path.
    pub fn save(&self, working_dir: &Path) -> Result<PathBuf> {
        let dir = working_dir.join(STATE_DIR);
        fs::create_dir_all(&dir)?;

        let record_file = Self::record_path(working_dir, &self.label);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&record_file, json)?;

        info!("Saved run record to {}", record_file.display());
        Ok(record_file)
    }

    /// Loads the record of run `label` from `working_dir`.
    pub fn load(working_dir: &Path, label: &str) -> Result<Self> {
        let content = fs::read_to_string(Self::record_path(working_dir, label))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn record_path(working_dir: &Path, label: &str) -> PathBuf {
        working_dir.join(STATE_DIR).join(format!("{}.json", label))
    }
}
