//! Tool Path Resolution
//!
//! Locates the external tool installations (bwa, samtools, the Moab
//! client) and the scheduler settings for a run.
//!
//! # Settings Resolution Priority
//!
//! The settings file is resolved in the following order:
//! 1. Explicit path (`--config`)
//! 2. `GENOBOX_CONFIG` environment variable
//! 3. `genobox.yaml` next to the executable
//! 4. `genobox.yaml` in the current directory
//! 5. Built-in defaults (every tool taken from `PATH`)
//!
//! Per-tool environment variables (`GENOBOX_BWA_HOME`, ...) override
//! whatever the file says.
//!
//! # Example YAML Format
//!
//! ```yaml
//! tools:
//!   bwa_home: /tools/bwa-0.5.9
//!   samtools_home: /tools/samtools-0.1.18
//! scheduler:
//!   backend: moab
//!   queue: cbs
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Name of the settings file searched for beside the executable and in the cwd.
pub const SETTINGS_FILE: &str = "genobox.yaml";

/// Environment variable naming an explicit settings file.
pub const SETTINGS_ENV: &str = "GENOBOX_CONFIG";

/// Installation directories of the external tools.
///
/// An unset directory means the tool is looked up on `PATH`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ToolPaths {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bwa_home: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samtools_home: Option<PathBuf>,

    /// samtools build used by the filter/sort utility
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samtools_svn_home: Option<PathBuf>,

    /// Directory holding `msub` and `mjobctl`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler_home: Option<PathBuf>,
}

impl ToolPaths {
    pub fn bwa(&self) -> String {
        tool_in(&self.bwa_home, "bwa")
    }

    pub fn samtools(&self) -> String {
        tool_in(&self.samtools_home, "samtools")
    }

    /// samtools for filter/sort, falling back to the regular samtools install.
    pub fn samtools_svn(&self) -> String {
        match &self.samtools_svn_home {
            Some(_) => tool_in(&self.samtools_svn_home, "samtools"),
            None => self.samtools(),
        }
    }

    pub fn scheduler_tool(&self, name: &str) -> String {
        tool_in(&self.scheduler_home, name)
    }

    /// Applies `GENOBOX_*_HOME` overrides read through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let overrides: [(&str, &mut Option<PathBuf>); 4] = [
            ("GENOBOX_BWA_HOME", &mut self.bwa_home),
            ("GENOBOX_SAMTOOLS_HOME", &mut self.samtools_home),
            ("GENOBOX_SAMTOOLS_SVN_HOME", &mut self.samtools_svn_home),
            ("GENOBOX_SCHEDULER_HOME", &mut self.scheduler_home),
        ];

        for (var, slot) in overrides {
            if let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) {
                debug!("{} overrides tool directory: {}", var, value);
                *slot = Some(PathBuf::from(value));
            }
        }
    }
}

fn tool_in(home: &Option<PathBuf>, name: &str) -> String {
    match home {
        Some(dir) => dir.join(name).display().to_string(),
        None => name.to_string(),
    }
}

/// Which scheduler receives the jobs.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Moab cluster scheduler (`msub`)
    #[default]
    Moab,
    /// Run every job on this machine with bash
    Local,
}

/// Scheduler settings for a run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    #[serde(default)]
    pub backend: Backend,

    #[serde(default = "default_queue")]
    pub queue: String,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_queue() -> String {
    "cbs".to_string()
}

fn default_poll_interval() -> u64 {
    60
}

fn default_timeout() -> u64 {
    86_400
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            queue: default_queue(),
            poll_interval_secs: default_poll_interval(),
            timeout_secs: default_timeout(),
        }
    }
}

impl SchedulerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Resolved settings handed to every component that runs external tools.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub tools: ToolPaths,

    #[serde(default)]
    pub scheduler: SchedulerSettings,
}

impl Settings {
    /// Reads settings from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read settings file '{}': {}", path.display(), e))
        })?;
        let settings: Settings = serde_yaml::from_str(&content)?;
        Ok(settings)
    }

    /// Resolves settings following the documented priority, then applies
    /// the per-tool environment overrides.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        Self::resolve_with(explicit, |var| std::env::var(var).ok())
    }

    fn resolve_with(
        explicit: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut settings = match locate_settings_file(explicit, &lookup)? {
            Some(path) => {
                info!("Using settings: {}", path.display());
                Self::from_file(&path)?
            }
            None => {
                info!("No {} found, taking tools from PATH", SETTINGS_FILE);
                Self::default()
            }
        };

        settings.tools.apply_overrides(lookup);
        Ok(settings)
    }
}

fn locate_settings_file(
    explicit: Option<&Path>,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<Option<PathBuf>> {
    // Explicitly named files must exist
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(PipelineError::Config(format!(
                "settings file does not exist: {}",
                path.display()
            )));
        }
        return Ok(Some(path.to_path_buf()));
    }

    if let Some(path) = lookup(SETTINGS_ENV).filter(|v| !v.trim().is_empty()) {
        let path = PathBuf::from(path);
        if !path.exists() {
            return Err(PipelineError::Config(format!(
                "{} points to a missing file: {}",
                SETTINGS_ENV,
                path.display()
            )));
        }
        return Ok(Some(path));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            let beside_exe = exe_dir.join(SETTINGS_FILE);
            if beside_exe.exists() {
                return Ok(Some(beside_exe));
            }
        }
    }

    let cwd_path = PathBuf::from(SETTINGS_FILE);
    if cwd_path.exists() {
        return Ok(Some(cwd_path));
    }

    Ok(None)
}
