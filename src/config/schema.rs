//! Deserializable configuration schema, loaded from TOML.
//!
//! Split from [`crate::config::RunConfig`] because `RunConfig` carries a
//! runtime-only `progress_sink` callback that cannot be deserialized; this
//! schema is the part a config file can actually describe, resolved into a
//! `RunConfig` once the runtime-only pieces are supplied.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::RunMode;

fn default_max_workers() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_mode() -> RunMode {
    RunMode::PerTest
}

/// The on-disk shape of a dispatcher configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default = "default_mode")]
    pub mode: RunMode,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub test_selector: SelectorConfig,
    #[serde(default)]
    pub framework_options: HashMap<String, String>,
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
}

/// On-disk selector: either a glob string or an explicit file list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectorConfig {
    Glob(String),
    Paths(Vec<PathBuf>),
}
