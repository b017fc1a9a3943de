//! Engine configuration.
//!
//! Every knob has a default and can be loaded from a YAML file; the CLI layers
//! per-call overrides on top. Defaults:
//!
//! | setting                            | default     |
//! |------------------------------------|-------------|
//! | `limits.max_bytes`                 | 100 MiB     |
//! | `limits.max_rows`                  | 1 000 000   |
//! | `limits.preview_rows`              | 5           |
//! | `inference.sample_threshold`       | 10 000 rows |
//! | `inference.sample_size`            | 2 000 cells |
//! | `inference.discrete_ratio`         | 0.7         |
//! | `inference.categorical_ratio`      | 0.5         |
//! | `inference.identifier_uniqueness`  | 0.95        |
//! | `stats.top_k`                      | 10          |
//! | `chart.sample_rows`                | 1 000       |
//! | `chart.max_categories`             | 50          |

use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_BYTES: u64 = 100 * 1024 * 1024;
pub const DEFAULT_MAX_ROWS: usize = 1_000_000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub limits: SizeLimits,
    pub read: ReadSettings,
    pub inference: InferenceOptions,
    pub stats: StatsOptions,
    pub chart: ChartOptions,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let config = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config file {path:?}"))?;
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeLimits {
    pub max_bytes: u64,
    pub max_rows: usize,
    pub preview_rows: usize,
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            max_rows: DEFAULT_MAX_ROWS,
            preview_rows: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadSettings {
    /// Field delimiter for delimited text; sniffed when unset.
    pub delimiter: Option<char>,
    /// `encoding_rs` label for delimited text; UTF-8 when unset.
    pub encoding: Option<String>,
    /// Zero-based worksheet index for spreadsheets.
    pub sheet: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceOptions {
    pub sample_threshold: usize,
    pub sample_size: usize,
    pub discrete_ratio: f64,
    pub categorical_ratio: f64,
    pub identifier_uniqueness: f64,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            sample_threshold: 10_000,
            sample_size: 2_000,
            discrete_ratio: 0.7,
            categorical_ratio: 0.5,
            identifier_uniqueness: 0.95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsOptions {
    pub top_k: usize,
}

impl Default for StatsOptions {
    fn default() -> Self {
        Self { top_k: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartOptions {
    pub sample_rows: usize,
    pub max_categories: usize,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            sample_rows: 1_000,
            max_categories: 50,
        }
    }
}
