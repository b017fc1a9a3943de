#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tabular_insight::{
    config::InferenceOptions,
    data::Dataset,
    format::{FormatAdapter, ReadOptions, delimited::DelimitedAdapter},
    infer,
};
use tempfile::{TempDir, tempdir};

pub const PEOPLE_CSV: &str = "name,age\nAlice,30\nBob,\nCara,25\n";
pub const SALES_CSV: &str = "region,sales\nEU,10\nUS,5\nEU,20\n";

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, contents).expect("write temp file");
        path
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }
}

/// Reads delimited text and annotates it with default inference settings.
pub fn annotated_csv(text: &str) -> Dataset {
    let dataset = DelimitedAdapter
        .read(text.as_bytes(), &ReadOptions::default())
        .expect("read csv");
    infer::infer(dataset, &InferenceOptions::default())
}
