//! In-memory, editable view of a step's source files.
//!
//! The FileSet is rebuilt from the step's persisted modules whenever they
//! change and is never the system of record: edits land here first and reach
//! the store through the [`EditDebouncer`].

pub mod debounce;

pub use debounce::{EditDebouncer, EditSink, ModuleSink, PersistFailure};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::store::models::CodeModule;

/// A single file handed to the sandbox bundler. Exactly one asset per
/// dispatch is marked as the execution entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Asset {
    pub name: String,
    pub content: String,
    #[serde(rename = "isEntry")]
    pub is_entry: bool,
}

/// Test modules are recognized by name. Generated checkpoint modules are
/// always `checkpoint-{n}.spec.ts`.
pub fn is_test_path(name: &str) -> bool {
    name.contains("spec")
}

/// Pick the file a non-test run should execute. Priority: the explicit
/// entry module, then `app.tsx`, then `index.html`, then the first
/// non-test file.
pub fn entry_path(modules: &[CodeModule]) -> Option<String> {
    if let Some(module) = modules.iter().find(|m| m.is_entry) {
        return Some(module.name.clone());
    }
    for candidate in ["app.tsx", "index.html"] {
        if modules.iter().any(|m| m.name == candidate) {
            return Some(candidate.to_string());
        }
    }
    modules
        .iter()
        .find(|m| !is_test_path(&m.name))
        .map(|m| m.name.clone())
}

/// Mapping from file path to source text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileSet {
    files: BTreeMap<String, String>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconstruct the file set from a step's persisted modules.
    pub fn from_modules(modules: &[CodeModule]) -> Self {
        let files = modules
            .iter()
            .map(|m| (m.name.clone(), m.value.clone()))
            .collect();
        Self { files }
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn set(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }

    pub fn remove(&mut self, path: &str) -> Option<String> {
        self.files.remove(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// A copy with all test files stripped, used for code (non-test) runs so
    /// the bundler never ships checkpoint specs to the preview.
    pub fn without_tests(&self) -> Self {
        let files = self
            .files
            .iter()
            .filter(|(name, _)| !is_test_path(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Self { files }
    }

    /// Snapshot the file set as sandbox assets, overlaying `run_path` with
    /// `run_value` (the editor's latest buffer may be newer than the map).
    ///
    /// Entry marking differs by run type: a test run executes the test file
    /// itself; a code run enters through `index.html`.
    pub fn assets(&self, run_path: &str, run_value: &str, is_test: bool) -> Vec<Asset> {
        let mut files = self.files.clone();
        files.insert(run_path.to_string(), run_value.to_string());
        files
            .into_iter()
            .map(|(name, content)| Asset {
                is_entry: if is_test {
                    name == run_path
                } else {
                    name == "index.html"
                },
                name,
                content,
            })
            .collect()
    }
}
