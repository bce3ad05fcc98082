//! Example status persistence for selective re-runs.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HarnessError, HarnessResult};

/// Last known outcome of an example.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExampleStatus {
    Passed,
    Failed,
    Excluded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: ExampleStatus,
    pub run_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StatusFile {
    examples: BTreeMap<String, StatusRecord>,
}

/// Pass/fail history keyed by example id, backed by a JSON file.
#[derive(Debug)]
pub struct StatusStore {
    path: PathBuf,
    examples: BTreeMap<String, StatusRecord>,
}

impl StatusStore {
    /// Load the history at `path`; a missing file yields an empty store.
    pub fn load(path: impl Into<PathBuf>) -> HarnessResult<Self> {
        let path = path.into();
        let examples = match fs::read_to_string(&path) {
            Ok(contents) => {
                let file: StatusFile = serde_json::from_str(&contents)
                    .map_err(|err| HarnessError::status_file(&path, err.to_string()))?;
                file.examples
            }
            Err(err) if err.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(HarnessError::status_file(&path, err.to_string())),
        };
        debug!(path = %path.display(), examples = examples.len(), "loaded example status");
        Ok(Self { path, examples })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&StatusRecord> {
        self.examples.get(id)
    }

    pub fn status_of(&self, id: &str) -> Option<ExampleStatus> {
        self.get(id).map(|record| record.status)
    }

    pub fn has_failed(&self, id: &str) -> bool {
        self.status_of(id) == Some(ExampleStatus::Failed)
    }

    pub fn record(&mut self, id: impl Into<String>, status: ExampleStatus, run_at: DateTime<Utc>) {
        self.examples
            .insert(id.into(), StatusRecord { status, run_at });
    }

    /// Record a status only for examples with no history yet.
    pub fn record_if_absent(
        &mut self,
        id: impl Into<String>,
        status: ExampleStatus,
        run_at: DateTime<Utc>,
    ) {
        self.examples
            .entry(id.into())
            .or_insert(StatusRecord { status, run_at });
    }

    /// Ids of every example whose last status is a failure.
    pub fn failures(&self) -> Vec<&str> {
        self.examples
            .iter()
            .filter(|(_, record)| record.status == ExampleStatus::Failed)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Atomically write the history back (temp file + rename).
    pub fn save(&self) -> HarnessResult<()> {
        debug!(path = %self.path.display(), examples = self.examples.len(), "writing example status");
        let file = StatusFile {
            examples: self.examples.clone(),
        };
        let mut buf = serde_json::to_string_pretty(&file)?;
        buf.push('\n');

        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|err| HarnessError::status_file(parent, err.to_string()))?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, buf)
            .map_err(|err| HarnessError::status_file(&tmp_path, err.to_string()))?;
        fs::rename(&tmp_path, &self.path)
            .map_err(|err| HarnessError::status_file(&self.path, err.to_string()))?;
        Ok(())
    }
}
