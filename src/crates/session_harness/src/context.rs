//! Explicit representation of the process-wide state an example can disturb.
//!
//! The harness captures an [`AmbientContext`] once as the baseline and, after
//! every example, computes an [`EnvDiff`] between the live process and the
//! baseline and re-applies it. Subprocesses are configured from a context
//! value rather than from whatever the process happens to hold.

use std::collections::BTreeMap;
use std::env;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::{HarnessError, HarnessResult};

/// Working directory plus environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbientContext {
    working_dir: PathBuf,
    env: BTreeMap<OsString, OsString>,
}

impl AmbientContext {
    pub fn new(working_dir: impl Into<PathBuf>, env: BTreeMap<OsString, OsString>) -> Self {
        Self {
            working_dir: working_dir.into(),
            env,
        }
    }

    /// Snapshot the live process state.
    pub fn capture() -> HarnessResult<Self> {
        Self::capture_excluding(&[])
    }

    /// Snapshot the live process state, dropping variables whose names start
    /// with any of `prefixes`.
    pub fn capture_excluding(prefixes: &[String]) -> HarnessResult<Self> {
        let working_dir = env::current_dir()
            .map_err(|err| HarnessError::capture(format!("current directory: {err}")))?;
        let env = env::vars_os()
            .filter(|(key, _)| !has_prefix(key, prefixes))
            .collect();
        Ok(Self { working_dir, env })
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn env(&self) -> &BTreeMap<OsString, OsString> {
        &self.env
    }

    pub fn var(&self, key: impl AsRef<OsStr>) -> Option<&OsStr> {
        self.env.get(key.as_ref()).map(OsString::as_os_str)
    }

    pub fn set_var(&mut self, key: impl Into<OsString>, value: impl Into<OsString>) {
        self.env.insert(key.into(), value.into());
    }

    pub fn remove_var(&mut self, key: impl AsRef<OsStr>) {
        self.env.remove(key.as_ref());
    }

    pub fn set_working_dir(&mut self, dir: impl Into<PathBuf>) {
        self.working_dir = dir.into();
    }

    /// Changes needed to turn `current` into `self`.
    pub fn diff_from(&self, current: &AmbientContext) -> EnvDiff {
        let set = self
            .env
            .iter()
            .filter(|(key, value)| current.env.get(*key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let removed = current
            .env
            .keys()
            .filter(|key| !self.env.contains_key(*key))
            .cloned()
            .collect();
        EnvDiff { set, removed }
    }

    /// Make the live process match this context, then verify it does.
    pub fn restore(&self) -> HarnessResult<()> {
        env::set_current_dir(&self.working_dir).map_err(|err| {
            HarnessError::restore(format!(
                "working directory {}: {err}",
                self.working_dir.display()
            ))
        })?;

        let live = Self::capture().map_err(|err| HarnessError::restore(err.to_string()))?;
        let diff = self.diff_from(&live);
        if !diff.is_empty() {
            debug!(
                set = diff.set.len(),
                removed = diff.removed.len(),
                "reapplying environment baseline"
            );
            diff.apply();
        }

        let after = Self::capture().map_err(|err| HarnessError::restore(err.to_string()))?;
        let residue = self.diff_from(&after);
        if !residue.is_empty() {
            return Err(HarnessError::restore(format!(
                "environment still differs from baseline ({residue})"
            )));
        }
        Ok(())
    }

    /// Configure a command to run with exactly this context.
    pub fn configure(&self, command: &mut Command) {
        command
            .current_dir(&self.working_dir)
            .env_clear()
            .envs(&self.env);
    }
}

/// Difference between two environments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvDiff {
    /// Variables to add or overwrite.
    pub set: Vec<(OsString, OsString)>,
    /// Variables to remove.
    pub removed: Vec<OsString>,
}

impl EnvDiff {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.removed.is_empty()
    }

    /// Apply the difference to the live process environment.
    ///
    /// Keys the platform cannot represent through `set_var` are skipped; the
    /// verification in [`AmbientContext::restore`] reports them.
    pub fn apply(&self) {
        for key in &self.removed {
            if settable(key) {
                env::remove_var(key);
            }
        }
        for (key, value) in &self.set {
            if settable(key) && !value.to_string_lossy().contains('\0') {
                env::set_var(key, value);
            }
        }
    }
}

impl std::fmt::Display for EnvDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let set: Vec<_> = self.set.iter().map(|(key, _)| key.to_string_lossy()).collect();
        let removed: Vec<_> = self.removed.iter().map(|key| key.to_string_lossy()).collect();
        write!(f, "set [{}], removed [{}]", set.join(", "), removed.join(", "))
    }
}

fn has_prefix(key: &OsStr, prefixes: &[String]) -> bool {
    let key = key.to_string_lossy();
    prefixes.iter().any(|prefix| key.starts_with(prefix.as_str()))
}

fn settable(key: &OsStr) -> bool {
    let text = key.to_string_lossy();
    !text.is_empty() && !text.contains('=') && !text.contains('\0')
}
