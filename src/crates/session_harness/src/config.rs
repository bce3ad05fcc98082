use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

use tracing::warn;

/// Enables examples tagged as needing elevated privileges.
pub const SUDO_TESTS_VAR: &str = "HARNESS_SUDO_TESTS";
/// Enables examples tagged as needing network access.
pub const REALWORLD_TESTS_VAR: &str = "HARNESS_REALWORLD_TESTS";
/// Disables exclusion by runtime, manager and version-control version tags.
pub const IGNORE_VERSION_FILTERS_VAR: &str = "HARNESS_IGNORE_VERSION_FILTERS";
/// Set to `master` when the package manager under test tracks upstream.
pub const MANAGER_UPSTREAM_VAR: &str = "HARNESS_MANAGER_UPSTREAM";
/// Presence disables focus filtering.
pub const CI_VAR: &str = "CI";
/// Overrides the fail-fast threshold.
pub const FAIL_FAST_VAR: &str = "HARNESS_FAIL_FAST";
/// Terminal width seen by spawned commands.
pub const COLUMNS_VAR: &str = "COLUMNS";
/// Marks the process tree as running under the harness.
pub const SPEC_RUN_VAR: &str = "HARNESS_SPEC_RUN";

/// Failures tolerated before the remaining examples are skipped.
pub const DEFAULT_FAIL_FAST: usize = 25;

/// Which examples to schedule, based on persisted status history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunSelection {
    /// Run every example that passes the tag filters.
    #[default]
    All,
    /// Run only examples whose last recorded status is a failure.
    OnlyFailures,
    /// Like [`RunSelection::OnlyFailures`], but stop at the first failure.
    NextFailure,
}

/// Appends a value to an environment variable so every spawned subprocess
/// pre-loads a helper (for example `RUBYOPT=-r/path/to/hax.rb`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadHook {
    pub var: String,
    pub value: String,
}

impl PreloadHook {
    pub fn new(var: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            value: value.into(),
        }
    }

    /// Combine the hook with the variable's current value.
    pub fn apply_to(&self, current: Option<&str>) -> String {
        match current.map(str::trim).filter(|value| !value.is_empty()) {
            Some(existing) => format!("{existing} {}", self.value),
            None => self.value.clone(),
        }
    }
}

/// Session-level configuration for a harness run.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Root of the suite; rejected when it contains special characters.
    pub root: PathBuf,
    /// Scratch tree holding fixtures, the app root and log files.
    pub scratch_dir: PathBuf,
    /// Example status persistence file; `None` disables persistence.
    pub status_file: Option<PathBuf>,
    /// Number of failures after which no further examples are scheduled.
    pub fail_fast: Option<usize>,
    /// Env-var prefixes dropped from the baseline, and so cleared after every example.
    pub volatile_env_prefixes: Vec<String>,
    /// Variables set once for the whole run, before the baseline is captured.
    pub run_env: BTreeMap<String, String>,
    /// Optional helper pre-loaded into every spawned subprocess.
    pub preload: Option<PreloadHook>,
    /// Echo captured output of failing examples to stderr.
    pub echo_failure_output: bool,
    /// Mirror error and fatal log lines to stdout.
    pub log_stdout_mirror: bool,
    /// Selective re-run mode.
    pub selection: RunSelection,
}

impl HarnessConfig {
    /// Create a config rooted at the given suite directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut run_env = BTreeMap::new();
        run_env.insert(COLUMNS_VAR.to_string(), "10000".to_string());
        run_env.insert(SPEC_RUN_VAR.to_string(), "true".to_string());

        Self {
            scratch_dir: root.join("tmp"),
            status_file: Some(root.join(".harness_status.json")),
            root,
            fail_fast: Some(DEFAULT_FAIL_FAST),
            volatile_env_prefixes: Vec::new(),
            run_env,
            preload: None,
            echo_failure_output: false,
            log_stdout_mirror: false,
            selection: RunSelection::All,
        }
    }

    /// Build a config and layer overrides read from the process environment.
    pub fn from_env(root: impl Into<PathBuf>) -> Self {
        let mut config = Self::new(root);
        if let Ok(raw) = env::var(FAIL_FAST_VAR) {
            match raw.trim().parse::<usize>() {
                Ok(0) => config.fail_fast = None,
                Ok(threshold) => config.fail_fast = Some(threshold),
                Err(err) => warn!(var = FAIL_FAST_VAR, value = %raw, %err, "ignoring invalid fail-fast threshold"),
            }
        }
        config
    }

    /// Override the scratch directory.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Override the status persistence file.
    pub fn with_status_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.status_file = Some(path.into());
        self
    }

    /// Disable status persistence.
    pub fn without_status_file(mut self) -> Self {
        self.status_file = None;
        self
    }

    /// Override the fail-fast threshold; zero disables it.
    pub fn with_fail_fast(mut self, threshold: usize) -> Self {
        self.fail_fast = (threshold > 0).then_some(threshold);
        self
    }

    /// Drop variables starting with `prefix` from the baseline.
    pub fn with_volatile_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.volatile_env_prefixes.push(prefix.into());
        self
    }

    /// Set a variable for the whole run.
    pub fn with_run_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.run_env.insert(key.into(), value.into());
        self
    }

    /// Pre-load a helper into spawned subprocesses through `var`.
    pub fn with_preload(mut self, var: impl Into<String>, value: impl Into<String>) -> Self {
        self.preload = Some(PreloadHook::new(var, value));
        self
    }

    /// Echo captured output of failing examples to stderr.
    pub fn with_echo_failure_output(mut self, echo: bool) -> Self {
        self.echo_failure_output = echo;
        self
    }

    /// Mirror error and fatal log lines to stdout.
    pub fn with_log_stdout_mirror(mut self, mirror: bool) -> Self {
        self.log_stdout_mirror = mirror;
        self
    }

    /// Select which examples to schedule.
    pub fn with_selection(mut self, selection: RunSelection) -> Self {
        self.selection = selection;
        self
    }
}
