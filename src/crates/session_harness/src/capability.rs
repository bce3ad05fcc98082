//! Runtime capability snapshot and the typed requirements examples declare.

use std::env;
use std::fmt;
use std::path::Path;
use std::process::Command;
use std::str::FromStr;

use semver::{Version, VersionReq};
use tracing::{debug, warn};

use crate::config::{
    CI_VAR, IGNORE_VERSION_FILTERS_VAR, MANAGER_UPSTREAM_VAR, REALWORLD_TESTS_VAR, SUDO_TESTS_VAR,
};
use crate::error::{HarnessError, HarnessResult};

/// Parse a loosely formatted version such as `2.6`, `3.1.0.pre1` or
/// `2.39.2.windows.1` into `major.minor.patch`.
pub fn parse_loose_version(input: &str) -> HarnessResult<Version> {
    let trimmed = input.trim();
    let text = trimmed.strip_prefix('v').unwrap_or(trimmed);

    let mut numbers = Vec::with_capacity(3);
    for part in text.split('.') {
        let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
        if digits.is_empty() {
            break;
        }
        let value = digits
            .parse::<u64>()
            .map_err(|err| HarnessError::version(input, err.to_string()))?;
        numbers.push(value);
        if numbers.len() == 3 || digits.len() != part.len() {
            break;
        }
    }

    if numbers.is_empty() {
        return Err(HarnessError::version(input, "no numeric component"));
    }
    numbers.resize(3, 0);
    Ok(Version::new(numbers[0], numbers[1], numbers[2]))
}

/// A version constraint attached to an example.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRequirement {
    /// A bare version: the runtime must be at least this version.
    AtLeast(Version),
    /// A comparator list such as `>= 2.3, < 3`.
    Matches(VersionReq),
}

impl VersionRequirement {
    pub fn parse(input: &str) -> HarnessResult<Self> {
        let trimmed = input.trim();
        if trimmed.starts_with(|c: char| c.is_ascii_digit() || c == 'v') {
            return parse_loose_version(trimmed).map(VersionRequirement::AtLeast);
        }

        let comparators = trimmed
            .split(',')
            .map(|part| translate_pessimistic(part.trim()))
            .collect::<HarnessResult<Vec<_>>>()?
            .join(", ");
        VersionReq::parse(&comparators)
            .map(VersionRequirement::Matches)
            .map_err(|err| HarnessError::version(input, err.to_string()))
    }

    pub fn satisfied_by(&self, version: &Version) -> bool {
        match self {
            VersionRequirement::AtLeast(minimum) => version >= minimum,
            VersionRequirement::Matches(req) => req.matches(version),
        }
    }
}

impl FromStr for VersionRequirement {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionRequirement::AtLeast(minimum) => write!(f, ">= {minimum}"),
            VersionRequirement::Matches(req) => write!(f, "{req}"),
        }
    }
}

// `~> 2.1` allows 2.x from 2.1 on; `~> 2.1.3` allows 2.1.x from 2.1.3 on.
fn translate_pessimistic(comparator: &str) -> HarnessResult<String> {
    let Some(rest) = comparator.strip_prefix("~>") else {
        return Ok(comparator.to_string());
    };
    let rest = rest.trim();
    let floor = parse_loose_version(rest)?;
    let segments = rest.split('.').count();
    let ceiling = if segments >= 3 {
        Version::new(floor.major, floor.minor + 1, 0)
    } else {
        Version::new(floor.major + 1, 0, 0)
    };
    Ok(format!(">={floor}, <{ceiling}"))
}

/// A capability an example needs in order to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Constraint on the language runtime version.
    Runtime(VersionRequirement),
    /// Constraint on the package manager version.
    Manager(VersionRequirement),
    /// Constraint on the embedded version-control tool version.
    Vcs(VersionRequirement),
    /// Needs network access.
    Network,
    /// Needs elevated privileges.
    Privileged,
    /// Only meaningful against the package manager's upstream branch.
    ManagerUpstream,
}

impl Requirement {
    pub fn runtime(requirement: &str) -> HarnessResult<Self> {
        VersionRequirement::parse(requirement).map(Requirement::Runtime)
    }

    pub fn manager(requirement: &str) -> HarnessResult<Self> {
        VersionRequirement::parse(requirement).map(Requirement::Manager)
    }

    pub fn vcs(requirement: &str) -> HarnessResult<Self> {
        VersionRequirement::parse(requirement).map(Requirement::Vcs)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Runtime(req) => write!(f, "runtime {req}"),
            Requirement::Manager(req) => write!(f, "manager {req}"),
            Requirement::Vcs(req) => write!(f, "git {req}"),
            Requirement::Network => f.write_str("network"),
            Requirement::Privileged => f.write_str("sudo"),
            Requirement::ManagerUpstream => f.write_str("manager upstream"),
        }
    }
}

/// What the current run can offer, built once before any example is filtered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeCapabilities {
    pub runtime_version: Version,
    pub manager_version: Version,
    /// `None` when no version-control tool could be found.
    pub vcs_version: Option<Version>,
    pub network_enabled: bool,
    pub privileged_enabled: bool,
    pub version_filters_ignored: bool,
    pub manager_upstream: bool,
    pub ci: bool,
}

impl RuntimeCapabilities {
    /// Capabilities with every optional feature disabled.
    pub fn new(runtime_version: Version, manager_version: Version) -> Self {
        Self {
            runtime_version,
            manager_version,
            vcs_version: None,
            network_enabled: false,
            privileged_enabled: false,
            version_filters_ignored: false,
            manager_upstream: false,
            ci: false,
        }
    }

    /// Probe the environment: override variables, `git --version` and `sudo`.
    pub fn detect(runtime_version: &str, manager_version: &str) -> HarnessResult<Self> {
        let mut caps = Self::new(
            parse_loose_version(runtime_version)?,
            parse_loose_version(manager_version)?,
        );
        caps.vcs_version = detect_vcs_version();
        caps.network_enabled = flag_set(REALWORLD_TESTS_VAR);
        caps.privileged_enabled = flag_set(SUDO_TESTS_VAR) && executable_on_path("sudo");
        caps.version_filters_ignored = flag_set(IGNORE_VERSION_FILTERS_VAR);
        caps.manager_upstream = env::var(MANAGER_UPSTREAM_VAR).is_ok_and(|value| value == "master");
        caps.ci = env::var_os(CI_VAR).is_some();

        debug!(
            runtime = %caps.runtime_version,
            manager = %caps.manager_version,
            vcs = ?caps.vcs_version.as_ref().map(ToString::to_string),
            network = caps.network_enabled,
            privileged = caps.privileged_enabled,
            "detected runtime capabilities"
        );
        Ok(caps)
    }

    pub fn with_vcs_version(mut self, version: Version) -> Self {
        self.vcs_version = Some(version);
        self
    }

    pub fn with_network(mut self, enabled: bool) -> Self {
        self.network_enabled = enabled;
        self
    }

    pub fn with_privileged(mut self, enabled: bool) -> Self {
        self.privileged_enabled = enabled;
        self
    }

    pub fn with_version_filters_ignored(mut self, ignored: bool) -> Self {
        self.version_filters_ignored = ignored;
        self
    }

    pub fn with_manager_upstream(mut self, upstream: bool) -> Self {
        self.manager_upstream = upstream;
        self
    }

    pub fn with_ci(mut self, ci: bool) -> Self {
        self.ci = ci;
        self
    }
}

/// Ask the installed `git` for its version.
pub fn detect_vcs_version() -> Option<Version> {
    let output = match Command::new("git").arg("--version").output() {
        Ok(output) if output.status.success() => output,
        Ok(output) => {
            warn!(status = %output.status, "git --version failed");
            return None;
        }
        Err(err) => {
            debug!(%err, "git not available");
            return None;
        }
    };
    parse_vcs_output(&String::from_utf8_lossy(&output.stdout))
}

fn parse_vcs_output(output: &str) -> Option<Version> {
    let needle = "git version";
    let lower = output.to_ascii_lowercase();
    let idx = lower.find(needle)?;
    let after = output[idx + needle.len()..].trim();
    parse_loose_version(after.split_whitespace().next()?).ok()
}

fn flag_set(var: &str) -> bool {
    env::var_os(var).is_some_and(|value| !value.is_empty())
}

fn executable_on_path(name: &str) -> bool {
    let Some(paths) = env::var_os("PATH") else {
        return false;
    };
    env::split_paths(&paths).any(|dir| is_file(&dir.join(name)))
}

fn is_file(path: &Path) -> bool {
    path.metadata().map(|meta| meta.is_file()).unwrap_or(false)
}
