//! Lifecycle harness that isolates every example of a test session.
//!
//! The harness captures the working directory and environment once, resets a
//! scratch tree and enters a fresh app root before each example, and restores
//! the captured baseline afterwards. Examples declare the capabilities they
//! need and are filtered against a single runtime snapshot.
//!
//! Typical usage:
//! ```no_run
//! use session_harness::{
//!     Example, ExampleFailure, HarnessConfig, Requirement, RuntimeCapabilities, SessionHarness,
//! };
//!
//! let config = HarnessConfig::from_env("/path/to/suite").with_volatile_env_prefix("BUNDLER_");
//! let caps = RuntimeCapabilities::detect("2.6.3", "3.0.3").expect("capabilities");
//! let mut harness = SessionHarness::initialize(config, caps).expect("baseline captured");
//!
//! let examples = vec![
//!     Example::new("install::creates_lockfile", |ctx| {
//!         let mut cmd = ctx.command("bundle");
//!         cmd.arg("install");
//!         let output = ctx.run_command(&mut cmd)?;
//!         if !output.success() {
//!             return Err(ExampleFailure::new("bundle install failed"));
//!         }
//!         Ok(())
//!     }),
//!     Example::new("install::from_rubygems", |_ctx| Ok(())).requires(Requirement::Network),
//! ];
//!
//! let report = harness.run(examples).expect("run should not abort");
//! println!("{} passed, {} failed", report.passed(), report.failed());
//! ```

mod capability;
mod config;
mod context;
mod error;
mod example;
mod filter;
mod harness;
mod log_sink;
pub mod logging;
mod output;
mod paths;
mod status;

pub use capability::{
    detect_vcs_version, parse_loose_version, Requirement, RuntimeCapabilities, VersionRequirement,
};
pub use config::{
    HarnessConfig, PreloadHook, RunSelection, CI_VAR, COLUMNS_VAR, DEFAULT_FAIL_FAST,
    FAIL_FAST_VAR, IGNORE_VERSION_FILTERS_VAR, MANAGER_UPSTREAM_VAR, REALWORLD_TESTS_VAR,
    SPEC_RUN_VAR, SUDO_TESTS_VAR,
};
pub use context::{AmbientContext, EnvDiff};
pub use error::{HarnessError, HarnessResult};
pub use example::{CommandOutput, Example, ExampleContext, ExampleFailure, ExampleResult};
pub use filter::{FilterDecision, FilterRules};
pub use harness::{EmptyFixture, ExampleOutcome, FixtureBuilder, RunReport, SessionHarness};
pub use log_sink::{LogLevel, LogSink};
pub use output::{annotate_failure, OutputBuffer, COMMANDS_SEPARATOR};
pub use paths::ScratchLayout;
pub use status::{ExampleStatus, StatusRecord, StatusStore};
