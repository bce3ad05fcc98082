use std::env;
use std::fs;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::capability::RuntimeCapabilities;
use crate::config::{HarnessConfig, RunSelection};
use crate::context::AmbientContext;
use crate::error::{HarnessError, HarnessResult};
use crate::example::{Example, ExampleContext, ExampleFailure, ExampleResult};
use crate::filter::{FilterDecision, FilterRules};
use crate::log_sink::LogSink;
use crate::output::annotate_failure;
use crate::paths::{check_root, recreate_dir, remove_tree, ScratchLayout};
use crate::status::{ExampleStatus, StatusStore};

/// Populates the fixture repository before the run.
pub trait FixtureBuilder {
    fn build(&self, repo: &Path) -> HarnessResult<()>;
}

impl<F> FixtureBuilder for F
where
    F: Fn(&Path) -> HarnessResult<()>,
{
    fn build(&self, repo: &Path) -> HarnessResult<()> {
        self(repo)
    }
}

/// Leaves the fixture repository as an empty directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyFixture;

impl FixtureBuilder for EmptyFixture {
    fn build(&self, _repo: &Path) -> HarnessResult<()> {
        Ok(())
    }
}

/// What happened to a scheduled example.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExampleOutcome {
    Passed,
    /// Failure message, annotated with captured command output.
    Failed(String),
    /// Filtered out before running.
    Excluded(String),
    /// Skipped because the fail-fast threshold was reached.
    NotRun,
}

/// Outcomes of a run, in scheduling order.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub outcomes: Vec<(String, ExampleOutcome)>,
    /// Set when the fail-fast threshold stopped the run.
    pub aborted: bool,
}

impl RunReport {
    pub fn outcome_of(&self, id: &str) -> Option<&ExampleOutcome> {
        self.outcomes
            .iter()
            .find(|(example, _)| example == id)
            .map(|(_, outcome)| outcome)
    }

    pub fn passed(&self) -> usize {
        self.count(|outcome| matches!(outcome, ExampleOutcome::Passed))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, ExampleOutcome::Failed(_)))
    }

    pub fn excluded(&self) -> usize {
        self.count(|outcome| matches!(outcome, ExampleOutcome::Excluded(_)))
    }

    pub fn not_run(&self) -> usize {
        self.count(|outcome| matches!(outcome, ExampleOutcome::NotRun))
    }

    pub fn executed(&self) -> usize {
        self.passed() + self.failed()
    }

    fn count(&self, predicate: impl Fn(&ExampleOutcome) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| predicate(outcome))
            .count()
    }
}

/// Owns process-wide test state and isolates every example from the others.
///
/// Examples run one at a time. Before each example the scratch tree is reset
/// and the process moves into the app root; afterwards the working directory
/// and environment are restored to the baseline captured by
/// [`SessionHarness::initialize`].
pub struct SessionHarness {
    config: HarnessConfig,
    baseline: AmbientContext,
    layout: ScratchLayout,
    rules: FilterRules,
    fixture: Box<dyn FixtureBuilder>,
    log_sink: LogSink,
    status: Option<StatusStore>,
    failure_echo: Box<dyn Write>,
}

impl SessionHarness {
    /// Apply the run-wide environment and capture the restoration baseline.
    pub fn initialize(config: HarnessConfig, caps: RuntimeCapabilities) -> HarnessResult<Self> {
        check_root(&config.root)?;

        for (key, value) in &config.run_env {
            env::set_var(key, value);
        }
        if let Some(hook) = &config.preload {
            let current = env::var(&hook.var).ok();
            env::set_var(&hook.var, hook.apply_to(current.as_deref()));
        }

        let baseline = AmbientContext::capture_excluding(&config.volatile_env_prefixes)?;
        let layout = ScratchLayout::new(&config.scratch_dir);
        let status = config
            .status_file
            .as_ref()
            .map(StatusStore::load)
            .transpose()?;
        let log_sink =
            LogSink::new(layout.log_dir()).with_stdout_mirror(config.log_stdout_mirror);

        info!(
            root = %config.root.display(),
            working_dir = %baseline.working_dir().display(),
            fail_fast = ?config.fail_fast,
            "session harness initialized"
        );

        Ok(Self {
            rules: FilterRules::new(caps),
            config,
            baseline,
            layout,
            fixture: Box::new(EmptyFixture),
            log_sink,
            status,
            failure_echo: Box::new(io::stderr()),
        })
    }

    /// Use `builder` to populate the fixture repository.
    pub fn with_fixture_builder(mut self, builder: impl FixtureBuilder + 'static) -> Self {
        self.fixture = Box::new(builder);
        self
    }

    /// Send echoed failure output to `writer` instead of stderr.
    pub fn with_failure_echo(mut self, writer: impl Write + 'static) -> Self {
        self.failure_echo = Box::new(writer);
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn baseline(&self) -> &AmbientContext {
        &self.baseline
    }

    pub fn layout(&self) -> &ScratchLayout {
        &self.layout
    }

    pub fn rules(&self) -> &FilterRules {
        &self.rules
    }

    pub fn log_sink(&self) -> &LogSink {
        &self.log_sink
    }

    pub fn log_sink_mut(&mut self) -> &mut LogSink {
        &mut self.log_sink
    }

    pub fn status(&self) -> Option<&StatusStore> {
        self.status.as_ref()
    }

    /// Rebuild the fixture repository from scratch and create the log files.
    pub fn before_all(&mut self) -> HarnessResult<()> {
        remove_tree(&self.layout.fixture_repo())?;
        self.build_fixture()?;
        self.log_sink.touch_all()
    }

    /// Reset scratch state and enter a fresh app root.
    pub fn before_each(&mut self) -> HarnessResult<ExampleContext> {
        if !self.layout.fixture_repo().is_dir() {
            warn!("fixture repository missing, rebuilding");
            self.build_fixture()?;
        }

        let app_root = self.layout.app_root();
        let home = self.layout.home();
        recreate_dir(&home)?;
        recreate_dir(&self.layout.installed_packages())?;
        recreate_dir(&app_root)?;
        env::set_current_dir(&app_root)
            .map_err(|err| HarnessError::fixture(&app_root, format!("enter app root: {err}")))?;

        let mut ambient = self.baseline.clone();
        ambient.set_working_dir(app_root);
        Ok(ExampleContext::new(ambient, self.layout.clone()))
    }

    /// Annotate a failure with captured output, then restore the baseline.
    ///
    /// Restoration always runs; an error from it is fatal to the run.
    pub fn after_each(
        &mut self,
        mut ctx: ExampleContext,
        result: ExampleResult,
    ) -> HarnessResult<ExampleResult> {
        let output = ctx.output_mut().take_trimmed();
        let result = match result {
            Err(failure) if !output.is_empty() => {
                if self.config.echo_failure_output {
                    if let Err(err) = writeln!(self.failure_echo, "{output}") {
                        warn!(%err, "failed to echo failure output");
                    }
                }
                Err(ExampleFailure::new(annotate_failure(failure.message(), &output)))
            }
            other => other,
        };

        self.baseline.restore()?;
        Ok(result)
    }

    /// Run one example between `before_each` and `after_each`.
    ///
    /// Panics inside the body are reported as failures.
    pub fn run_example(&mut self, example: Example) -> HarnessResult<ExampleOutcome> {
        let (id, body) = example.into_parts();
        debug!(example = %id, "running example");

        let mut ctx = match self.before_each() {
            Ok(ctx) => ctx,
            Err(err) => {
                if let Err(restore_err) = self.baseline.restore() {
                    error!(%restore_err, "failed to restore baseline after setup error");
                }
                return Err(err);
            }
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| body(&mut ctx)))
            .unwrap_or_else(|payload| Err(ExampleFailure::from_panic(payload)));

        match self.after_each(ctx, result)? {
            Ok(()) => {
                self.log_sink.info(&format!("{id}: passed"))?;
                Ok(ExampleOutcome::Passed)
            }
            Err(failure) => {
                self.log_sink.error(&format!("{id}: {failure}"))?;
                Ok(ExampleOutcome::Failed(failure.message().to_string()))
            }
        }
    }

    /// Filter, schedule and run `examples` in order.
    pub fn run(&mut self, examples: Vec<Example>) -> HarnessResult<RunReport> {
        let focus = self
            .rules
            .focus_active(examples.iter().any(Example::is_focused));
        let selection = self.config.selection;
        if selection != RunSelection::All && self.status.is_none() {
            warn!(?selection, "selective re-run requested without a status file");
        }
        let threshold = match selection {
            RunSelection::NextFailure => Some(1),
            _ => self.config.fail_fast,
        };

        self.before_all()?;

        let run_at = Utc::now();
        let mut report = RunReport::default();
        let mut failures = 0;

        for example in examples {
            let id = example.id().to_string();
            if report.aborted {
                report.outcomes.push((id, ExampleOutcome::NotRun));
                continue;
            }

            if let Some(reason) = self.selection_reason(&example, focus) {
                report.outcomes.push((id, ExampleOutcome::Excluded(reason)));
                continue;
            }

            if let FilterDecision::Excluded(reason) = self.rules.evaluate(example.requirements()) {
                debug!(example = %id, %reason, "example excluded");
                if let Some(status) = self.status.as_mut() {
                    status.record_if_absent(id.as_str(), ExampleStatus::Excluded, run_at);
                }
                report.outcomes.push((id, ExampleOutcome::Excluded(reason)));
                continue;
            }

            let outcome = match self.run_example(example) {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(example = %id, %err, "aborting run");
                    if let Err(log_err) = self.log_sink.fatal(&format!("{id}: {err}")) {
                        warn!(%log_err, "failed to write fatal log entry");
                    }
                    if let Err(save_err) = self.persist_status() {
                        warn!(%save_err, "failed to persist example status");
                    }
                    return Err(err);
                }
            };

            let status = match outcome {
                ExampleOutcome::Failed(_) => ExampleStatus::Failed,
                _ => ExampleStatus::Passed,
            };
            if let Some(store) = self.status.as_mut() {
                store.record(id.as_str(), status, run_at);
            }

            if status == ExampleStatus::Failed {
                failures += 1;
                if threshold.is_some_and(|limit| failures >= limit) {
                    warn!(failures, "fail-fast threshold reached, skipping remaining examples");
                    report.aborted = true;
                }
            }
            report.outcomes.push((id, outcome));
        }

        self.persist_status()?;
        self.log_sink.close()?;

        info!(
            passed = report.passed(),
            failed = report.failed(),
            excluded = report.excluded(),
            not_run = report.not_run(),
            "run finished"
        );
        Ok(report)
    }

    fn selection_reason(&self, example: &Example, focus: bool) -> Option<String> {
        if focus && !example.is_focused() {
            return Some("not focused".to_string());
        }
        match self.config.selection {
            RunSelection::All => None,
            RunSelection::OnlyFailures | RunSelection::NextFailure => {
                (!self.previously_failed(example.id()))
                    .then(|| "did not fail previously".to_string())
            }
        }
    }

    fn previously_failed(&self, id: &str) -> bool {
        self.status
            .as_ref()
            .is_some_and(|status| status.has_failed(id))
    }

    fn build_fixture(&self) -> HarnessResult<()> {
        let repo = self.layout.fixture_repo();
        fs::create_dir_all(&repo)
            .map_err(|err| HarnessError::fixture(&repo, format!("create: {err}")))?;
        self.fixture.build(&repo)?;
        debug!(path = %repo.display(), "fixture repository built");
        Ok(())
    }

    fn persist_status(&self) -> HarnessResult<()> {
        match &self.status {
            Some(status) => status.save(),
            None => Ok(()),
        }
    }
}
