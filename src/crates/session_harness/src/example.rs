use std::any::Any;
use std::ffi::OsStr;
use std::fmt;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};

use tracing::debug;

use crate::capability::Requirement;
use crate::context::AmbientContext;
use crate::error::{HarnessError, HarnessResult};
use crate::output::OutputBuffer;
use crate::paths::ScratchLayout;

/// Result of an example body.
pub type ExampleResult = Result<(), ExampleFailure>;

/// Assertion or runtime error raised inside a single example.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExampleFailure {
    message: String,
}

impl ExampleFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<String>()
            .cloned()
            .or_else(|| payload.downcast_ref::<&str>().map(|s| (*s).to_string()))
            .unwrap_or_else(|| "example panicked".to_string());
        Self { message }
    }
}

impl fmt::Display for ExampleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<HarnessError> for ExampleFailure {
    fn from(err: HarnessError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<std::io::Error> for ExampleFailure {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

type ExampleBody = Box<dyn FnOnce(&mut ExampleContext) -> ExampleResult>;

/// A single test case together with the capabilities it needs.
pub struct Example {
    id: String,
    requirements: Vec<Requirement>,
    focused: bool,
    body: ExampleBody,
}

impl Example {
    pub fn new(
        id: impl Into<String>,
        body: impl FnOnce(&mut ExampleContext) -> ExampleResult + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            requirements: Vec::new(),
            focused: false,
            body: Box::new(body),
        }
    }

    /// Only run when `requirement` is met by the current runtime.
    pub fn requires(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    /// Restrict the run to focused examples (ignored on CI).
    pub fn focused(mut self) -> Self {
        self.focused = true;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub(crate) fn into_parts(self) -> (String, ExampleBody) {
        (self.id, self.body)
    }
}

impl fmt::Debug for Example {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Example")
            .field("id", &self.id)
            .field("requirements", &self.requirements)
            .field("focused", &self.focused)
            .finish_non_exhaustive()
    }
}

/// Output of a command run through [`ExampleContext::run_command`].
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Explicit per-example state handed to every example body.
#[derive(Debug)]
pub struct ExampleContext {
    ambient: AmbientContext,
    layout: ScratchLayout,
    output: OutputBuffer,
}

impl ExampleContext {
    pub(crate) fn new(ambient: AmbientContext, layout: ScratchLayout) -> Self {
        Self {
            ambient,
            layout,
            output: OutputBuffer::new(),
        }
    }

    pub fn app_root(&self) -> PathBuf {
        self.layout.app_root()
    }

    pub fn fixture_repo(&self) -> PathBuf {
        self.layout.fixture_repo()
    }

    pub fn home(&self) -> PathBuf {
        self.layout.home()
    }

    pub fn installed_packages(&self) -> PathBuf {
        self.layout.installed_packages()
    }

    /// Context subprocesses are spawned with.
    pub fn ambient(&self) -> &AmbientContext {
        &self.ambient
    }

    pub fn set_env(&mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) {
        self.ambient
            .set_var(key.as_ref().to_os_string(), value.as_ref().to_os_string());
    }

    pub fn remove_env(&mut self, key: impl AsRef<OsStr>) {
        self.ambient.remove_var(key);
    }

    pub fn set_working_dir(&mut self, dir: impl Into<PathBuf>) {
        self.ambient.set_working_dir(dir);
    }

    pub fn output(&self) -> &OutputBuffer {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut OutputBuffer {
        &mut self.output
    }

    /// Build a command that runs with this example's working directory and environment.
    pub fn command(&self, program: impl AsRef<OsStr>) -> Command {
        let mut command = Command::new(program);
        self.ambient.configure(&mut command);
        command
    }

    /// Run `command`, capture its output and record it in the output buffer.
    pub fn run_command(&mut self, command: &mut Command) -> HarnessResult<CommandOutput> {
        let description = describe(command);
        debug!(command = %description, "running command");
        let output = command.output().map_err(|source| HarnessError::Command {
            command: description.clone(),
            source,
        })?;

        let result = CommandOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        self.output
            .record_command(&description, &result.stdout, &result.stderr);
        Ok(result)
    }
}

fn describe(command: &Command) -> String {
    let mut parts = vec![command.get_program().to_string_lossy().into_owned()];
    parts.extend(command.get_args().map(|arg| arg.to_string_lossy().into_owned()));
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_failure_messages() {
        let owned = ExampleFailure::from_panic(Box::new(String::from("owned message")));
        assert_eq!(owned.message(), "owned message");

        let borrowed = ExampleFailure::from_panic(Box::new("static message"));
        assert_eq!(borrowed.message(), "static message");

        let opaque = ExampleFailure::from_panic(Box::new(42_u8));
        assert_eq!(opaque.message(), "example panicked");
    }

    #[test]
    fn commands_are_described_with_arguments() {
        let mut command = Command::new("bundle");
        command.args(["install", "--jobs", "4"]);
        assert_eq!(describe(&command), "bundle install --jobs 4");
    }

    #[test]
    fn example_builder_collects_tags() {
        let example = Example::new("tagged", |_| Ok(()))
            .requires(Requirement::Network)
            .focused();
        assert_eq!(example.id(), "tagged");
        assert_eq!(example.requirements(), &[Requirement::Network]);
        assert!(example.is_focused());
    }
}
