#![cfg(feature = "test-support")]

#[path = "harness_support.rs"]
mod support;

use std::fs;

use serial_test::serial;
use session_harness::{Example, ExampleFailure, ExampleOutcome};
use support::{probe_env_path, scratch_config, start_harness};

#[test]
#[serial]
fn commands_see_the_explicit_example_context() {
    let (config, _root) = scratch_config();
    let mut harness = start_harness(config);
    let probe = probe_env_path();

    let report = harness
        .run(vec![Example::new("probe", move |ctx| {
            ctx.set_env("HARNESS_PROBE_VALUE", "from-context");
            ctx.remove_env("HARNESS_SPEC_RUN");

            let mut command = ctx.command(&probe);
            command.args(["HARNESS_PROBE_VALUE", "HARNESS_SPEC_RUN", "COLUMNS"]);
            let output = ctx.run_command(&mut command)?;

            let expected_cwd = fs::canonicalize(ctx.app_root())?;
            let cwd_line = output
                .stdout
                .lines()
                .next()
                .and_then(|line| line.strip_prefix("cwd="))
                .ok_or_else(|| ExampleFailure::new("probe printed no cwd"))?;
            if fs::canonicalize(cwd_line)? != expected_cwd {
                return Err(ExampleFailure::new(format!("probe ran in {cwd_line}")));
            }
            for expected in [
                "HARNESS_PROBE_VALUE=from-context",
                "HARNESS_SPEC_RUN unset",
                "COLUMNS=10000",
            ] {
                if !output.stdout.contains(expected) {
                    return Err(ExampleFailure::new(format!(
                        "missing {expected:?} in {}",
                        output.stdout
                    )));
                }
            }
            if std::env::var_os("HARNESS_PROBE_VALUE").is_some() {
                return Err(ExampleFailure::new("context leaked into the process"));
            }
            Ok(())
        })])
        .expect("run should complete");

    assert_eq!(report.outcome_of("probe"), Some(&ExampleOutcome::Passed));
}

#[test]
#[serial]
fn failing_command_output_is_attached_to_the_failure() {
    let (config, _root) = scratch_config();
    let mut harness = start_harness(config);
    let probe = probe_env_path();

    let report = harness
        .run(vec![Example::new("exit_code", move |ctx| {
            let mut command = ctx.command(&probe);
            command.args(["--exit", "3"]);
            let output = ctx.run_command(&mut command)?;
            if output.success() {
                return Ok(());
            }
            Err(ExampleFailure::new(format!(
                "probe exited with {:?}",
                output.status.code()
            )))
        })])
        .expect("run should complete");

    let Some(ExampleOutcome::Failed(message)) = report.outcome_of("exit_code") else {
        panic!("probe failure should be recorded");
    };
    assert!(message.starts_with("probe exited with Some(3)\n\nCommands:\n$ "));
    assert!(message.contains("--exit 3"));
    assert!(message.ends_with("probe finished with 3"));
}
