#[path = "harness_support.rs"]
mod support;

use std::cell::Cell;
use std::env;
use std::rc::Rc;

use serial_test::serial;
use session_harness::{
    Example, ExampleFailure, ExampleOutcome, ExampleStatus, HarnessConfig, RunSelection,
    DEFAULT_FAIL_FAST, FAIL_FAST_VAR,
};
use support::{scratch_config, start_harness};

fn failing(id: &str, runs: &Rc<Cell<usize>>) -> Example {
    let runs = Rc::clone(runs);
    Example::new(id, move |_ctx| {
        runs.set(runs.get() + 1);
        Err(ExampleFailure::new("systemic breakage"))
    })
}

fn passing(id: &str, runs: &Rc<Cell<usize>>) -> Example {
    let runs = Rc::clone(runs);
    Example::new(id, move |_ctx| {
        runs.set(runs.get() + 1);
        Ok(())
    })
}

#[test]
#[serial]
fn run_stops_once_threshold_is_reached() {
    let (config, _root) = scratch_config();
    let mut harness = start_harness(config.with_fail_fast(3));
    let runs = Rc::new(Cell::new(0));

    let examples = (0..10)
        .map(|index| failing(&format!("broken_{index}"), &runs))
        .collect();
    let report = harness.run(examples).expect("run should complete");

    assert_eq!(runs.get(), 3);
    assert!(report.aborted);
    assert_eq!(report.failed(), 3);
    assert_eq!(report.not_run(), 7);
    assert_eq!(report.outcome_of("broken_3"), Some(&ExampleOutcome::NotRun));
}

#[test]
#[serial]
fn passes_do_not_count_towards_the_threshold() {
    let (config, _root) = scratch_config();
    let mut harness = start_harness(config.with_fail_fast(2));
    let runs = Rc::new(Cell::new(0));

    let report = harness
        .run(vec![
            failing("first", &runs),
            passing("second", &runs),
            passing("third", &runs),
            failing("fourth", &runs),
            passing("fifth", &runs),
        ])
        .expect("run should complete");

    assert_eq!(runs.get(), 4);
    assert!(report.aborted);
    assert_eq!(report.outcome_of("fifth"), Some(&ExampleOutcome::NotRun));
}

#[test]
#[serial]
fn disabled_threshold_runs_everything() {
    let (config, _root) = scratch_config();
    let mut harness = start_harness(config.with_fail_fast(0));
    let runs = Rc::new(Cell::new(0));

    let examples = (0..30)
        .map(|index| failing(&format!("broken_{index}"), &runs))
        .collect();
    let report = harness.run(examples).expect("run should complete");

    assert_eq!(runs.get(), 30);
    assert!(!report.aborted);
}

#[test]
#[serial]
fn threshold_can_come_from_the_environment() {
    env::set_var(FAIL_FAST_VAR, "5");
    assert_eq!(HarnessConfig::from_env("/suite").fail_fast, Some(5));

    env::set_var(FAIL_FAST_VAR, "0");
    assert_eq!(HarnessConfig::from_env("/suite").fail_fast, None);

    env::set_var(FAIL_FAST_VAR, "lots");
    assert_eq!(
        HarnessConfig::from_env("/suite").fail_fast,
        Some(DEFAULT_FAIL_FAST)
    );
    env::remove_var(FAIL_FAST_VAR);
}

#[test]
#[serial]
fn only_failures_reruns_previous_failures() {
    let (config, _root) = scratch_config();
    let runs = Rc::new(Cell::new(0));

    let mut first = start_harness(config.clone());
    first
        .run(vec![
            passing("green", &runs),
            failing("red", &runs),
            failing("also_red", &runs),
        ])
        .expect("first run");
    assert_eq!(runs.get(), 3);

    let mut second = start_harness(config.with_selection(RunSelection::OnlyFailures));
    let report = second
        .run(vec![
            passing("green", &runs),
            passing("red", &runs),
            failing("also_red", &runs),
        ])
        .expect("second run");

    assert_eq!(runs.get(), 5);
    assert!(matches!(
        report.outcome_of("green"),
        Some(ExampleOutcome::Excluded(_))
    ));
    let status = second.status().expect("status store");
    assert_eq!(status.status_of("red"), Some(ExampleStatus::Passed));
    assert_eq!(status.status_of("also_red"), Some(ExampleStatus::Failed));
    assert_eq!(status.status_of("green"), Some(ExampleStatus::Passed));
}

#[test]
#[serial]
fn next_failure_stops_at_the_first_failure_still_failing() {
    let (config, _root) = scratch_config();
    let runs = Rc::new(Cell::new(0));

    let mut first = start_harness(config.clone());
    first
        .run(vec![
            passing("green", &runs),
            failing("red", &runs),
            failing("also_red", &runs),
        ])
        .expect("first run");

    let mut second = start_harness(config.with_selection(RunSelection::NextFailure));
    let report = second
        .run(vec![
            passing("green", &runs),
            failing("red", &runs),
            failing("also_red", &runs),
        ])
        .expect("second run");

    assert_eq!(report.executed(), 1);
    assert!(matches!(
        report.outcome_of("red"),
        Some(ExampleOutcome::Failed(_))
    ));
    assert!(report.aborted);
    assert_eq!(report.outcome_of("also_red"), Some(&ExampleOutcome::NotRun));
}

#[test]
#[serial]
fn next_failure_runs_past_fixed_failures_until_one_still_fails() {
    let (config, _root) = scratch_config();
    let runs = Rc::new(Cell::new(0));
    let also_red_runs = Rc::new(Cell::new(0));

    let mut first = start_harness(config.clone());
    first
        .run(vec![
            passing("green", &runs),
            failing("red", &runs),
            failing("also_red", &runs),
            failing("still_red", &runs),
        ])
        .expect("first run");

    let mut second = start_harness(config.with_selection(RunSelection::NextFailure));
    let report = second
        .run(vec![
            passing("green", &runs),
            passing("red", &runs),
            failing("also_red", &also_red_runs),
            failing("still_red", &runs),
        ])
        .expect("second run");

    assert!(matches!(
        report.outcome_of("green"),
        Some(ExampleOutcome::Excluded(_))
    ));
    assert_eq!(report.outcome_of("red"), Some(&ExampleOutcome::Passed));
    assert!(matches!(
        report.outcome_of("also_red"),
        Some(ExampleOutcome::Failed(_))
    ));
    assert_eq!(also_red_runs.get(), 1);
    assert!(report.aborted);
    assert_eq!(report.outcome_of("still_red"), Some(&ExampleOutcome::NotRun));

    let status = second.status().expect("status store");
    assert_eq!(status.status_of("red"), Some(ExampleStatus::Passed));
    assert_eq!(status.status_of("still_red"), Some(ExampleStatus::Failed));
}
