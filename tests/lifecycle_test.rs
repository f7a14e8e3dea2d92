//! Lifecycle Tests
//!
//! `setup` and `cleanup` bracket every execution exactly once, whatever way
//! the run ends.

use parking_lot::Mutex;
use serde_json::{json, Value};
use stateful_check::{
    run_sequence, CheckConfig, CommandError, CommandInvocation, CommandSpec, StatefulCheck,
    SymbolicValue, SystemSpec, Term,
};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
struct Lifecycle {
    steps: u32,
}

#[derive(Debug, Default)]
struct Counters {
    setups: u32,
    cleanups: u32,
    live: i32,
}

fn next(s: &Lifecycle, _: &[Term<Value>], _: &Term<Value>) -> Lifecycle {
    Lifecycle { steps: s.steps + 1 }
}

/// `ok` passes, `lie` fails its postcondition, `raise` errors, `boom` panics.
fn lifecycle_spec(counters: Arc<Mutex<Counters>>) -> SystemSpec<Lifecycle> {
    let on_setup = counters.clone();
    let on_cleanup = counters;
    SystemSpec::builder()
        .command("ok", CommandSpec::new(|_: &[Value]| Ok(json!(true))).next_state(next))
        .command(
            "lie",
            CommandSpec::new(|_: &[Value]| Ok(json!(false)))
                .next_state(next)
                .postcondition(|_: &Lifecycle, _: &Lifecycle, _: &[Value], r: &Value| r == &json!(true)),
        )
        .command(
            "raise",
            CommandSpec::new(|_: &[Value]| Err(CommandError::new("Io", "disk gone"))),
        )
        .command(
            "boom",
            CommandSpec::new(|_: &[Value]| -> Result<Value, CommandError> { panic!("boom") }),
        )
        .setup(move || {
            let mut c = on_setup.lock();
            c.setups += 1;
            c.live += 1;
            Ok(Value::Null)
        })
        .cleanup(move |_: &Lifecycle| {
            let mut c = on_cleanup.lock();
            c.cleanups += 1;
            c.live -= 1;
        })
        .build()
        .unwrap()
}

fn seq(commands: &[&str]) -> Vec<CommandInvocation<Value>> {
    commands
        .iter()
        .enumerate()
        .map(|(i, name)| CommandInvocation::new(SymbolicValue::new(i as u64), *name, vec![]))
        .collect()
}

// =============================================================================
// Single Runs
// =============================================================================

#[test]
fn test_cleanup_once_per_exit_path() {
    let cases: [(&[&str], bool); 4] = [
        (&["ok", "ok", "ok"], true),
        (&["ok", "lie", "ok"], false),
        (&["ok", "raise", "ok"], false),
        (&["boom", "ok"], false),
    ];

    for (commands, passes) in cases {
        let counters = Arc::new(Mutex::new(Counters::default()));
        let spec = lifecycle_spec(counters.clone());
        let trace = run_sequence(&spec, &seq(commands)).unwrap();

        assert_eq!(trace.is_passed(), passes, "{:?}", commands);
        let c = counters.lock();
        assert_eq!(c.setups, 1, "{:?}", commands);
        assert_eq!(c.cleanups, 1, "{:?}", commands);
        assert_eq!(c.live, 0);
    }
}

#[test]
fn test_cleanup_receives_last_real_state() {
    let last = Arc::new(Mutex::new(None));
    let seen = last.clone();
    let spec: SystemSpec<Lifecycle> = SystemSpec::builder()
        .command(
            "ok",
            CommandSpec::new(|_: &[Value]| Ok(Value::Null)).next_state(next),
        )
        .cleanup(move |s: &Lifecycle| *seen.lock() = Some(s.steps))
        .build()
        .unwrap();

    run_sequence(&spec, &seq(&["ok", "ok", "ok", "ok"])).unwrap();
    assert_eq!(*last.lock(), Some(4));
}

// =============================================================================
// Full Checks - setup and cleanup stay paired across shrinking
// =============================================================================

#[test]
fn test_setup_cleanup_paired_across_check() {
    for seed in 0..10 {
        let counters = Arc::new(Mutex::new(Counters::default()));
        let check = StatefulCheck::new(lifecycle_spec(counters.clone()), CheckConfig::quick(seed));
        let result = check.run().unwrap();

        let c = counters.lock();
        assert_eq!(c.setups, c.cleanups, "seed {}", seed);
        assert_eq!(c.live, 0, "seed {}", seed);

        // one execution per run, plus the replays of the shrunk and original sequences
        let replays = if result.is_success() { 0 } else { 2 };
        assert_eq!(u64::from(c.setups), result.runs + replays, "seed {}", seed);
    }
}
