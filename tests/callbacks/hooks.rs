//! on_start / on_terminal delivery

use std::sync::Arc;
use std::time::Duration;

use graphrun::{callback_fn, worker_fn, GraphBuilder, ResultStatus, TaskSpec, WorkResult};
use parking_lot::Mutex;

use crate::common::{constant, failing, runner, sleeper, Recorder};

#[test]
fn test_success_fires_each_hook_once() {
    let recorder = Recorder::new();
    let mut builder = GraphBuilder::new();
    let a = builder.add(constant("a", 1).callback(recorder.hook("a")));
    let b = builder.add(constant("b", 2).callback(recorder.hook("b")));
    builder.depend(b, a, true).unwrap();

    let execution = runner()
        .execute_graph(Duration::from_secs(1), builder.build())
        .unwrap();

    assert!(execution.completed());
    for id in ["a", "b"] {
        assert_eq!(recorder.starts_of(id), 1);
        assert_eq!(recorder.terminals_of(id), vec![(true, ResultStatus::Success)]);
    }
    assert_eq!(*recorder.starts.lock(), vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn test_force_fail_skips_start_hook() {
    let recorder = Recorder::new();
    let mut builder = GraphBuilder::new();
    let broken = builder.add(failing("broken", "bad input").callback(recorder.hook("broken")));
    let child = builder.add(constant("child", 2).callback(recorder.hook("child")));
    builder.depend(child, broken, true).unwrap();

    runner()
        .execute_graph(Duration::from_secs(1), builder.build())
        .unwrap();

    assert_eq!(recorder.starts_of("broken"), 1);
    assert_eq!(
        recorder.terminals_of("broken"),
        vec![(false, ResultStatus::Exception)]
    );

    assert_eq!(recorder.starts_of("child"), 0);
    assert_eq!(
        recorder.terminals_of("child"),
        vec![(false, ResultStatus::Exception)]
    );
}

#[test]
fn test_racing_triggers_notify_once() {
    let recorder = Recorder::new();
    let mut builder = GraphBuilder::new();
    let sources: Vec<_> = (0..6)
        .map(|i| builder.add(constant(&format!("src{i}"), i)))
        .collect();
    let sink = builder.add(constant("sink", 99).callback(recorder.hook("sink")));
    for &source in &sources {
        builder.depend(sink, source, false).unwrap();
    }

    let execution = runner()
        .execute_graph(Duration::from_secs(1), builder.build())
        .unwrap();

    assert!(execution.completed());
    assert_eq!(recorder.starts_of("sink"), 1);
    assert_eq!(recorder.terminals_of("sink").len(), 1);
}

#[test]
fn test_timeout_reports_failure_once() {
    let recorder = Recorder::new();
    let mut builder = GraphBuilder::new();
    let slow = builder.add(sleeper("slow", 150, 1).callback(recorder.hook("slow")));
    let child = builder.add(constant("child", 2).callback(recorder.hook("child")));
    builder.depend(child, slow, true).unwrap();

    let execution = runner()
        .execute_graph(Duration::from_millis(30), builder.build())
        .unwrap();
    assert!(!execution.completed());

    // Give the slow worker time to return; its late result must not notify again.
    std::thread::sleep(Duration::from_millis(180));

    assert_eq!(recorder.starts_of("slow"), 1);
    assert_eq!(
        recorder.terminals_of("slow"),
        vec![(false, ResultStatus::Timeout)]
    );
    assert_eq!(recorder.starts_of("child"), 0);
    assert_eq!(
        recorder.terminals_of("child"),
        vec![(false, ResultStatus::Timeout)]
    );
}

#[test]
fn test_terminal_hook_sees_input_and_value() {
    let seen = Arc::new(Mutex::new(None));
    let probe = Arc::clone(&seen);

    let mut builder = GraphBuilder::new();
    builder.add(
        TaskSpec::new("greet", worker_fn(|name: &String, _| Ok(format!("hello {name}"))), "ada".to_string())
            .callback(callback_fn(move |success: bool, input: &String, result: &WorkResult<String>| {
                *probe.lock() = Some((success, input.clone(), result.value().clone()));
            })),
    );

    runner()
        .execute_graph(Duration::from_secs(1), builder.build())
        .unwrap();

    assert_eq!(
        seen.lock().clone(),
        Some((true, "ada".to_string(), "hello ada".to_string()))
    );
}
