//! Optional (first-past-the-post) edges

use std::sync::atomic::Ordering;
use std::time::Duration;

use graphrun::{worker_fn, GraphBuilder, ResultStatus, TaskSpec};

use crate::common::{counted, counter, failing, runner, sleeper, Recorder};

#[test]
fn test_runs_once_on_first_source() {
    let recorder = Recorder::new();
    let runs = counter();

    let mut builder = GraphBuilder::new();
    let fast = builder.add(sleeper("fast", 0, 1));
    let mid = builder.add(sleeper("mid", 40, 2));
    let slow = builder.add(sleeper("slow", 80, 3));
    let sink = builder.add({
        let runs = runs.clone();
        TaskSpec::new(
            "sink",
            worker_fn(move |_: &(), registry| {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(registry.status("slow") == Some(ResultStatus::Success))
            }),
            (),
        )
        .callback(recorder.hook("sink"))
        .check_next_idle(false)
    });
    for source in [fast, mid, slow] {
        builder.depend(sink, source, false).unwrap();
    }

    let execution = runner()
        .execute_graph(Duration::from_secs(2), builder.build())
        .unwrap();

    assert!(execution.completed());
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.starts_of("sink"), 1);
    assert_eq!(
        recorder.terminals_of("sink"),
        vec![(true, ResultStatus::Success)]
    );

    let sink = execution.result::<bool>("sink").unwrap();
    assert!(!*sink.value(), "sink waited for the slowest source");
}

#[test]
fn test_failed_optional_source_still_triggers() {
    let runs = counter();
    let mut builder = GraphBuilder::new();
    let broken = builder.add(failing("broken", "unused"));
    let slow = builder.add(sleeper("slow", 50, 1));
    let sink = builder.add(counted("sink", 9, &runs));
    builder.depend(sink, broken, false).unwrap();
    builder.depend(sink, slow, false).unwrap();

    let execution = runner()
        .execute_graph(Duration::from_secs(2), builder.build())
        .unwrap();

    assert!(execution.completed());
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(execution.status("broken"), Some(ResultStatus::Exception));
    assert_eq!(execution.status("sink"), Some(ResultStatus::Success));
}

#[test]
fn test_timed_out_trigger_propagates_timeout() {
    let runs = counter();
    let mut builder = GraphBuilder::new();
    let stuck = builder.add(sleeper("stuck", 150, 1));
    let stuck_too = builder.add(sleeper("stuck_too", 150, 2));
    let sink = builder.add(counted("sink", 0, &runs));
    builder.depend(sink, stuck, false).unwrap();
    builder.depend(sink, stuck_too, false).unwrap();

    let execution = runner()
        .execute_graph(Duration::from_millis(40), builder.build())
        .unwrap();

    assert!(!execution.completed());
    std::thread::sleep(Duration::from_millis(200));

    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(execution.graph().status(sink), Some(ResultStatus::Timeout));
}
