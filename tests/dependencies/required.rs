//! Required edges

use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use graphrun::{worker_fn, GraphBuilder, ResultStatus, TaskSpec};

use crate::common::{constant, counted, counter, failing, runner, sleeper};

#[test]
fn test_chain_reads_upstream_value() {
    let mut builder = GraphBuilder::new();
    let a = builder.add(TaskSpec::new(
        "A",
        worker_fn(|_: &(), _| {
            thread::sleep(Duration::from_millis(10));
            Ok("x".to_string())
        }),
        (),
    ));
    let b = builder.add(TaskSpec::new(
        "B",
        worker_fn(|_: &(), registry| Ok(registry.get::<String>("A")?.value().len())),
        (),
    ));
    builder.depend(b, a, true).unwrap();

    let execution = runner()
        .execute(Duration::from_millis(1000), builder.build(), &[a])
        .unwrap();

    assert!(execution.completed());
    let result = execution.result::<usize>("B").unwrap();
    assert_eq!(result.status(), ResultStatus::Success);
    assert_eq!(*result.value(), 1);
}

#[test]
fn test_waits_for_all_required_sources() {
    let runs = counter();
    let mut builder = GraphBuilder::new();
    let slow = builder.add(sleeper("slow", 60, 1));
    let medium = builder.add(sleeper("medium", 30, 2));
    let hint = builder.add(constant("hint", 3));
    let sink = builder.add({
        let runs = runs.clone();
        TaskSpec::new(
            "sink",
            worker_fn(move |_: &(), registry| {
                runs.fetch_add(1, Ordering::SeqCst);
                let slow = registry.get::<i32>("slow")?;
                let medium = registry.get::<i32>("medium")?;
                Ok(slow.is_success() && medium.is_success())
            }),
            (),
        )
    });
    builder.depend(sink, slow, true).unwrap();
    builder.depend(sink, medium, true).unwrap();
    builder.depend(sink, hint, false).unwrap();

    let execution = runner()
        .execute_graph(Duration::from_secs(2), builder.build())
        .unwrap();

    assert!(execution.completed());
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    let sink = execution.result::<bool>("sink").unwrap();
    assert!(sink.is_success());
    assert!(*sink.value(), "sink ran before both required sources finished");
}

#[test]
fn test_failed_required_source_fails_fast() {
    let runs = counter();
    let mut builder = GraphBuilder::new();
    let broken = builder.add(failing("broken", "no data"));
    let slow = builder.add(sleeper("slow", 300, 1));
    let sink = builder.add(counted("sink", 0, &runs));
    builder.depend(sink, broken, true).unwrap();
    builder.depend(sink, slow, true).unwrap();
    let graph = builder.build();
    let sink_index = sink;

    let probe = graph.clone();
    let started = Instant::now();
    let watcher = thread::spawn(move || {
        while !probe.state(sink_index).is_some_and(|state| state.is_terminal()) {
            thread::sleep(Duration::from_millis(1));
        }
        started.elapsed()
    });

    let execution = runner()
        .execute_graph(Duration::from_secs(2), graph)
        .unwrap();
    let settled_after = watcher.join().unwrap();

    assert!(execution.completed());
    assert!(
        settled_after < Duration::from_millis(250),
        "sink waited for the slow source: {settled_after:?}"
    );
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    let sink = execution.result::<i32>("sink").unwrap();
    assert_eq!(sink.status(), ResultStatus::Exception);
    assert_eq!(sink.error().unwrap().to_string(), "no data");
}

#[test]
fn test_single_edge_timeout_propagates() {
    let runs = counter();
    let mut builder = GraphBuilder::new();
    let source = builder.add(sleeper("source", 200, 1));
    let child = builder.add(counted("child", 2, &runs));
    builder.depend(child, source, false).unwrap();

    let execution = runner()
        .execute_graph(Duration::from_millis(50), builder.build())
        .unwrap();

    assert!(!execution.completed());
    assert_eq!(execution.status("source"), Some(ResultStatus::Timeout));

    // The child never registered before the force-stop, so read it through the graph.
    let graph = execution.graph();
    let child_status = graph.status(child).unwrap();
    assert_eq!(child_status, ResultStatus::Timeout);

    thread::sleep(Duration::from_millis(250));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}
