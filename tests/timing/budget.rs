//! Budget cascade

use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use graphrun::{GraphBuilder, NodeState, ResultStatus};

use crate::common::{counted, counter, runner, sleeper};

#[test]
fn test_chain_end_times_out_behind_slow_head() {
    let runs = counter();
    let mut builder = GraphBuilder::new();
    let a = builder.add(sleeper("A", 150, 1));
    let b = builder.add(counted("B", 2, &runs));
    let c = builder.add(counted("C", 3, &runs));
    builder.depend(b, a, true).unwrap();
    builder.depend(c, b, true).unwrap();
    let graph = builder.build();

    let execution = runner()
        .execute(Duration::from_millis(100), graph.clone(), &[a])
        .unwrap();
    assert!(!execution.completed());

    // Let the slow head return and push its exhausted budget down the chain.
    thread::sleep(Duration::from_millis(150));

    assert_eq!(graph.status(c), Some(ResultStatus::Timeout));
    assert_eq!(graph.state(c), Some(NodeState::Errored));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[test]
fn test_budget_shrinks_along_the_chain() {
    let runs = counter();
    let mut builder = GraphBuilder::new();
    let a = builder.add(sleeper("A", 80, 1));
    let b = builder.add(sleeper("B", 80, 2));
    let c = builder.add(counted("C", 3, &runs));
    builder.depend(b, a, true).unwrap();
    builder.depend(c, b, true).unwrap();
    let graph = builder.build();

    // Each node alone fits in the deadline; the chain does not.
    let execution = runner()
        .execute(Duration::from_millis(120), graph.clone(), &[a])
        .unwrap();
    assert!(!execution.completed());

    thread::sleep(Duration::from_millis(100));

    assert_eq!(graph.status(a), Some(ResultStatus::Success));
    assert_eq!(graph.status(c), Some(ResultStatus::Timeout));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[test]
fn test_fan_out_children_time_out_together() {
    let runs = counter();
    let mut builder = GraphBuilder::new();
    let head = builder.add(sleeper("head", 120, 0));
    let children: Vec<_> = (0..4)
        .map(|i| {
            let child = builder.add(counted(&format!("child{i}"), i, &runs));
            builder.depend(child, head, true).unwrap();
            child
        })
        .collect();
    let graph = builder.build();

    let execution = runner()
        .execute_graph(Duration::from_millis(60), graph.clone())
        .unwrap();
    assert!(!execution.completed());

    thread::sleep(Duration::from_millis(120));

    for child in children {
        assert_eq!(graph.status(child), Some(ResultStatus::Timeout));
    }
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[test]
fn test_generous_deadline_completes() {
    let mut builder = GraphBuilder::new();
    let a = builder.add(sleeper("A", 10, 1));
    let b = builder.add(sleeper("B", 10, 2));
    builder.depend(b, a, true).unwrap();

    let execution = runner()
        .execute_graph(Duration::from_secs(2), builder.build())
        .unwrap();

    assert!(execution.completed());
    assert_eq!(execution.status("B"), Some(ResultStatus::Success));
}
