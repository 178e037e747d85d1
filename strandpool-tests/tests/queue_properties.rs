// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use strandpool::{EngineError, LifecycleState};
use strandpool_tests::support::start_engine;

#[test]
fn test_each_posted_task_runs_exactly_once() {
    for (workers, tasks) in [(1, 50), (2, 500), (4, 2000), (8, 1000)] {
        let (mut engine, _log) = start_engine(workers);
        let hits: Arc<Vec<AtomicUsize>> = Arc::new((0..tasks).map(|_| AtomicUsize::new(0)).collect());

        // four producers post concurrently
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let handle = engine.handle();
                let hits = hits.clone();
                thread::spawn(move || {
                    for i in (p..tasks).step_by(4) {
                        let hits = hits.clone();
                        handle
                            .post(move || {
                                hits[i].fetch_add(1, Ordering::SeqCst);
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }
        engine.shutdown().unwrap();

        let counts: Vec<usize> = hits.iter().map(|h| h.load(Ordering::SeqCst)).collect();
        assert!(
            counts.iter().all(|&c| c == 1),
            "workers={workers} tasks={tasks}: {counts:?}"
        );
        assert_eq!(engine.stats().tasks_completed, tasks as u64);
    }
}

#[test]
fn test_shutdown_drains_everything_and_joins_workers() {
    let (mut engine, log) = start_engine(3);
    let done = Arc::new(AtomicUsize::new(0));

    for _ in 0..100 {
        let done = done.clone();
        engine
            .post(move || {
                thread::sleep(Duration::from_millis(1));
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }
    engine.shutdown().unwrap();

    assert_eq!(done.load(Ordering::SeqCst), 100);
    assert_eq!(engine.state(), LifecycleState::Stopped);
    assert_eq!(engine.worker_count(), 0);
    assert_eq!(log.messages_with_prefix("Thread Start").len(), 3);
    assert_eq!(log.messages_with_prefix("Thread Finish").len(), 3);
    assert_eq!(engine.stats().tasks_dropped, 0);
}

#[test]
fn test_submission_after_shutdown_is_rejected() {
    let (mut engine, _log) = start_engine(2);
    let handle = engine.handle();
    let strand = engine.create_strand();
    engine.shutdown().unwrap();

    let ran = Arc::new(AtomicUsize::new(0));
    let r = ran.clone();
    assert!(matches!(
        handle.post(move || {
            r.fetch_add(1, Ordering::SeqCst);
        }),
        Err(EngineError::QueueStopped)
    ));
    assert!(matches!(handle.dispatch(|| {}), Err(EngineError::QueueStopped)));
    assert!(matches!(strand.submit(|| {}), Err(EngineError::QueueStopped)));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[test]
fn test_tasks_posted_by_tasks_run_before_shutdown_returns() {
    let (mut engine, _log) = start_engine(2);
    let handle = engine.handle();
    let done = Arc::new(AtomicUsize::new(0));

    for _ in 0..10 {
        let handle = handle.clone();
        let done = done.clone();
        engine
            .post(move || {
                for _ in 0..10 {
                    let done = done.clone();
                    handle
                        .post(move || {
                            done.fetch_add(1, Ordering::SeqCst);
                        })
                        .unwrap();
                }
            })
            .unwrap();
    }
    engine.shutdown().unwrap();

    assert_eq!(done.load(Ordering::SeqCst), 100);
}
