// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use strandpool::{EngineError, TimerStatus};
use strandpool_tests::recorder::ExecutionRecorder;
use strandpool_tests::support::{start_engine, wait_until};

#[test]
fn test_self_rearming_timer_keeps_its_period() {
    let (mut engine, _log) = start_engine(2);
    let period = Duration::from_millis(25);
    let window = Duration::from_millis(500);
    let fired_at = Arc::new(Mutex::new(Vec::new()));

    let f = fired_at.clone();
    engine
        .arm_timer(period, move |status, timer| {
            if status == TimerStatus::Fired {
                f.lock().unwrap().push(Instant::now());
                let _ = timer.rearm(period);
            }
        })
        .unwrap();
    thread::sleep(window);
    engine.shutdown().unwrap();

    let fired_at = fired_at.lock().unwrap();
    // half a period of scheduling slack per firing
    let slack_period = period + period / 2;
    let minimum = (window.as_millis() / slack_period.as_millis()) as usize - 1;
    assert!(
        fired_at.len() >= minimum,
        "only {} firings, expected at least {minimum}",
        fired_at.len()
    );
    for pair in fired_at.windows(2) {
        assert!(pair[1].duration_since(pair[0]) >= period);
    }
}

#[test]
fn test_strand_timer_never_overlaps_strand_tasks() {
    let (mut engine, _log) = start_engine(4);
    let strand = engine.create_strand();
    let recorder = Arc::new(ExecutionRecorder::new());

    let r = recorder.clone();
    let mut ticks = 0;
    engine
        .arm_timer_on(&strand, Duration::from_millis(3), move |status, timer| {
            if status.is_fired() {
                ticks += 1;
                r.record(format!("tick-{ticks}"), || thread::sleep(Duration::from_millis(2)));
                let _ = timer.rearm(Duration::from_millis(3));
            }
        })
        .unwrap();

    for i in 0..30 {
        let r = recorder.clone();
        strand
            .submit(move || r.record(format!("task-{i}"), || thread::sleep(Duration::from_millis(2))))
            .unwrap();
        thread::sleep(Duration::from_millis(1));
    }
    assert!(wait_until(Duration::from_secs(5), || {
        recorder.log().with_prefix("task-").len() == 30
    }));
    engine.shutdown().unwrap();

    let log = recorder.log();
    assert!(!log.with_prefix("tick-").is_empty());
    assert!(
        log.first_overlap().is_none(),
        "strand timer overlapped a strand task: {}",
        log.to_json()
    );
}

#[test]
fn test_shutdown_with_armed_timer_reports_cancellation() {
    let (mut engine, _log) = start_engine(2);
    let statuses = Arc::new(Mutex::new(Vec::new()));

    let s = statuses.clone();
    let timer = engine
        .arm_timer(Duration::from_secs(3600), move |status, timer| {
            let rearm = timer.rearm(Duration::from_secs(3600));
            s.lock().unwrap().push((status, rearm.is_ok()));
        })
        .unwrap();
    assert!(timer.is_pending());

    let started = Instant::now();
    engine.shutdown().unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(*statuses.lock().unwrap(), vec![(TimerStatus::Cancelled, false)]);
    assert!(!timer.is_pending());
    assert!(matches!(
        timer.rearm(Duration::from_millis(1)),
        Err(EngineError::QueueStopped)
    ));
}
