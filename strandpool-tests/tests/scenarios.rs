// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::time::Duration;

use log::Level;
use strandpool::{Logger, MemoryLogger, TimerStatus};
use strandpool_tests::support::start_engine;

fn print_num(logger: &dyn Logger, x: i32) {
    logger.log(Level::Info, &format!("x: {x}"));
}

fn printed(logger: &MemoryLogger) -> Vec<i32> {
    logger
        .messages_with_prefix("x: ")
        .iter()
        .filter_map(|m| m["x: ".len()..].parse().ok())
        .collect()
}

#[test]
fn test_posted_values_appear_exactly_once() {
    let (mut engine, logger) = start_engine(2);

    for x in 6..=10 {
        let l = engine.logger();
        engine.post(move || print_num(&*l, x)).unwrap();
    }
    engine.shutdown().unwrap();

    let mut values = printed(&logger);
    values.sort_unstable();
    assert_eq!(values, vec![6, 7, 8, 9, 10]);
}

#[test]
fn test_strand_values_appear_in_order() {
    let (mut engine, logger) = start_engine(2);
    let strand = engine.create_strand();

    for x in 1..=5 {
        let l = engine.logger();
        strand.submit(move || print_num(&*l, x)).unwrap();
    }
    engine.shutdown().unwrap();

    assert_eq!(printed(&logger), vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_host_application_walkthrough() {
    let (mut engine, logger) = start_engine(2);
    let strand = engine.create_strand();

    let timer_strand = strand.clone();
    engine
        .arm_timer_on(&strand, Duration::from_millis(10), move |status, timer| {
            if status == TimerStatus::Fired {
                let l = timer_strand.logger();
                timer_strand.submit(move || print_num(&*l, 99)).unwrap();
                let _ = timer.rearm(Duration::from_millis(10));
            }
        })
        .unwrap();

    for x in 1..=5 {
        let l = engine.logger();
        strand.submit(move || print_num(&*l, x)).unwrap();
    }
    for x in 6..=10 {
        let l = engine.logger();
        engine.post(move || print_num(&*l, x)).unwrap();
    }
    for x in 11..=15 {
        let l = engine.logger();
        engine.dispatch(move || print_num(&*l, x)).unwrap();
    }
    std::thread::sleep(Duration::from_millis(50));
    engine.shutdown().unwrap();

    let values = printed(&logger);
    let strand_values: Vec<i32> = values.iter().copied().filter(|x| (1..=5).contains(x)).collect();
    assert_eq!(strand_values, vec![1, 2, 3, 4, 5]);

    let mut others: Vec<i32> = values.iter().copied().filter(|x| (6..=15).contains(x)).collect();
    others.sort_unstable();
    assert_eq!(others, (6..=15).collect::<Vec<_>>());
    assert!(values.contains(&99));

    let stats = engine.stats();
    assert_eq!(stats.task_failures, 0);
    assert!(stats.timer_fires >= 1);
    assert_eq!(logger.messages_with_prefix("Thread Finish").len(), 2);
}
