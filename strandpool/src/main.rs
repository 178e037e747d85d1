// SPDX-License-Identifier: MIT
// strandpool-demo: walks through the engine the way a host application uses it
//
// - A strand-bound timer that re-arms itself and prints 99 on every tick.
// - Five strand tasks (always in order), five posted and five dispatched tasks.
// - Graceful shutdown: release the keep-alive, drain, join.
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use log::{info, Level};

use strandpool::{Engine, EngineConfig, Logger, LoggerKind, Strand, Timer, TimerStatus};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Number of worker threads
    #[arg(long, default_value_t = 2)]
    workers: usize,

    /// Period of the strand-bound timer in milliseconds
    #[arg(long = "timer-period-ms", default_value_t = 500)]
    timer_period_ms: u64,

    /// How long to let the timer tick before shutting down, in milliseconds
    #[arg(long = "run-for-ms", default_value_t = 2000)]
    run_for_ms: u64,

    /// Where engine diagnostics go
    #[arg(long, value_enum, default_value_t = LoggerKind::Console)]
    logger: LoggerKind,

    /// Print the final engine statistics as JSON
    #[arg(long)]
    json: bool,
}

fn validate_args(args: &Args) -> Result<(), String> {
    if args.workers == 0 {
        return Err("--workers must be at least 1".into());
    }
    if args.timer_period_ms == 0 {
        return Err("--timer-period-ms must be at least 1".into());
    }
    Ok(())
}

fn print_num(logger: &dyn Logger, x: i32) {
    logger.log(Level::Info, &format!("x: {x}"));
}

fn timer_handler(status: TimerStatus, timer: &Timer, strand: &Strand, period: Duration) {
    let logger = strand.logger();
    match status {
        TimerStatus::Fired => {
            logger.log(Level::Info, "TimerHandler");
            let l = Arc::clone(&logger);
            if let Err(e) = strand.submit(move || print_num(&*l, 99)) {
                logger.log(Level::Warn, &format!("Error: {e}"));
            }
            if let Err(e) = timer.rearm(period) {
                logger.log(Level::Info, &format!("timer not re-armed: {e}"));
            }
        }
        TimerStatus::Cancelled => logger.log(Level::Info, "TimerHandler cancelled"),
        TimerStatus::Error(e) => logger.log(Level::Error, &format!("Error: {e}")),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = validate_args(&args) {
        eprintln!("Error: {e}");
        std::process::exit(2);
    }

    let config = EngineConfig {
        worker_count: args.workers,
        logger: args.logger,
        ..EngineConfig::default()
    };
    let mut engine = Engine::with_config(config);
    engine.start_configured()?;

    let logger = engine.logger();
    logger.log(
        Level::Info,
        "The program will exit when all work has finished.",
    );

    // timer callbacks and strand tasks share the strand, so they never overlap
    let strand = engine.create_strand();
    let period = Duration::from_millis(args.timer_period_ms);
    let timer_strand = strand.clone();
    engine.arm_timer_on(&strand, period, move |status, timer| {
        timer_handler(status, timer, &timer_strand, period)
    })?;

    thread::sleep(Duration::from_millis(100));
    for x in 1..=5 {
        let l = Arc::clone(&logger);
        strand.submit(move || print_num(&*l, x))?;
    }

    thread::sleep(Duration::from_millis(100));
    for x in 6..=10 {
        let l = Arc::clone(&logger);
        engine.post(move || print_num(&*l, x))?;
    }

    thread::sleep(Duration::from_millis(100));
    // not on a worker thread, so these are queued like posts
    for x in 11..=15 {
        let l = Arc::clone(&logger);
        engine.dispatch(move || print_num(&*l, x))?;
    }

    thread::sleep(Duration::from_millis(args.run_for_ms));
    info!("Stopping strandpool-demo");
    engine.shutdown()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&engine.stats())?);
    }
    Ok(())
}
