// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use strandpool::{Engine, EngineConfig, MemoryLogger};

/// Starts an engine with `workers` threads that logs into memory.
pub fn start_engine(workers: usize) -> (Engine, Arc<MemoryLogger>) {
    let logger = Arc::new(MemoryLogger::new());
    let config = EngineConfig {
        worker_count: workers,
        thread_name: "strandpool-test".to_string(),
        ..EngineConfig::default()
    };
    let mut engine = Engine::with_logger(config, logger.clone());
    engine
        .start_configured()
        .unwrap_or_else(|e| panic!("failed to start engine: {e}"));
    (engine, logger)
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}
