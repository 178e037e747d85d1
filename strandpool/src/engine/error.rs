// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::time::Duration;
use thiserror::Error;

/// Rejections and failures surfaced by the engine itself.
///
/// Task panics are not part of this type: they are caught at the worker or
/// strand boundary, logged and counted.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Submission after the controller stopped.
    #[error("controller stopped; submission rejected")]
    QueueStopped,

    /// External submission or timer arm while the controller drains.
    #[error("controller is shutting down; only running tasks may submit work")]
    ShuttingDown,

    #[error("controller has not been started")]
    NotStarted,

    #[error("controller was already started")]
    AlreadyStarted,

    #[error("worker count must be at least 1")]
    InvalidWorkerCount,

    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

/// Failure of the wait mechanism behind a timer. Delivered to the callback
/// as [`crate::TimerStatus::Error`]; the timer must not be re-armed after it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    #[error("deadline for delay {delay:?} is not representable")]
    DeadlineOverflow { delay: Duration },
}
