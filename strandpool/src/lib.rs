// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! strandpool: a shared task queue drained by a fixed pool of worker threads,
//! strands that serialise a subset of tasks, and timers that re-arm themselves
//! from inside their own callbacks.

pub mod config;
pub mod engine;
pub mod logging;

pub use crate::config::{EngineConfig, LoggerKind};
pub use crate::engine::controller::{Engine, EngineHandle, LifecycleState};
pub use crate::engine::error::{EngineError, TimerError};
pub use crate::engine::stats::EngineStats;
pub use crate::engine::strand::Strand;
pub use crate::engine::timer::{Timer, TimerStatus};
pub use crate::logging::{ConsoleLogger, LogFacade, LogLine, Logger, MemoryLogger};
