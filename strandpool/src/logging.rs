// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Diagnostics sinks handed to the engine.
//!
//! The engine never writes to a process-wide stream on its own. It gets an
//! `Arc<dyn Logger>` at construction and passes it to workers, strands and
//! timers. Every record is tagged with the id of the emitting thread.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, ThreadId};

use log::Level;

pub trait Logger: Send + Sync {
    fn log(&self, level: Level, message: &str);
}

/// Forwards records to the `log` facade (and thus to env_logger in the demo).
#[derive(Debug, Default)]
pub struct LogFacade;

impl Logger for LogFacade {
    fn log(&self, level: Level, message: &str) {
        log::log!(target: "strandpool", level, "[{:?}] {}", thread::current().id(), message);
    }
}

/// Writes `[<thread id>] <message>` lines to stdout, one writer at a time.
#[derive(Debug)]
pub struct ConsoleLogger {
    out: Mutex<io::Stdout>,
}

impl ConsoleLogger {
    pub fn new() -> Self {
        Self {
            out: Mutex::new(io::stdout()),
        }
    }
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger for ConsoleLogger {
    fn log(&self, _level: Level, message: &str) {
        let out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out = out.lock();
        // a closed stdout is not worth failing a worker over
        let _ = writeln!(out, "[{:?}] {}", thread::current().id(), message);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub level: Level,
    pub thread: ThreadId,
    pub message: String,
}

/// Keeps every record in memory. Meant for tests and for hosts that render
/// diagnostics themselves.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    lines: Mutex<Vec<LogLine>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<LogLine> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.lines().into_iter().map(|l| l.message).collect()
    }

    /// Messages that start with `prefix`, in the order they were logged.
    pub fn messages_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|m| m.starts_with(prefix))
            .collect()
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: Level, message: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LogLine {
                level,
                thread: thread::current().id(),
                message: message.to_string(),
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn memory_logger_keeps_order_and_thread() {
        let logger = Arc::new(MemoryLogger::new());
        logger.log(Level::Info, "x: 1");
        let l = logger.clone();
        let other = thread::spawn(move || {
            l.log(Level::Warn, "x: 2");
            thread::current().id()
        })
        .join()
        .unwrap();
        logger.log(Level::Info, "done");

        let lines = logger.lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].thread, thread::current().id());
        assert_eq!(lines[1].thread, other);
        assert_eq!(lines[1].level, Level::Warn);
        assert_eq!(logger.messages_with_prefix("x: "), vec!["x: 1", "x: 2"]);
    }
}
