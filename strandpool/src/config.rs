// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::Arc;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::logging::{ConsoleLogger, LogFacade, Logger};

/// Settings for one engine instance. There is no process-wide config; every
/// engine owns its own copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of worker threads used by the demo and by `Engine::start_configured`.
    pub worker_count: usize,
    /// Worker threads are named `<thread_name>-<index>`.
    pub thread_name: String,
    pub logger: LoggerKind,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2),
            thread_name: "strandpool-worker".to_string(),
            logger: LoggerKind::default(),
        }
    }
}

/// Where engine diagnostics go.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum, Default, Serialize, Deserialize)]
#[clap(rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum LoggerKind {
    #[default]
    /// Forward to the `log` facade
    Log,
    /// Serialised `[thread] message` lines on stdout
    Console,
}

impl LoggerKind {
    pub fn build(self) -> Arc<dyn Logger> {
        match self {
            LoggerKind::Log => Arc::new(LogFacade),
            LoggerKind::Console => Arc::new(ConsoleLogger::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"worker_count": 3}"#).unwrap();
        assert_eq!(config.worker_count, 3);
        assert_eq!(config.thread_name, "strandpool-worker");
        assert_eq!(config.logger, LoggerKind::Log);

        let config: EngineConfig = serde_json::from_str(r#"{"logger": "console"}"#).unwrap();
        assert_eq!(config.logger, LoggerKind::Console);
        assert!(config.worker_count >= 1);
    }
}
