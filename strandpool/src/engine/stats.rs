// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Snapshot of the engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Tasks that ran to completion, including strand tasks and timer callbacks.
    pub tasks_completed: u64,
    /// Tasks that panicked.
    pub task_failures: u64,
    pub timer_fires: u64,
    pub timer_cancellations: u64,
    /// Tasks thrown away by a hard stop.
    pub tasks_dropped: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) tasks_completed: AtomicU64,
    pub(crate) task_failures: AtomicU64,
    pub(crate) timer_fires: AtomicU64,
    pub(crate) timer_cancellations: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, tasks_dropped: u64) -> EngineStats {
        EngineStats {
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            task_failures: self.task_failures.load(Ordering::Relaxed),
            timer_fires: self.timer_fires.load(Ordering::Relaxed),
            timer_cancellations: self.timer_cancellations.load(Ordering::Relaxed),
            tasks_dropped,
        }
    }
}
