// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Per-thread execution context: which queue the current thread drains and
//! which strand it is currently running for.

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};

// 0 means "none"
static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    static CURRENT_QUEUE: Cell<usize> = const { Cell::new(0) };
    static CURRENT_STRAND: Cell<usize> = const { Cell::new(0) };
}

/// Hands out process-unique ids for queues and strands.
pub(crate) fn next_id() -> usize {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Marks the current thread as a worker of a queue until dropped.
pub(crate) struct WorkerScope {
    previous: usize,
}

impl Drop for WorkerScope {
    fn drop(&mut self) {
        CURRENT_QUEUE.with(|q| q.set(self.previous));
    }
}

pub(crate) fn enter_worker(queue_id: usize) -> WorkerScope {
    let previous = CURRENT_QUEUE.with(|q| q.replace(queue_id));
    WorkerScope { previous }
}

pub(crate) fn is_worker_of(queue_id: usize) -> bool {
    CURRENT_QUEUE.with(|q| q.get() == queue_id)
}

/// Marks the current thread as running tasks of a strand until dropped.
pub(crate) struct StrandScope {
    previous: usize,
}

impl Drop for StrandScope {
    fn drop(&mut self) {
        CURRENT_STRAND.with(|s| s.set(self.previous));
    }
}

pub(crate) fn enter_strand(strand_id: usize) -> StrandScope {
    let previous = CURRENT_STRAND.with(|s| s.replace(strand_id));
    StrandScope { previous }
}

pub(crate) fn in_strand(strand_id: usize) -> bool {
    CURRENT_STRAND.with(|s| s.get() == strand_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_restore_previous_values() {
        let outer = next_id();
        let inner = next_id();
        assert!(!is_worker_of(outer));
        {
            let _w = enter_worker(outer);
            assert!(is_worker_of(outer));
            {
                let _s = enter_strand(inner);
                assert!(in_strand(inner));
            }
            assert!(!in_strand(inner));
        }
        assert!(!is_worker_of(outer));
    }
}
