// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_channel::{Receiver, Sender};
use log::debug;

use crate::engine::context;
use crate::engine::error::EngineError;
use crate::engine::task::Job;

/// Unbounded MPMC FIFO shared by all workers of one engine.
///
/// The queue counts outstanding work: queued jobs, jobs being executed,
/// pending timer waits and held keep-alive tokens. When the count drops to
/// zero the channel is closed; workers still receive whatever is queued and
/// see "stop" once it is empty.
pub(crate) struct TaskQueue {
    id: usize,
    tx: Sender<Job>,
    rx: Receiver<Job>,
    outstanding: AtomicUsize,
    stopped: AtomicBool,
    dropped: AtomicU64,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        let (tx, rx) = async_channel::unbounded();
        Self {
            id: context::next_id(),
            tx,
            rx,
            outstanding: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    /// Appends a job. Never blocks; fails only once the queue is closed.
    pub(crate) fn post(&self, job: Job) -> Result<(), EngineError> {
        self.work_started();
        match self.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(_) => {
                self.work_finished();
                Err(EngineError::QueueStopped)
            }
        }
    }

    /// Waits for the next job. `None` means the queue is closed and empty, or
    /// was stopped hard.
    pub(crate) async fn pop(&self) -> Option<Job> {
        if self.is_stopped() {
            return None;
        }
        let job = self.rx.recv().await.ok()?;
        self.admit_popped(job)
    }

    pub(crate) fn try_pop(&self) -> Option<Job> {
        if self.is_stopped() {
            return None;
        }
        let job = self.rx.try_recv().ok()?;
        self.admit_popped(job)
    }

    fn admit_popped(&self, job: Job) -> Option<Job> {
        if self.is_stopped() {
            self.discard(job);
            return None;
        }
        Some(job)
    }

    pub(crate) fn keep_alive(self: &Arc<Self>) -> KeepAliveToken {
        self.work_started();
        KeepAliveToken {
            queue: Arc::clone(self),
        }
    }

    pub(crate) fn work_started(&self) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn work_finished(&self) {
        let previous = self.outstanding.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "work_finished without matching work_started");
        if previous == 1 && self.tx.close() {
            debug!("queue {}: out of work, closed", self.id);
        }
    }

    /// Closes the queue at once and throws away everything still queued.
    /// Returns the number of tasks dropped by this call.
    pub(crate) fn stop_now(&self) -> u64 {
        self.stopped.store(true, Ordering::Release);
        self.tx.close();
        let before = self.dropped.load(Ordering::Relaxed);
        while let Ok(job) = self.rx.try_recv() {
            self.discard(job);
        }
        self.dropped.load(Ordering::Relaxed).saturating_sub(before)
    }

    fn discard(&self, job: Job) {
        let tasks = match job {
            Job::Task(_) => 1,
            Job::Strand(core) => core.abandon() as u64,
        };
        self.count_dropped(tasks);
    }

    /// Records tasks thrown away outside of the channel, e.g. by a strand.
    pub(crate) fn count_dropped(&self, tasks: u64) {
        self.dropped.fetch_add(tasks, Ordering::Relaxed);
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub(crate) fn len(&self) -> usize {
        self.rx.len()
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Keeps the queue open while held, even when it runs empty. Dropping the
/// token is what lets workers exit once the remaining work is done.
pub(crate) struct KeepAliveToken {
    queue: Arc<TaskQueue>,
}

impl KeepAliveToken {
    pub(crate) fn release(self) {
        drop(self);
    }
}

impl Drop for KeepAliveToken {
    fn drop(&mut self) {
        self.queue.work_finished();
    }
}
