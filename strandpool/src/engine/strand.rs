// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::Level;

use crate::engine::context;
use crate::engine::controller::{EngineHandle, Shared};
use crate::engine::error::EngineError;
use crate::engine::task::{Job, Task};
use crate::logging::Logger;

/// Sub-queue of one strand plus its runner slot.
///
/// `scheduled` is true while a drain pass for this strand is queued or
/// running. Invariant: `pending` is only non-empty while `scheduled` is set,
/// so there is never more than one drain pass and never an orphaned task.
pub(crate) struct StrandCore {
    id: usize,
    state: Mutex<StrandState>,
}

#[derive(Default)]
struct StrandState {
    pending: VecDeque<Task>,
    scheduled: bool,
}

impl StrandCore {
    fn new() -> Self {
        Self {
            id: context::next_id(),
            state: Mutex::new(StrandState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StrandState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `task` behind the earlier strand tasks. Returns true when the
    /// caller has to schedule a drain pass.
    fn enqueue(&self, task: Task) -> bool {
        let mut state = self.lock();
        state.pending.push_back(task);
        if state.scheduled {
            false
        } else {
            state.scheduled = true;
            true
        }
    }

    /// Next task of the current pass. Frees the runner slot when empty.
    fn next(&self) -> Option<Task> {
        let mut state = self.lock();
        let task = state.pending.pop_front();
        if task.is_none() {
            state.scheduled = false;
        }
        task
    }

    /// Throws away every pending task and frees the runner slot.
    pub(crate) fn abandon(&self) -> usize {
        let mut state = self.lock();
        state.scheduled = false;
        let dropped = state.pending.len();
        state.pending.clear();
        dropped
    }

    fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// One drain pass: runs strand tasks one after another until the
    /// sub-queue is empty. Only ever executed by one worker at a time.
    pub(crate) fn drain(self: &Arc<Self>, shared: &Shared) {
        let _scope = context::enter_strand(self.id);
        let mut slot = RunnerSlot {
            core: self,
            shared,
            released: false,
        };
        while let Some(task) = self.next() {
            if shared.queue.is_stopped() {
                drop(task);
                let dropped = 1 + self.abandon();
                shared.queue.count_dropped(dropped as u64);
                break;
            }
            shared.run_task(task);
        }
        slot.released = true;
    }
}

/// Releases the runner slot if a drain pass unwinds. Tasks still pending get
/// a fresh drain pass so the strand does not stall.
struct RunnerSlot<'a> {
    core: &'a Arc<StrandCore>,
    shared: &'a Shared,
    released: bool,
}

impl Drop for RunnerSlot<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let reschedule = {
            let mut state = self.core.lock();
            if state.pending.is_empty() {
                state.scheduled = false;
                false
            } else {
                true
            }
        };
        if reschedule
            && self
                .shared
                .queue
                .post(Job::Strand(Arc::clone(self.core)))
                .is_err()
        {
            self.core.abandon();
        }
    }
}

/// Handle to a serialisation domain on top of the shared worker pool.
///
/// Tasks submitted through the same strand never overlap and run in the
/// order their `submit` calls returned. Different strands, and tasks posted
/// to the engine directly, run concurrently.
#[derive(Clone)]
pub struct Strand {
    core: Arc<StrandCore>,
    engine: EngineHandle,
}

impl Strand {
    pub(crate) fn new(engine: EngineHandle) -> Self {
        Self {
            core: Arc::new(StrandCore::new()),
            engine,
        }
    }

    pub fn id(&self) -> usize {
        self.core.id
    }

    /// Queues `f` on this strand.
    ///
    /// # Errors
    /// Same admission rules as [`EngineHandle::post`].
    pub fn submit<F>(&self, f: F) -> Result<(), EngineError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.engine.shared.admit()?;
        self.schedule(Box::new(f))
    }

    /// Runs `f` right away when the calling thread is already executing a
    /// task of this strand, otherwise behaves like [`Strand::submit`].
    pub fn dispatch<F>(&self, f: F) -> Result<(), EngineError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.running_in_this_thread() {
            if self.engine.shared.queue.is_stopped() {
                return Err(EngineError::QueueStopped);
            }
            self.engine.shared.run_task(Box::new(f));
            Ok(())
        } else {
            self.submit(f)
        }
    }

    /// Returns a closure that submits `f` to this strand every time it is
    /// called. Rejected submissions are logged.
    pub fn wrap<F>(&self, f: F) -> impl Fn() + Send + Sync + 'static
    where
        F: Fn() + Send + Sync + 'static,
    {
        let strand = self.clone();
        let f = Arc::new(f);
        move || {
            let f = Arc::clone(&f);
            if let Err(e) = strand.submit(move || (*f)()) {
                strand
                    .engine
                    .shared
                    .log(Level::Warn, &format!("wrapped strand task rejected: {e}"));
            }
        }
    }

    pub fn running_in_this_thread(&self) -> bool {
        context::in_strand(self.core.id)
    }

    /// Tasks waiting behind the one currently running.
    pub fn pending(&self) -> usize {
        self.core.pending()
    }

    pub fn logger(&self) -> Arc<dyn Logger> {
        self.engine.logger()
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    /// Enqueues without the admission check. Used for timer firings, which
    /// may still be delivered while the controller drains.
    pub(crate) fn schedule(&self, task: Task) -> Result<(), EngineError> {
        if self.core.enqueue(task) {
            self.post_drain_pass()?;
        }
        Ok(())
    }

    /// Puts a drain pass into the shared queue. If the queue refuses it the
    /// sub-queue is abandoned; every task in it except the caller's own was
    /// already accepted, so those are counted and logged as dropped.
    fn post_drain_pass(&self) -> Result<(), EngineError> {
        let shared = &self.engine.shared;
        if let Err(e) = shared.queue.post(Job::Strand(Arc::clone(&self.core))) {
            let accepted = self.core.abandon().saturating_sub(1);
            if accepted > 0 {
                shared.queue.count_dropped(accepted as u64);
                shared.log(
                    Level::Warn,
                    &format!("strand {}: dropped {accepted} accepted tasks", self.core.id),
                );
            }
            return Err(e);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Strand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strand")
            .field("id", &self.core.id)
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::controller::Engine;
    use crate::logging::MemoryLogger;

    #[test]
    fn refused_drain_pass_counts_tasks_already_accepted() {
        let logger = Arc::new(MemoryLogger::new());
        let mut engine = Engine::with_logger(EngineConfig::default(), logger.clone());
        engine.start(1).unwrap();
        let strand = engine.create_strand();
        engine.stop();

        // first submitter wins the runner slot, second one piggybacks on it
        assert!(strand.core.enqueue(Box::new(|| {})));
        assert!(strand.schedule(Box::new(|| {})).is_ok());

        assert!(matches!(
            strand.post_drain_pass(),
            Err(EngineError::QueueStopped)
        ));
        assert_eq!(strand.pending(), 0);
        assert_eq!(engine.stats().tasks_dropped, 1);
        assert_eq!(
            logger.messages_with_prefix(&format!("strand {}:", strand.id())),
            vec![format!("strand {}: dropped 1 accepted tasks", strand.id())]
        );

        // the slot is free again
        assert!(strand.core.enqueue(Box::new(|| {})));
    }
}
