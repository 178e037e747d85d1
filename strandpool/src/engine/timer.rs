// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_channel::{Receiver, Sender};
use log::Level;

use crate::engine::context;
use crate::engine::controller::{EngineHandle, Shared};
use crate::engine::error::{EngineError, TimerError};
use crate::engine::stats::Counters;
use crate::engine::strand::Strand;
use crate::engine::task::{Job, Task};

/// Why a timer callback is being invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerStatus {
    /// The deadline passed.
    Fired,
    /// The pending wait was cancelled, replaced by a newer one, or the
    /// controller is shutting down. Do not re-arm.
    Cancelled,
    /// The wait itself failed. Terminal for this timer.
    Error(TimerError),
}

impl TimerStatus {
    pub fn is_fired(&self) -> bool {
        matches!(self, TimerStatus::Fired)
    }
}

type Callback = Box<dyn FnMut(TimerStatus, &Timer) + Send + 'static>;

struct TimerInner {
    id: usize,
    strand: Option<Strand>,
    callback: Mutex<Callback>,
}

/// A one-shot deadline with a callback. Periodic behaviour comes from a
/// callback that calls [`Timer::rearm`] before it returns.
///
/// Cloning gives another handle to the same timer.
#[derive(Clone)]
pub struct Timer {
    inner: Arc<TimerInner>,
    engine: EngineHandle,
}

impl Timer {
    pub(crate) fn new(engine: EngineHandle, strand: Option<Strand>, callback: Callback) -> Self {
        Self {
            inner: Arc::new(TimerInner {
                id: context::next_id(),
                strand,
                callback: Mutex::new(callback),
            }),
            engine,
        }
    }

    pub fn id(&self) -> usize {
        self.inner.id
    }

    /// Schedules the next firing `delay` from now. A wait that is still
    /// pending is cancelled first and reported as [`TimerStatus::Cancelled`].
    ///
    /// An unrepresentable deadline is not an error of this call: the callback
    /// receives [`TimerStatus::Error`] instead.
    ///
    /// # Errors
    /// [`EngineError::ShuttingDown`] once the controller drains,
    /// [`EngineError::QueueStopped`] once it stopped.
    pub fn rearm(&self, delay: Duration) -> Result<(), EngineError> {
        let shared = &self.engine.shared;
        shared.admit_timer()?;
        match Instant::now().checked_add(delay) {
            Some(deadline) => shared.timers.schedule(shared, self.clone(), deadline),
            None => deliver(
                shared,
                self.clone(),
                TimerStatus::Error(TimerError::DeadlineOverflow { delay }),
            ),
        }
    }

    /// Cancels the pending wait, if any. Its callback still runs, with
    /// [`TimerStatus::Cancelled`].
    pub fn cancel(&self) -> bool {
        let shared = &self.engine.shared;
        shared.timers.cancel(shared, self.id())
    }

    pub fn is_pending(&self) -> bool {
        self.engine.shared.timers.is_pending(self.id())
    }

    pub fn strand(&self) -> Option<&Strand> {
        self.inner.strand.as_ref()
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    fn invoke(&self, status: TimerStatus) {
        let shared = &self.engine.shared;
        match &status {
            TimerStatus::Fired => Counters::bump(&shared.counters.timer_fires),
            TimerStatus::Cancelled => Counters::bump(&shared.counters.timer_cancellations),
            TimerStatus::Error(e) => {
                shared.log(Level::Warn, &format!("timer {}: {e}", self.id()));
            }
        }
        let mut callback = self
            .inner
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        (*callback)(status, self);
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("id", &self.inner.id)
            .field("strand", &self.inner.strand.as_ref().map(Strand::id))
            .finish()
    }
}

/// Enqueues the callback of `timer`, through its strand if it has one.
fn deliver(shared: &Shared, timer: Timer, status: TimerStatus) -> Result<(), EngineError> {
    let strand = timer.inner.strand.clone();
    let task: Task = Box::new(move || timer.invoke(status));
    match strand {
        Some(strand) => strand.schedule(task),
        None => shared.queue.post(Job::Task(task)),
    }
}

#[derive(Clone)]
struct Entry {
    deadline: Instant,
    seq: u64,
    timer: Timer,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        (self.deadline, self.seq) == (other.deadline, other.seq)
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.deadline, self.seq).cmp(&(other.deadline, other.seq))
    }
}

#[derive(Default)]
struct TimerState {
    heap: BinaryHeap<Reverse<Entry>>,
    // set on shutdown; no wait may be registered afterwards
    closed: bool,
}

/// Pending timer waits of one engine, earliest deadline first.
///
/// Each pending wait holds one unit of outstanding work on the task queue,
/// so an armed timer keeps the workers alive. Arming a new earliest deadline
/// wakes one idle worker so it can shorten its sleep.
pub(crate) struct TimerQueue {
    state: Mutex<TimerState>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    next_seq: AtomicU64,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        let (wake_tx, wake_rx) = async_channel::bounded(1);
        Self {
            state: Mutex::new(TimerState::default()),
            wake_tx,
            wake_rx,
            next_seq: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule(&self, shared: &Shared, timer: Timer, deadline: Instant) -> Result<(), EngineError> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        shared.queue.work_started();
        let registered = {
            let mut state = self.lock();
            if state.closed {
                None
            } else {
                let replaced = take_entry(&mut state.heap, timer.id());
                state.heap.push(Reverse(Entry {
                    deadline,
                    seq,
                    timer,
                }));
                let earliest = state.heap.peek().map(|Reverse(e)| e.seq) == Some(seq);
                Some((replaced, earliest))
            }
        };
        let Some((replaced, earliest)) = registered else {
            shared.queue.work_finished();
            return Err(EngineError::ShuttingDown);
        };
        if let Some(old) = replaced {
            self.release(shared, old, TimerStatus::Cancelled);
        }
        if earliest {
            // a full channel already has a wake-up pending
            let _ = self.wake_tx.try_send(());
        }
        Ok(())
    }

    fn cancel(&self, shared: &Shared, timer_id: usize) -> bool {
        let entry = take_entry(&mut self.lock().heap, timer_id);
        match entry {
            Some(entry) => {
                self.release(shared, entry, TimerStatus::Cancelled);
                true
            }
            None => false,
        }
    }

    fn is_pending(&self, timer_id: usize) -> bool {
        self.lock()
            .heap
            .iter()
            .any(|Reverse(e)| e.timer.id() == timer_id)
    }

    /// Delivers the firing of an entry and gives back its unit of work.
    fn release(&self, shared: &Shared, entry: Entry, status: TimerStatus) {
        let id = entry.timer.id();
        if let Err(e) = deliver(shared, entry.timer, status) {
            shared.log(Level::Warn, &format!("timer {id}: firing dropped: {e}"));
        }
        shared.queue.work_finished();
    }

    /// Fires every wait whose deadline is not after `now`.
    pub(crate) fn fire_expired(&self, shared: &Shared, now: Instant) -> usize {
        let expired: Vec<Entry> = {
            let mut state = self.lock();
            let mut expired = Vec::new();
            while state
                .heap
                .peek()
                .is_some_and(|Reverse(e)| e.deadline <= now)
            {
                if let Some(Reverse(entry)) = state.heap.pop() {
                    expired.push(entry);
                }
            }
            expired
        };
        let count = expired.len();
        for entry in expired {
            self.release(shared, entry, TimerStatus::Fired);
        }
        count
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.lock().heap.peek().map(|Reverse(e)| e.deadline)
    }

    /// Resolves when a new earliest deadline was armed.
    pub(crate) async fn changed(&self) {
        // both ends live in self, so recv only returns on a message
        let _ = self.wake_rx.recv().await;
    }

    /// Refuses new waits and cancels the pending ones; their callbacks run
    /// with [`TimerStatus::Cancelled`].
    pub(crate) fn cancel_all(&self, shared: &Shared) -> usize {
        let entries = self.close();
        let count = entries.len();
        for entry in entries {
            self.release(shared, entry, TimerStatus::Cancelled);
        }
        count
    }

    /// Refuses new waits and forgets the pending ones without running them.
    pub(crate) fn discard_all(&self, shared: &Shared) -> usize {
        let entries = self.close();
        let count = entries.len();
        for _ in entries {
            shared.queue.work_finished();
        }
        count
    }

    fn close(&self) -> Vec<Entry> {
        let mut state = self.lock();
        state.closed = true;
        let mut entries: Vec<Entry> = state.heap.drain().map(|Reverse(e)| e).collect();
        entries.sort();
        entries
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().heap.len()
    }
}

fn take_entry(heap: &mut BinaryHeap<Reverse<Entry>>, timer_id: usize) -> Option<Entry> {
    let mut taken = None;
    heap.retain(|Reverse(e)| {
        if e.timer.id() == timer_id {
            taken = Some(e.clone());
            false
        } else {
            true
        }
    });
    taken
}
