// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, Level};

use crate::config::EngineConfig;
use crate::engine::context;
use crate::engine::error::EngineError;
use crate::engine::stats::{Counters, EngineStats};
use crate::engine::strand::Strand;
use crate::engine::task::{run_catching, Job, Task};
use crate::engine::task_queue::{KeepAliveToken, TaskQueue};
use crate::engine::timer::{Timer, TimerQueue, TimerStatus};
use crate::engine::worker_pool::WorkerPool;
use crate::logging::Logger;

/// `Created → Running → Draining → Stopped`, never backwards.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    /// Constructed, no workers yet. Submissions are rejected.
    Created = 0,
    /// Workers running, keep-alive held, all submissions accepted.
    Running = 1,
    /// Keep-alive released. Only tasks already running on a worker may
    /// submit follow-up work; timers can no longer be armed.
    Draining = 2,
    /// Workers joined. Everything is rejected.
    Stopped = 3,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LifecycleState::Created,
            1 => LifecycleState::Running,
            2 => LifecycleState::Draining,
            _ => LifecycleState::Stopped,
        }
    }
}

/// State shared by the controller, its workers and every handle.
pub(crate) struct Shared {
    pub(crate) queue: Arc<TaskQueue>,
    pub(crate) timers: TimerQueue,
    pub(crate) logger: Arc<dyn Logger>,
    pub(crate) counters: Counters,
    state: AtomicU8,
}

impl Shared {
    fn new(logger: Arc<dyn Logger>) -> Self {
        Self {
            queue: Arc::new(TaskQueue::new()),
            timers: TimerQueue::new(),
            logger,
            counters: Counters::default(),
            state: AtomicU8::new(LifecycleState::Created as u8),
        }
    }

    pub(crate) fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: LifecycleState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Admission check for `post`, `dispatch` and strand submissions.
    pub(crate) fn admit(&self) -> Result<(), EngineError> {
        match self.state() {
            LifecycleState::Running => Ok(()),
            LifecycleState::Draining if context::is_worker_of(self.queue.id()) => Ok(()),
            LifecycleState::Draining => Err(EngineError::ShuttingDown),
            LifecycleState::Created => Err(EngineError::NotStarted),
            LifecycleState::Stopped => Err(EngineError::QueueStopped),
        }
    }

    /// Admission check for arming timers. Stricter than [`Shared::admit`]:
    /// a draining controller must not gain new pending waits.
    pub(crate) fn admit_timer(&self) -> Result<(), EngineError> {
        match self.state() {
            LifecycleState::Running => Ok(()),
            LifecycleState::Draining => Err(EngineError::ShuttingDown),
            LifecycleState::Created => Err(EngineError::NotStarted),
            LifecycleState::Stopped => Err(EngineError::QueueStopped),
        }
    }

    /// Runs one user task; a panic is logged and counted, never propagated.
    pub(crate) fn run_task(&self, task: Task) {
        match run_catching(task) {
            Ok(()) => Counters::bump(&self.counters.tasks_completed),
            Err(message) => {
                Counters::bump(&self.counters.task_failures);
                self.log(Level::Error, &format!("Exception: {message}"));
            }
        }
    }

    pub(crate) fn log(&self, level: Level, message: &str) {
        self.logger.log(level, message);
    }

    fn stats(&self) -> EngineStats {
        self.counters.snapshot(self.queue.dropped())
    }
}

/// Cloneable submission handle. Tasks capture one of these to post
/// follow-up work, create strands or arm timers.
#[derive(Clone)]
pub struct EngineHandle {
    pub(crate) shared: Arc<Shared>,
}

impl EngineHandle {
    /// Enqueues `f`, fire-and-forget.
    ///
    /// # Errors
    /// [`EngineError::NotStarted`] before `start`, [`EngineError::ShuttingDown`]
    /// from outside the pool while draining, [`EngineError::QueueStopped`]
    /// after the controller stopped.
    pub fn post<F>(&self, f: F) -> Result<(), EngineError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.admit()?;
        self.shared.queue.post(Job::Task(Box::new(f)))
    }

    /// Like [`EngineHandle::post`], but runs `f` inline when called from one
    /// of this engine's workers. Callers must not rely on either outcome.
    pub fn dispatch<F>(&self, f: F) -> Result<(), EngineError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.admit()?;
        if context::is_worker_of(self.shared.queue.id()) {
            self.shared.run_task(Box::new(f));
            Ok(())
        } else {
            self.shared.queue.post(Job::Task(Box::new(f)))
        }
    }

    pub fn create_strand(&self) -> Strand {
        Strand::new(self.clone())
    }

    /// Arms a new timer that invokes `callback` through the queue no earlier
    /// than `delay` from now.
    ///
    /// # Errors
    /// See [`Timer::rearm`].
    pub fn arm_timer<F>(&self, delay: Duration, callback: F) -> Result<Timer, EngineError>
    where
        F: FnMut(TimerStatus, &Timer) + Send + 'static,
    {
        let timer = Timer::new(self.clone(), None, Box::new(callback));
        timer.rearm(delay)?;
        Ok(timer)
    }

    /// Like [`EngineHandle::arm_timer`], with the callback running on `strand`.
    pub fn arm_timer_on<F>(
        &self,
        strand: &Strand,
        delay: Duration,
        callback: F,
    ) -> Result<Timer, EngineError>
    where
        F: FnMut(TimerStatus, &Timer) + Send + 'static,
    {
        let timer = Timer::new(self.clone(), Some(strand.clone()), Box::new(callback));
        timer.rearm(delay)?;
        Ok(timer)
    }

    pub fn logger(&self) -> Arc<dyn Logger> {
        Arc::clone(&self.shared.logger)
    }

    pub fn state(&self) -> LifecycleState {
        self.shared.state()
    }

    pub fn stats(&self) -> EngineStats {
        self.shared.stats()
    }

    /// True when the calling thread is one of this engine's workers.
    pub fn is_worker_thread(&self) -> bool {
        context::is_worker_of(self.shared.queue.id())
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("state", &self.shared.state())
            .field("queued", &self.shared.queue.len())
            .field("outstanding", &self.shared.queue.outstanding())
            .field("timers", &self.shared.timers.len())
            .finish()
    }
}

/// Owns the queue, the worker pool and the keep-alive token.
///
/// Dropping a running engine performs [`Engine::shutdown`].
pub struct Engine {
    handle: EngineHandle,
    pool: WorkerPool,
    keep_alive: Option<KeepAliveToken>,
    config: EngineConfig,
}

impl Engine {
    /// Builds an engine whose logger is chosen by `config.logger`.
    pub fn with_config(config: EngineConfig) -> Self {
        let logger = config.logger.build();
        Self::with_logger(config, logger)
    }

    /// Builds an engine that reports to `logger`, ignoring `config.logger`.
    pub fn with_logger(config: EngineConfig, logger: Arc<dyn Logger>) -> Self {
        Self {
            handle: EngineHandle {
                shared: Arc::new(Shared::new(logger)),
            },
            pool: WorkerPool::new(),
            keep_alive: None,
            config,
        }
    }

    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self::with_logger(EngineConfig::default(), logger)
    }

    /// Takes the keep-alive token and spawns `worker_count` workers.
    ///
    /// # Errors
    /// [`EngineError::InvalidWorkerCount`] for zero workers,
    /// [`EngineError::AlreadyStarted`] unless in `Created`, and
    /// [`EngineError::WorkerSpawn`] if the OS refuses a thread. In the last
    /// case the engine is stopped before returning.
    pub fn start(&mut self, worker_count: usize) -> Result<(), EngineError> {
        if worker_count == 0 {
            return Err(EngineError::InvalidWorkerCount);
        }
        let shared = Arc::clone(&self.handle.shared);
        if shared.state() != LifecycleState::Created {
            return Err(EngineError::AlreadyStarted);
        }
        self.keep_alive = Some(shared.queue.keep_alive());
        shared.set_state(LifecycleState::Running);
        if let Err(e) = self
            .pool
            .start(worker_count, &shared, &self.config.thread_name)
        {
            self.stop();
            return Err(e);
        }
        info!("engine started with {worker_count} workers");
        Ok(())
    }

    /// Starts with `config.worker_count` workers.
    pub fn start_configured(&mut self) -> Result<(), EngineError> {
        self.start(self.config.worker_count)
    }

    /// Stops accepting external work, cancels pending timers, releases the
    /// keep-alive token and blocks until every worker has exited.
    ///
    /// Work already queued, and work those tasks post while draining, still
    /// runs. There is no timeout: a task that never returns blocks this call.
    pub fn shutdown(&mut self) -> Result<(), EngineError> {
        let shared = Arc::clone(&self.handle.shared);
        match shared.state() {
            LifecycleState::Created => {
                shared.set_state(LifecycleState::Stopped);
                shared.timers.discard_all(&shared);
                shared.queue.stop_now();
                return Ok(());
            }
            LifecycleState::Draining | LifecycleState::Stopped => return Ok(()),
            LifecycleState::Running => {}
        }

        shared.set_state(LifecycleState::Draining);
        let cancelled = shared.timers.cancel_all(&shared);
        debug!("draining: cancelled {cancelled} pending timers");
        if let Some(token) = self.keep_alive.take() {
            token.release();
        }
        self.pool.join_all(&shared);
        shared.set_state(LifecycleState::Stopped);
        info!("engine stopped after draining");
        Ok(())
    }

    /// Hard stop: closes the queue at once. Running tasks finish, queued ones
    /// are dropped unexecuted, pending timers are forgotten.
    pub fn stop(&mut self) {
        let shared = Arc::clone(&self.handle.shared);
        if shared.state() == LifecycleState::Stopped {
            return;
        }
        shared.set_state(LifecycleState::Stopped);
        shared.timers.discard_all(&shared);
        let dropped = shared.queue.stop_now();
        if dropped > 0 {
            shared.log(Level::Warn, &format!("stop dropped {dropped} queued tasks"));
        }
        if let Some(token) = self.keep_alive.take() {
            token.release();
        }
        self.pool.join_all(&shared);
        info!("engine stopped");
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn worker_count(&self) -> usize {
        self.pool.len()
    }

    pub fn post<F>(&self, f: F) -> Result<(), EngineError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.post(f)
    }

    pub fn dispatch<F>(&self, f: F) -> Result<(), EngineError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.dispatch(f)
    }

    pub fn create_strand(&self) -> Strand {
        self.handle.create_strand()
    }

    pub fn arm_timer<F>(&self, delay: Duration, callback: F) -> Result<Timer, EngineError>
    where
        F: FnMut(TimerStatus, &Timer) + Send + 'static,
    {
        self.handle.arm_timer(delay, callback)
    }

    pub fn arm_timer_on<F>(
        &self,
        strand: &Strand,
        delay: Duration,
        callback: F,
    ) -> Result<Timer, EngineError>
    where
        F: FnMut(TimerStatus, &Timer) + Send + 'static,
    {
        self.handle.arm_timer_on(strand, delay, callback)
    }

    pub fn logger(&self) -> Arc<dyn Logger> {
        self.handle.logger()
    }

    pub fn state(&self) -> LifecycleState {
        self.handle.state()
    }

    pub fn stats(&self) -> EngineStats {
        self.handle.stats()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.state() == LifecycleState::Running {
            // shutdown of a running engine cannot fail
            let _ = self.shutdown();
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("handle", &self.handle)
            .field("workers", &self.pool.len())
            .field("config", &self.config)
            .finish()
    }
}
