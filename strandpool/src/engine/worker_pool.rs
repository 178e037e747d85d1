// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::pin::pin;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use futures::future::{self, Either};
use log::{debug, Level};

use crate::engine::context;
use crate::engine::controller::Shared;
use crate::engine::error::EngineError;
use crate::engine::task::{panic_message, Job};

/// Fixed set of worker threads draining one task queue. Created once at
/// start, joined once at shutdown.
#[derive(Debug, Default)]
pub(crate) struct WorkerPool {
    workers: Vec<Worker>,
}

#[derive(Debug)]
struct Worker {
    id: usize,
    thread: Option<JoinHandle<()>>,
}

impl WorkerPool {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Spawns `count` workers. On a spawn failure the workers that did start
    /// stay in the pool; the caller is expected to stop and join them.
    pub(crate) fn start(
        &mut self,
        count: usize,
        shared: &Arc<Shared>,
        thread_name: &str,
    ) -> Result<(), EngineError> {
        for id in 0..count {
            let shared = Arc::clone(shared);
            let thread = thread::Builder::new()
                .name(format!("{thread_name}-{id}"))
                .spawn(move || worker_loop(&shared))
                .map_err(EngineError::WorkerSpawn)?;
            self.workers.push(Worker {
                id,
                thread: Some(thread),
            });
        }
        debug!("worker pool started with {count} threads");
        Ok(())
    }

    /// Blocks until every worker thread has exited.
    pub(crate) fn join_all(&mut self, shared: &Shared) {
        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                if let Err(payload) = thread.join() {
                    shared.log(
                        Level::Error,
                        &format!(
                            "worker {} died: {}",
                            worker.id,
                            panic_message(payload.as_ref())
                        ),
                    );
                }
            }
        }
        self.workers.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.workers.len()
    }
}

fn worker_loop(shared: &Shared) {
    let _scope = context::enter_worker(shared.queue.id());
    shared.log(Level::Info, "Thread Start");
    while let Some(job) = next_job(shared) {
        match job {
            Job::Task(task) => shared.run_task(task),
            Job::Strand(core) => core.drain(shared),
        }
        shared.queue.work_finished();
    }
    shared.log(Level::Info, "Thread Finish");
}

/// Waits for the next job while firing timers whose deadline passed.
/// `None` tells the worker to exit.
fn next_job(shared: &Shared) -> Option<Job> {
    shared.timers.fire_expired(shared, Instant::now());
    if let Some(job) = shared.queue.try_pop() {
        return Some(job);
    }
    async_io::block_on(async {
        loop {
            shared.timers.fire_expired(shared, Instant::now());
            let deadline = shared.timers.next_deadline();
            let timer_event = async move {
                match deadline {
                    Some(at) => {
                        let expiry = pin!(async_io::Timer::at(at));
                        let changed = pin!(shared.timers.changed());
                        future::select(expiry, changed).await;
                    }
                    None => shared.timers.changed().await,
                }
            };
            let pop = pin!(shared.queue.pop());
            match future::select(pop, pin!(timer_event)).await {
                Either::Left((job, _)) => return job,
                Either::Right(_) => continue,
            }
        }
    })
}
