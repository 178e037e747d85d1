// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::engine::strand::StrandCore;

/// A unit of deferred work. Ownership moves into the queue on submission and
/// to the worker that pops it.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// What the shared queue actually carries.
pub(crate) enum Job {
    /// A task posted directly to the queue.
    Task(Task),
    /// One drain pass over a strand's sub-queue.
    Strand(Arc<StrandCore>),
}

/// Runs a task and turns a panic into its message.
pub(crate) fn run_catching(task: Task) -> Result<(), String> {
    panic::catch_unwind(AssertUnwindSafe(task)).map_err(|payload| panic_message(payload.as_ref()))
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
