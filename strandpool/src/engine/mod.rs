// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>
//! # Design: Shared-Queue Worker Pool with Strands
//!
//! ## Overview
//! One task queue, drained by a fixed number of worker threads.
//!
//! - Producers post boxed closures into an unbounded `async-channel` queue.
//! - Every worker pops, runs, catches panics and logs them, then pops again.
//! - The queue tracks outstanding work (queued + running tasks, pending timer
//!   waits, keep-alive tokens). It closes itself when that count reaches zero,
//!   and workers exit once the closed queue is empty.
//! - A strand keeps its own ordered sub-queue. At most one drain pass per
//!   strand sits in the shared queue or runs on a worker, so strand tasks never
//!   overlap and keep their submission order.
//! - Timers have no thread of their own. Idle workers sleep on "next task or
//!   earliest deadline" and enqueue the firing when a deadline passes.
//!
//! ```text
//!         +-------------------------------------------+
//!         |  Engine  (start / post / dispatch / stop) |
//!         +-----+-------------------+-----------------+
//!               |                   |
//!               v                   v
//!      +--------+-------+    +------+------+
//!      | Strand queues  |    | Timer heap  |
//!      +--------+-------+    +------+------+
//!               | one drain pass    | expiry
//!               v                   v
//!         +-----+-------------------+-----+
//!         |           Task queue          |
//!         +----+-----------+----------+---+
//!              |           |          |
//!         +----v----+ +----v----+ +---v-----+
//!         | worker  | | worker  | | worker  |
//!         +---------+ +---------+ +---------+
//! ```

pub mod context;
pub mod controller;
pub mod error;
pub mod stats;
pub mod strand;
pub mod task;
pub mod task_queue;
pub mod timer;
pub mod worker_pool;
