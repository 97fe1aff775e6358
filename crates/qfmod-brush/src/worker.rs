// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// worker.rs — worker pool and the counting latch used to join its tasks

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Fixed-size pool the cluster visibility tasks run on.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
}

impl WorkerPool {
    /// `threads == 0` lets rayon pick one worker per CPU.
    pub fn new(threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("brush-worker-{}", i))
            // a panicking task must not take the process down; its missing
            // result is reported by the caller
            .panic_handler(|_| log::error!("brush worker task panicked"))
            .build()?;
        Ok(Self { pool })
    }

    pub fn num_workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Index of the calling worker, `None` off the pool.
    pub fn current_worker(&self) -> Option<usize> {
        self.pool.current_thread_index()
    }

    pub fn spawn<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn(task);
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.num_workers())
            .finish()
    }
}

/// Counts outstanding tasks; the last one to finish wakes the waiter.
pub struct Completion {
    remaining: Mutex<usize>,
    cond: Condvar,
}

impl Completion {
    pub fn new(count: usize) -> Arc<Self> {
        Arc::new(Self {
            remaining: Mutex::new(count),
            cond: Condvar::new(),
        })
    }

    pub fn done(&self) {
        let mut remaining = self.remaining.lock();
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.cond.notify_all();
        }
    }

    pub fn is_complete(&self) -> bool {
        *self.remaining.lock() == 0
    }

    /// Block until every task has signalled, waking every `quantum` to
    /// re-check. Returns how many times the wait was re-armed.
    pub fn wait(&self, quantum: Duration) -> usize {
        let mut remaining = self.remaining.lock();
        let mut rearmed = 0;
        while *remaining > 0 {
            let res = self.cond.wait_for(&mut remaining, quantum);
            if res.timed_out() && *remaining > 0 {
                rearmed += 1;
                log::trace!("join: {} task(s) outstanding, re-arming", *remaining);
            }
        }
        rearmed
    }

    /// Guard that signals completion when dropped, unwinding included.
    pub fn guard(self: &Arc<Self>) -> CompletionGuard {
        CompletionGuard(Arc::clone(self))
    }
}

pub struct CompletionGuard(Arc<Completion>);

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.0.done();
    }
}
