//! Fixed-size thread pool draining a FIFO task queue under a mutex/condvar.
//!
//! This is the runtime's other hard component alongside
//! [`crate::shuffle::ShuffleStore`]: deterministic shutdown, FIFO ordering
//! with respect to submission, and no cancellation. Mirrors the mutex +
//! condvar pattern the teacher's `core::orchestrator::Executor` uses, scaled
//! down to a single shared queue instead of per-executor queues plus
//! work-stealing, since the specification calls for one shared FIFO queue
//! rather than per-core partitions.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, error, trace, warn};

use crate::queue::TaskQueue;
use crate::task::Task;

/// The queue and the running flag live behind one mutex, per the
/// specification's data model — a submitter and a worker never take two
/// locks in different orders, because there is only one lock to take.
struct State {
    queue: TaskQueue,
    running: bool,
}

/// State shared between the pool handle and every worker thread.
struct Shared {
    state: Mutex<State>,
    not_empty: Condvar,
}

/// A fixed-size pool of worker threads draining a shared FIFO task queue.
///
/// Created with `N` threads, all blocked on the pool's condition variable.
/// Accepts tasks via [`WorkerPool::add_work`] until dropped. Dropping the
/// pool flips the running flag, wakes every worker, and joins all of them —
/// any task still queued at that point is drained and run before its
/// worker notices the pool has stopped, because workers check the queue
/// before checking the running flag (see [`worker_loop`]).
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Creates a new pool with `num_threads` worker threads.
    ///
    /// # Panics
    ///
    /// Panics if `num_threads` is zero — the library trusts its caller for
    /// this class of misuse, matching the source's `ThreadPool_create`
    /// contract.
    pub fn new(num_threads: usize) -> Self {
        assert!(num_threads >= 1, "a worker pool needs at least one thread");

        trace!("creating worker pool with {num_threads} threads");

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: TaskQueue::new(),
                running: true,
            }),
            not_empty: Condvar::new(),
        });

        let mut workers = Vec::with_capacity(num_threads);
        for id in 0..num_threads {
            let shared = Arc::clone(&shared);
            match thread::Builder::new()
                .name(format!("mapreduce-worker-{id}"))
                .spawn(move || worker_loop(id, &shared))
            {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    error!("failed to spawn worker thread {id}: {err}");
                    std::process::exit(1);
                }
            }
        }

        Self { shared, workers }
    }

    /// Queues `task` for execution on one of the pool's worker threads.
    ///
    /// Non-blocking. Returns `false` (and logs a warning) if the pool has
    /// already begun shutting down; the runtime driver never calls this
    /// after a pool's shutdown has begun, so in correct use this always
    /// returns `true`.
    pub fn add_work<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.state.lock().unwrap();
        if !state.running {
            warn!("add_work called on a worker pool that is shutting down");
            return false;
        }
        state.queue.push(Box::new(task));
        self.shared.not_empty.notify_one();
        true
    }
}

/// Body of the worker loop contract from the specification: drain the
/// queue fully before checking for shutdown, and always re-check the
/// predicate after waking from the condvar (guards against spurious
/// wakeups and the broadcast-to-many-workers fan-out). The queue and the
/// running flag are read and written under the same guard throughout, so
/// there is no point where this thread holds one of the pool's two pieces
/// of state while waiting on the other.
fn worker_loop(id: usize, shared: &Shared) {
    trace!("worker {id} started");
    let mut state = shared.state.lock().unwrap();
    loop {
        while let Some(task) = state.queue.pop() {
            drop(state);
            debug!("worker {id} running a task");
            task();
            state = shared.state.lock().unwrap();
        }

        if !state.running {
            break;
        }

        state = shared.not_empty.wait(state).unwrap();
    }
    trace!("worker {id} stopped");
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        trace!("shutting down worker pool with {} threads", self.workers.len());
        {
            let mut state = self.shared.state.lock().unwrap();
            state.running = false;
            self.shared.not_empty.notify_all();
        }
        for worker in self.workers.drain(..) {
            if let Err(panic) = worker.join() {
                error!("a worker thread panicked: {panic:?}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn stress_many_noop_tasks_all_complete() {
        let pool = WorkerPool::new(8);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..1_048_576 {
            let counter = Arc::clone(&counter);
            pool.add_work(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        drop(pool);

        assert_eq!(counter.load(Ordering::Relaxed), 1_048_576);
    }

    #[test]
    fn staged_submission_all_complete() {
        let pool = WorkerPool::new(8);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..256 {
            let counter = Arc::clone(&counter);
            pool.add_work(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        thread::sleep(Duration::from_millis(1));
        for _ in 0..256 {
            let counter = Arc::clone(&counter);
            pool.add_work(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        drop(pool);

        assert_eq!(counter.load(Ordering::Relaxed), 512);
    }

    #[test]
    fn add_work_after_shutdown_is_rejected() {
        let pool = WorkerPool::new(2);
        pool.shared.state.lock().unwrap().running = false;
        assert!(!pool.add_work(|| {}));
    }

    #[test]
    fn single_worker_degenerate_case() {
        let pool = WorkerPool::new(1);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            pool.add_work(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        drop(pool);
        assert_eq!(counter.load(Ordering::Relaxed), 100);
    }

    #[test]
    #[should_panic]
    fn zero_threads_panics() {
        let _ = WorkerPool::new(0);
    }
}
