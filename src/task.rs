//! A unit of work queued for execution by a [`crate::worker_pool::WorkerPool`].

/// A boxed closure queued for execution on a worker thread.
///
/// This is the idiomatic collapse of "function pointer + opaque argument":
/// the argument is captured by the closure itself rather than passed as a
/// raw pointer, so a `Task` is immutable and self-contained from the moment
/// it is constructed until the worker that pops it runs and drops it.
pub(crate) type Task = Box<dyn FnOnce() + Send + 'static>;
