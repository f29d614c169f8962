//! An in-process map-reduce runtime: a fixed-size worker pool draining a
//! FIFO task queue, and a partitioned shuffle store connecting a map phase
//! to a reduce phase.
//!
//! Callers supply a list of input files, a mapper, and a reducer; [`run`]
//! drives the whole job and returns once every reducer has completed. From
//! inside a mapper, call [`emit`] to write a key/value pair into the
//! partition chosen by [`partition`]; from inside a reducer, call
//! [`get_next`] to pull that partition's values for the current key one at
//! a time.
//!
//! The runtime holds a single process-wide "active job" slot so `emit` and
//! `get_next` can reach the running job's shuffle store without the caller
//! threading a context object through fixed mapper/reducer signatures.
//! Only one job may be in flight per process at a time; a reentrant call to
//! [`run`] returns [`RunError::AlreadyRunning`] instead of racing.

mod driver;
mod error;
mod hash_table;
mod queue;
mod shuffle;
mod task;
mod worker_pool;

use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use log::trace;

pub use error::RunError;
pub use shuffle::partition;

use shuffle::ShuffleStore;

/// Process-wide slot holding the shuffle store of the job currently in
/// flight, if any. Populated at the start of [`run`] and cleared when it
/// returns, including when a mapper or reducer panics, via a drop guard.
fn active_job() -> &'static Mutex<Option<Arc<ShuffleStore>>> {
    static ACTIVE_JOB: OnceLock<Mutex<Option<Arc<ShuffleStore>>>> = OnceLock::new();
    ACTIVE_JOB.get_or_init(|| Mutex::new(None))
}

/// Runs one map-reduce job to completion.
///
/// Sorts `filenames` by descending size, runs a map phase of `num_mappers`
/// workers (each invoking `mapper` once per input file), then a reduce
/// phase of `num_reducers` workers (each invoking `reducer` once per key
/// in one partition). Returns once the reduce phase has fully drained.
///
/// Returns [`RunError::AlreadyRunning`] if another call to `run` on this
/// process has not yet returned; otherwise always `Ok`.
///
/// # Panics
///
/// Panics if `num_mappers` or `num_reducers` is zero.
pub fn run<M, R>(
    filenames: &[impl AsRef<Path>],
    mapper: M,
    num_mappers: usize,
    reducer: R,
    num_reducers: usize,
) -> Result<(), RunError>
where
    M: Fn(&Path) + Send + Sync + 'static,
    R: Fn(&str, usize) + Send + Sync + 'static,
{
    assert!(num_mappers >= 1, "num_mappers must be at least 1");
    assert!(num_reducers >= 1, "num_reducers must be at least 1");

    let store = {
        let mut slot = active_job().lock().unwrap();
        if slot.is_some() {
            return Err(RunError::AlreadyRunning);
        }
        let store = Arc::new(ShuffleStore::new(num_reducers));
        *slot = Some(Arc::clone(&store));
        store
    };
    scopeguard::defer! {
        *active_job().lock().unwrap() = None;
        trace!("cleared the active job slot");
    }

    let inputs = driver::sort_inputs_by_descending_size(filenames);
    driver::run_map_phase(&inputs, num_mappers, Arc::new(mapper));
    driver::run_reduce_phase(&store, num_reducers, Arc::new(reducer));

    Ok(())
}

/// Inserts `(key, value)` into the running job's shuffle store, in the
/// partition chosen by [`partition`].
///
/// Callable only from within a mapper passed to [`run`].
///
/// # Panics
///
/// Panics if called while no job is running.
pub fn emit(key: &str, value: impl Into<String>) {
    let slot = active_job().lock().unwrap();
    let store = slot.as_ref().expect("emit called with no job running");
    store.emit(key, value.into());
}

/// Returns the next value for the running job's current key in
/// `partition`, or `None` once that key's value list is exhausted.
///
/// Callable only from within a reducer passed to [`run`].
///
/// # Panics
///
/// Panics if called while no job is running.
pub fn get_next(key: &str, partition: usize) -> Option<String> {
    let slot = active_job().lock().unwrap();
    let store = slot.as_ref().expect("get_next called with no job running");
    store.next_value(partition, key)
}

/// Drains every key of `partition` by repeatedly invoking `reducer`,
/// advancing the key cursor after each call.
///
/// This is the task body each reduce worker runs once per partition; it is
/// exposed directly for callers who want to drive a partition outside the
/// pool-scheduled reduce phase (e.g. in tests).
///
/// # Panics
///
/// Panics if called while no job is running.
pub fn process_partition(partition: usize, reducer: impl Fn(&str, usize)) {
    let slot = active_job().lock().unwrap();
    let store = slot
        .as_ref()
        .expect("process_partition called with no job running");

    store.begin_partition(partition);
    while let Some(key) = store.current_key(partition) {
        reducer(&key, partition);
        store.advance_key(partition);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "{contents}").unwrap();
        path
    }

    #[test]
    #[serial]
    fn word_count_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(&dir, "a.txt", "apple apple bear");
        let b = write_file(&dir, "b.txt", "bear cat");

        let counts = Arc::new(StdMutex::new(std::collections::HashMap::new()));
        let counts_for_reducer = Arc::clone(&counts);

        run(
            &[a, b],
            |path: &Path| {
                let contents = std::fs::read_to_string(path).unwrap();
                for word in contents.split_whitespace() {
                    emit(word, "1");
                }
            },
            2,
            move |key: &str, p: usize| {
                let mut n = 0;
                while get_next(key, p).is_some() {
                    n += 1;
                }
                counts_for_reducer
                    .lock()
                    .unwrap()
                    .insert(key.to_owned(), n);
            },
            3,
        )
        .unwrap();

        let counts = counts.lock().unwrap();
        assert_eq!(counts.get("apple"), Some(&2));
        assert_eq!(counts.get("bear"), Some(&2));
        assert_eq!(counts.get("cat"), Some(&1));
    }

    #[test]
    #[serial]
    fn empty_input_list_completes_with_no_reducer_calls() {
        let reducer_calls = Arc::new(AtomicUsize::new(0));
        let reducer_calls_clone = Arc::clone(&reducer_calls);

        run(
            &[] as &[std::path::PathBuf],
            |_: &Path| panic!("no mapper should run"),
            1,
            move |_: &str, _: usize| {
                reducer_calls_clone.fetch_add(1, Ordering::SeqCst);
            },
            1,
        )
        .unwrap();

        assert_eq!(reducer_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    #[serial]
    fn an_unstattable_file_is_skipped_and_the_job_still_completes() {
        let dir = tempfile::tempdir().unwrap();
        let present = write_file(&dir, "present.txt", "only word");
        let missing = dir.path().join("does-not-exist.txt");

        let mapped = Arc::new(AtomicUsize::new(0));
        let mapped_clone = Arc::clone(&mapped);

        run(
            &[present, missing],
            move |_: &Path| {
                mapped_clone.fetch_add(1, Ordering::SeqCst);
            },
            2,
            |_: &str, _: usize| {},
            1,
        )
        .unwrap();

        assert_eq!(mapped.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[serial]
    fn partition_matches_djb2_modulo() {
        assert_eq!(partition("hello", 1), 0);
    }
}
