//! Drives a single map-reduce job: sorts inputs, runs the map phase through
//! one [`WorkerPool`], then the reduce phase through another, against a
//! shared [`ShuffleStore`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{trace, warn};

use crate::shuffle::ShuffleStore;
use crate::worker_pool::WorkerPool;

/// Discards paths that cannot be stat'd, then sorts the rest by descending
/// file size (longest-processing-time-first scheduling).
pub(crate) fn sort_inputs_by_descending_size(filenames: &[impl AsRef<Path>]) -> Vec<PathBuf> {
    let mut sized: Vec<(PathBuf, u64)> = filenames
        .iter()
        .filter_map(|path| {
            let path = path.as_ref();
            match std::fs::metadata(path) {
                Ok(metadata) => Some((path.to_owned(), metadata.len())),
                Err(err) => {
                    warn!("skipping input {path:?}, could not stat it: {err}");
                    None
                }
            }
        })
        .collect();

    sized.sort_unstable_by_key(|(_, size)| std::cmp::Reverse(*size));
    sized.into_iter().map(|(path, _)| path).collect()
}

/// Runs the map phase: one task per sorted input file, on a pool of
/// `num_mappers` workers. Blocks until every mapper has returned.
pub(crate) fn run_map_phase<M>(inputs: &[PathBuf], num_mappers: usize, mapper: Arc<M>)
where
    M: Fn(&Path) + Send + Sync + 'static,
{
    trace!("starting map phase over {} inputs", inputs.len());
    let pool = WorkerPool::new(num_mappers);
    for input in inputs {
        let mapper = Arc::clone(&mapper);
        let input = input.clone();
        pool.add_work(move || mapper(&input));
    }
    drop(pool);
    trace!("map phase drained");
}

/// Runs the reduce phase: one task per partition, on a pool of
/// `num_reducers` workers. Blocks until every reducer has returned.
pub(crate) fn run_reduce_phase<R>(
    store: &Arc<ShuffleStore>,
    num_reducers: usize,
    reducer: Arc<R>,
) where
    R: Fn(&str, usize) + Send + Sync + 'static,
{
    trace!("starting reduce phase over {} partitions", store.num_partitions());
    let pool = WorkerPool::new(num_reducers);
    for p in 0..store.num_partitions() {
        let store = Arc::clone(store);
        let reducer = Arc::clone(&reducer);
        pool.add_work(move || process_partition(&store, p, reducer.as_ref()));
    }
    drop(pool);
    trace!("reduce phase drained");
}

/// `begin_partition(p)`; while a key remains, invoke the reducer, then
/// always `advance_key(p)` — unconditionally, even though the reducer's own
/// `get_next` calls may have already exhausted the key's value list, which
/// closes the historical infinite-loop hazard of never advancing past a
/// key the reducer didn't fully drain.
pub(crate) fn process_partition(store: &ShuffleStore, p: usize, reducer: &(dyn Fn(&str, usize) + Send + Sync)) {
    store.begin_partition(p);
    while let Some(key) = store.current_key(p) {
        reducer(&key, p);
        store.advance_key(p);
    }
}
