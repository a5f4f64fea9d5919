use task_harness::{Task, TaskData};

use crate::sort::{batcher_sort, has_sort_shape, odd_even_merge, read_sortable, write_sorted};
use crate::{ThreadPool, chunk_ranges};

/// Sorts `f64` values with Batcher's odd-even merge network on a thread pool.
///
/// Every worker sorts one contiguous chunk, after which pairs of sorted runs are merged in
/// parallel, halving the number of runs per round until one remains. The descriptor layout
/// and failure modes match [`BatcherSortSeq`][crate::BatcherSortSeq].
#[derive(derive_more::Debug)]
pub struct BatcherSortThreads<'a> {
    data: TaskData<'a>,

    #[debug(ignore)]
    pool: ThreadPool,

    input: Vec<f64>,
    result: Vec<f64>,
}

impl<'a> BatcherSortThreads<'a> {
    /// Creates the task around a descriptor, with one worker per available processor.
    #[must_use]
    pub fn new(data: TaskData<'a>) -> Self {
        Self::with_pool(data, ThreadPool::default())
    }

    /// Creates the task around a descriptor, running on the given pool.
    #[must_use]
    pub fn with_pool(data: TaskData<'a>, pool: ThreadPool) -> Self {
        Self {
            data,
            pool,
            input: Vec::new(),
            result: Vec::new(),
        }
    }
}

impl Task for BatcherSortThreads<'_> {
    fn validate(&self) -> bool {
        has_sort_shape(&self.data)
    }

    fn prepare(&mut self) -> bool {
        match read_sortable(&self.data) {
            Some(input) => {
                self.input = input;
                true
            }
            None => false,
        }
    }

    fn execute(&mut self) -> bool {
        let input = &self.input;
        let ranges = chunk_ranges(input.len(), self.pool.thread_count());

        let runs = self.pool.broadcast(|worker_index| {
            let range = ranges
                .get(worker_index)
                .cloned()
                .expect("one range is produced per worker");

            input
                .get(range)
                .map(|chunk| batcher_sort(chunk.to_vec()))
                .unwrap_or_default()
        });

        self.result = merge_runs(&mut self.pool, runs.into_vec());
        true
    }

    fn finalize(&mut self) -> bool {
        write_sorted(&mut self.data, &self.result)
    }
}

/// Merges sorted runs pairwise on the pool until a single sorted sequence remains.
fn merge_runs(pool: &mut ThreadPool, mut runs: Vec<Vec<f64>>) -> Vec<f64> {
    while runs.len() > 1 {
        let leftover = (runs.len() % 2 == 1).then(|| runs.pop()).flatten();

        let pairs: Vec<(Vec<f64>, Vec<f64>)> = {
            let mut iter = runs.into_iter();
            let mut pairs = Vec::new();

            while let (Some(left), Some(right)) = (iter.next(), iter.next()) {
                pairs.push((left, right));
            }

            pairs
        };

        let pairs = &pairs;

        // There are never more pairs than workers, since the first round starts with one
        // run per worker.
        let merged = pool.broadcast(|worker_index| {
            pairs
                .get(worker_index)
                .map(|(left, right)| odd_even_merge(left, right))
        });

        runs = merged.into_vec().into_iter().flatten().chain(leftover).collect();
    }

    runs.pop().unwrap_or_default()
}
