use task_harness::{ProcessRole, Task, TaskData};
use tracing::debug;

use crate::sort::{batcher_sort, has_sort_shape, odd_even_merge, read_sortable, write_sorted};
use crate::{Communicator, chunk_ranges};

/// Sorts `f64` values with Batcher's odd-even merge network across the ranks of a
/// simulated world.
///
/// Only the distinguished rank holds a meaningful descriptor, with the layout of
/// [`BatcherSortSeq`][crate::BatcherSortSeq]. Other ranks may hold an empty descriptor.
///
/// * Validation checks the distinguished rank's descriptor and shares the verdict, so that
///   every rank enters (or skips) the collectives of the later stages together.
/// * Preparation scatters contiguous chunks of the input, one per rank.
/// * Execution sorts every chunk locally, gathers the sorted runs on the distinguished rank
///   and merges them there.
/// * Finalization writes the result on the distinguished rank.
///
/// Every rank must drive its task through the same stages the same number of times.
#[derive(Debug)]
pub struct BatcherSortDistributed<'a> {
    data: TaskData<'a>,
    comm: Communicator,
    chunk: Vec<f64>,
    result: Vec<f64>,
}

impl<'a> BatcherSortDistributed<'a> {
    /// Creates this rank's task around its descriptor.
    #[must_use]
    pub fn new(data: TaskData<'a>, comm: Communicator) -> Self {
        Self {
            data,
            comm,
            chunk: Vec::new(),
            result: Vec::new(),
        }
    }

    fn is_root(&self) -> bool {
        self.comm.rank() == ProcessRole::DISTINGUISHED_RANK
    }
}

impl Task for BatcherSortDistributed<'_> {
    fn validate(&self) -> bool {
        let verdict = self.is_root().then(|| has_sort_shape(&self.data));
        self.comm.broadcast(ProcessRole::DISTINGUISHED_RANK, verdict)
    }

    fn prepare(&mut self) -> bool {
        let chunks = if self.is_root() {
            let size = self.comm.size();

            Some(read_sortable(&self.data).map(|input| {
                chunk_ranges(input.len(), size)
                    .into_iter()
                    .map(|range| input.get(range).map(<[f64]>::to_vec).unwrap_or_default())
                    .collect::<Vec<_>>()
            }))
        } else {
            None
        };

        let ready = chunks.as_ref().map(Option::is_some);
        if !self.comm.broadcast(ProcessRole::DISTINGUISHED_RANK, ready) {
            return false;
        }

        self.chunk = self
            .comm
            .scatter(ProcessRole::DISTINGUISHED_RANK, chunks.flatten());

        debug!(rank = self.comm.rank(), len = self.chunk.len(), "received chunk");

        true
    }

    fn execute(&mut self) -> bool {
        let run = batcher_sort(self.chunk.clone());

        if let Some(runs) = self.comm.gather(ProcessRole::DISTINGUISHED_RANK, run) {
            self.result = runs
                .into_iter()
                .reduce(|merged, run| odd_even_merge(&merged, &run))
                .unwrap_or_default();
        }

        true
    }

    fn finalize(&mut self) -> bool {
        let written = self
            .is_root()
            .then(|| write_sorted(&mut self.data, &self.result));

        self.comm.broadcast(ProcessRole::DISTINGUISHED_RANK, written)
    }

    fn role(&self) -> ProcessRole {
        self.comm.role()
    }
}
