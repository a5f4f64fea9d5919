use task_harness::{Task, TaskData};

use crate::crs::{has_multiply_shape, read_operands, write_product};
use crate::{CrsMatrix, ThreadPool, chunk_ranges};

/// Multiplies two matrices in compressed row storage on a thread pool.
///
/// The rows of A are split into contiguous bands, one per worker. Every worker computes its
/// band of the product independently and the bands are stitched together in order. The
/// descriptor layout and failure modes match [`CrsMultiplySeq`][crate::CrsMultiplySeq].
#[derive(derive_more::Debug)]
pub struct CrsMultiplyThreads<'a> {
    data: TaskData<'a>,

    #[debug(ignore)]
    pool: ThreadPool,

    operands: Option<(CrsMatrix, CrsMatrix)>,
    product: CrsMatrix,
}

impl<'a> CrsMultiplyThreads<'a> {
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
            operands: None,
            product: CrsMatrix::default(),
        }
    }
}

impl Task for CrsMultiplyThreads<'_> {
    fn validate(&self) -> bool {
        has_multiply_shape(&self.data)
    }

    fn prepare(&mut self) -> bool {
        self.operands = read_operands(&self.data);
        self.operands.is_some()
    }

    fn execute(&mut self) -> bool {
        let Some((a, b)) = &self.operands else {
            return false;
        };

        // Operands only prepare successfully with matching inner dimensions.
        if a.cols() != b.rows() {
            return false;
        }

        let bands = chunk_ranges(a.rows(), self.pool.thread_count());

        let blocks = self.pool.broadcast(|worker_index| {
            let rows = bands.get(worker_index).cloned().unwrap_or_default();
            a.multiply_rows(b, rows)
        });

        self.product = CrsMatrix::from_row_blocks(a.rows(), b.cols(), blocks.into_vec());
        true
    }

    fn finalize(&mut self) -> bool {
        write_product(&mut self.data, &self.product)
    }
}
