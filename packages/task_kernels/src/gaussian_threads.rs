use task_harness::{Task, TaskData};

use crate::gaussian::{FilterInput, has_filter_shape, read_filter_input, write_filtered};
use crate::{ThreadPool, chunk_ranges};

/// Applies a horizontal three-tap Gaussian filter to a square `f64` image on a thread pool.
///
/// The rows of the image are split into contiguous bands, one per worker. The descriptor
/// layout and failure modes match [`GaussianFilterSeq`][crate::GaussianFilterSeq].
#[derive(derive_more::Debug)]
pub struct GaussianFilterThreads<'a> {
    data: TaskData<'a>,

    #[debug(ignore)]
    pool: ThreadPool,

    prepared: Option<FilterInput>,
    result: Vec<f64>,
}

impl<'a> GaussianFilterThreads<'a> {
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
            prepared: None,
            result: Vec::new(),
        }
    }
}

impl Task for GaussianFilterThreads<'_> {
    fn validate(&self) -> bool {
        has_filter_shape(&self.data)
    }

    fn prepare(&mut self) -> bool {
        self.prepared = read_filter_input(&self.data);
        self.prepared.is_some()
    }

    fn execute(&mut self) -> bool {
        let Some(input) = &self.prepared else {
            return false;
        };

        let bands = chunk_ranges(input.height(), self.pool.thread_count());

        let filtered = self.pool.broadcast(|worker_index| {
            bands
                .get(worker_index)
                .map(|rows| input.filter_rows(rows.clone()))
                .unwrap_or_default()
        });

        self.result = filtered.into_vec().concat();
        true
    }

    fn finalize(&mut self) -> bool {
        write_filtered(&mut self.data, &self.result)
    }
}

#[cfg(test)]
#[cfg(not(miri))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::num::NonZero;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use task_harness::Lifecycle;

    use super::*;
    use crate::GaussianFilterSeq;

    fn filter_seq(image: &[f64], kernel: &[i32]) -> Vec<f64> {
        let mut output = vec![0.0; image.len()];

        let mut task = GaussianFilterSeq::new(
            TaskData::new()
                .with_input(image)
                .with_input(kernel)
                .with_output(&mut output),
        );
        Lifecycle::new(&mut task).run_once().unwrap();
        drop(task);

        output
    }

    fn filter_threads(thread_count: usize, image: &[f64], kernel: &[i32]) -> Vec<f64> {
        let mut output = vec![0.0; image.len()];

        let mut task = GaussianFilterThreads::with_pool(
            TaskData::new()
                .with_input(image)
                .with_input(kernel)
                .with_output(&mut output),
            ThreadPool::new(NonZero::new(thread_count).unwrap()),
        );
        Lifecycle::new(&mut task).run_once().unwrap();
        drop(task);

        output
    }

    #[test]
    fn matches_sequential_filter() {
        let mut rng = StdRng::seed_from_u64(3);
        let image: Vec<f64> = (0..31 * 31).map(|_| rng.random_range(0.0..255.0)).collect();
        let kernel = [1, 2, 1];

        let expected = filter_seq(&image, &kernel);

        for thread_count in [1, 2, 3, 8] {
            assert_eq!(
                filter_threads(thread_count, &image, &kernel),
                expected,
                "{thread_count} threads"
            );
        }
    }

    #[test]
    fn more_threads_than_rows() {
        let image = [4.0, 0.0, 0.0, 4.0];

        assert_eq!(
            filter_threads(5, &image, &[1, 2, 1]),
            vec![2.0, 1.0, 1.0, 2.0]
        );
    }

    #[test]
    fn zero_sum_kernel_fails_preparation() {
        let image = [1.0; 4];
        let kernel = [1, -1, 0];
        let mut output = [0.0; 4];

        let mut task = GaussianFilterThreads::with_pool(
            TaskData::new()
                .with_input(&image)
                .with_input(&kernel)
                .with_output(&mut output),
            ThreadPool::new(NonZero::new(2).unwrap()),
        );

        assert!(task.validate());
        assert!(!task.prepare());
    }
}
