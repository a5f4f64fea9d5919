use task_harness::{Task, TaskData};
use tracing::trace;

use crate::marking::{BinaryImage, DisjointSets, has_marking_shape, read_image, write_labels};
use crate::{ThreadPool, chunk_ranges};

/// Marks the 4-connected components of a binary image on a thread pool.
///
/// The image is cut into horizontal strips, one per worker, and every worker joins the
/// pixels of its strip independently. The strips are then stitched together by joining the
/// sets on either side of every strip boundary, after which the components are numbered in
/// raster order exactly as [`MarkComponentsSeq`][crate::MarkComponentsSeq] numbers them.
/// The descriptor layout and failure modes match the sequential task.
#[derive(derive_more::Debug)]
pub struct MarkComponentsThreads<'a> {
    data: TaskData<'a>,

    #[debug(ignore)]
    pool: ThreadPool,

    image: Option<BinaryImage>,
    labels: Vec<i32>,
}

impl<'a> MarkComponentsThreads<'a> {
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
            image: None,
            labels: Vec::new(),
        }
    }
}

impl Task for MarkComponentsThreads<'_> {
    fn validate(&self) -> bool {
        has_marking_shape(&self.data)
    }

    fn prepare(&mut self) -> bool {
        self.image = read_image(&self.data);
        self.image.is_some()
    }

    fn execute(&mut self) -> bool {
        let Some(image) = &self.image else {
            return false;
        };

        let strips = chunk_ranges(image.rows(), self.pool.thread_count());

        let parents = self.pool.broadcast(|worker_index| {
            strips
                .get(worker_index)
                .map(|rows| image.label_strip(rows.clone()))
                .unwrap_or_default()
        });

        let mut sets = DisjointSets::from_parents(parents.into_vec().concat());

        for strip in strips.iter().skip(1).filter(|strip| !strip.is_empty()) {
            image.join_across(&mut sets, strip.start);
        }

        trace!(
            strips = strips.len(),
            cols = image.cols(),
            "strip boundaries joined"
        );

        match image.compact_labels(&mut sets) {
            Some(labels) => {
                self.labels = labels;
                true
            }
            None => false,
        }
    }

    fn finalize(&mut self) -> bool {
        write_labels(&mut self.data, &self.labels)
    }
}
