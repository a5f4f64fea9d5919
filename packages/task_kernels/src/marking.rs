use std::ops::Range;

use task_harness::{Task, TaskData};

/// Marks the 4-connected components of a binary image, on the calling thread.
///
/// Descriptor layout:
///
/// | Region   | Type  | Contents                                            |
/// |----------|-------|-----------------------------------------------------|
/// | input 0  | `i32` | image in row-major order, every pixel 0 or 1        |
/// | input 1  | `u32` | dimensions of the image: `[rows, cols]`             |
/// | output 0 | `i32` | component labels, same count as input 0             |
///
/// Background pixels are labelled 0. Components are labelled 1, 2, ... in the raster order
/// of their first pixel, so the labelling is unique for any given image. Preparation fails
/// if a pixel is neither 0 nor 1 or if the dimensions disagree with the pixel count.
///
/// # Examples
///
/// ```
/// use task_harness::{Lifecycle, TaskData};
/// use task_kernels::MarkComponentsSeq;
///
/// let image = [
///     1, 1, 0, //
///     0, 0, 1, //
///     1, 0, 1,
/// ];
/// let dims = [3_u32, 3];
/// let mut labels = [0; 9];
///
/// let mut task = MarkComponentsSeq::new(
///     TaskData::new()
///         .with_input(&image)
///         .with_input(&dims)
///         .with_output(&mut labels),
/// );
/// Lifecycle::new(&mut task).run_once().unwrap();
/// drop(task);
///
/// assert_eq!(labels, [1, 1, 0, 0, 0, 2, 3, 0, 2]);
/// ```
#[derive(Debug)]
pub struct MarkComponentsSeq<'a> {
    data: TaskData<'a>,
    image: Option<BinaryImage>,
    labels: Vec<i32>,
}

impl<'a> MarkComponentsSeq<'a> {
    /// Creates the task around a descriptor.
    #[must_use]
    pub fn new(data: TaskData<'a>) -> Self {
        Self {
            data,
            image: None,
            labels: Vec::new(),
        }
    }
}

impl Task for MarkComponentsSeq<'_> {
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

        let mut sets = DisjointSets::from_parents(image.label_strip(0..image.rows()));

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

/// A validated binary image.
#[derive(Clone, Debug)]
pub(crate) struct BinaryImage {
    foreground: Vec<bool>,
    rows: usize,
    cols: usize,
}

impl BinaryImage {
    pub(crate) fn rows(&self) -> usize {
        self.rows
    }

    pub(crate) fn cols(&self) -> usize {
        self.cols
    }

    fn is_foreground(&self, index: usize) -> bool {
        self.foreground.get(index).copied().unwrap_or(false)
    }

    /// Joins the foreground pixels of the given rows into sets, considering only neighbors
    /// within those rows.
    ///
    /// Returns the parent of every pixel in the rows, as an index into the whole image. The
    /// representative of every set is its first pixel in raster order.
    pub(crate) fn label_strip(&self, rows: Range<usize>) -> Vec<usize> {
        let offset = rows.start.saturating_mul(self.cols);
        let len = rows.len().saturating_mul(self.cols);

        let mut sets = DisjointSets::new(len);

        for local in 0..len {
            let index = offset.wrapping_add(local);

            if !self.is_foreground(index) {
                continue;
            }

            let column = local.checked_rem(self.cols).unwrap_or_default();

            if column != 0 && self.is_foreground(index.wrapping_sub(1)) {
                sets.union(local, local.wrapping_sub(1));
            }

            if local >= self.cols && self.is_foreground(index.wrapping_sub(self.cols)) {
                sets.union(local, local.wrapping_sub(self.cols));
            }
        }

        sets.into_parents()
            .into_iter()
            .map(|parent| parent.wrapping_add(offset))
            .collect()
    }

    /// Joins the sets of vertically adjacent foreground pixels across the boundary above
    /// `row`.
    pub(crate) fn join_across(&self, sets: &mut DisjointSets, row: usize) {
        let Some(above) = row.checked_sub(1) else {
            return;
        };

        for col in 0..self.cols {
            let upper = above.saturating_mul(self.cols).saturating_add(col);
            let lower = row.saturating_mul(self.cols).saturating_add(col);

            if self.is_foreground(upper) && self.is_foreground(lower) {
                sets.union(upper, lower);
            }
        }
    }

    /// Numbers the sets in raster order of their representatives.
    ///
    /// Returns `None` if there are more components than an `i32` label can express.
    pub(crate) fn compact_labels(&self, sets: &mut DisjointSets) -> Option<Vec<i32>> {
        let mut labels = vec![0_i32; self.foreground.len()];
        let mut next_label = 0_i32;

        for index in 0..self.foreground.len() {
            if !self.is_foreground(index) {
                continue;
            }

            let root = sets.find(index);

            // Representatives come first in raster order, so a root is always labelled
            // before any other pixel of its set.
            let label = if root == index {
                next_label = next_label.checked_add(1)?;
                next_label
            } else {
                labels.get(root).copied()?
            };

            *labels.get_mut(index)? = label;
        }

        Some(labels)
    }
}

/// Disjoint sets of pixel indices, with the smallest index of every set as its
/// representative.
#[derive(Debug)]
pub(crate) struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    /// Adopts an existing parent forest, such as the concatenated results of
    /// [`BinaryImage::label_strip()`] over consecutive strips.
    pub(crate) fn from_parents(parent: Vec<usize>) -> Self {
        debug_assert!(parent.iter().all(|&p| p < parent.len()));

        Self { parent }
    }

    fn into_parents(self) -> Vec<usize> {
        self.parent
    }

    #[expect(
        clippy::indexing_slicing,
        reason = "every parent is an index into the same vector"
    )]
    pub(crate) fn find(&mut self, mut index: usize) -> usize {
        while self.parent[index] != index {
            // Path halving.
            let grandparent = self.parent[self.parent[index]];
            self.parent[index] = grandparent;
            index = grandparent;
        }

        index
    }

    #[expect(
        clippy::indexing_slicing,
        reason = "roots are indices into the same vector"
    )]
    pub(crate) fn union(&mut self, a: usize, b: usize) {
        let a = self.find(a);
        let b = self.find(b);

        if a < b {
            self.parent[b] = a;
        } else if b < a {
            self.parent[a] = b;
        }
    }
}

/// Two inputs and one output, the dimensions holding two values and the output matching
/// the image.
pub(crate) fn has_marking_shape(data: &TaskData<'_>) -> bool {
    data.inputs().len() == 2
        && data.outputs().len() == 1
        && data.input_count(1) == Some(2)
        && data.input_count(0) == data.output_count(0)
}

pub(crate) fn read_image(data: &TaskData<'_>) -> Option<BinaryImage> {
    let &[rows, cols] = data.input_as::<u32>(1)? else {
        return None;
    };
    let rows = usize::try_from(rows).ok()?;
    let cols = usize::try_from(cols).ok()?;

    let pixels = data.input_as::<i32>(0)?;

    if rows.checked_mul(cols)? != pixels.len() {
        return None;
    }

    let foreground = pixels
        .iter()
        .map(|&pixel| match pixel {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;

    Some(BinaryImage {
        foreground,
        rows,
        cols,
    })
}

pub(crate) fn write_labels(data: &mut TaskData<'_>, labels: &[i32]) -> bool {
    let Some(output) = data.output_as_mut::<i32>(0) else {
        return false;
    };

    if output.len() != labels.len() {
        return false;
    }

    output.copy_from_slice(labels);
    true
}
