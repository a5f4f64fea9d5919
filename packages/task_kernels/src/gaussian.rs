use std::ops::Range;

use task_harness::{Task, TaskData};

/// Applies a horizontal three-tap Gaussian filter to a square `f64` image, on the calling
/// thread.
///
/// Descriptor layout:
///
/// | Region   | Type  | Contents                                                     |
/// |----------|-------|--------------------------------------------------------------|
/// | input 0  | `f64` | square image in row-major order (count is a perfect square)  |
/// | input 1  | `i32` | kernel taps `[left, center, right]`, exactly three           |
/// | output 0 | `f64` | filtered image, same count as input 0                        |
///
/// Every output pixel is the weighted sum of the pixel and its horizontal neighbors, divided
/// by the sum of the taps. Neighbors outside the row count as zero. Preparation fails if
/// the taps sum to zero.
///
/// # Examples
///
/// ```
/// use task_harness::{Lifecycle, TaskData};
/// use task_kernels::GaussianFilterSeq;
///
/// let image = [
///     100.0, 0.0, 0.0, //
///     100.0, 0.0, 0.0, //
///     100.0, 0.0, 0.0,
/// ];
/// let kernel = [1, 2, 1];
/// let mut output = [0.0; 9];
///
/// let mut task = GaussianFilterSeq::new(
///     TaskData::new()
///         .with_input(&image)
///         .with_input(&kernel)
///         .with_output(&mut output),
/// );
/// Lifecycle::new(&mut task).run_once().unwrap();
/// drop(task);
///
/// assert_eq!(&output[..3], &[50.0, 25.0, 0.0]);
/// ```
#[derive(Debug)]
pub struct GaussianFilterSeq<'a> {
    data: TaskData<'a>,
    prepared: Option<FilterInput>,
    result: Vec<f64>,
}

impl<'a> GaussianFilterSeq<'a> {
    /// Creates the task around a descriptor.
    #[must_use]
    pub fn new(data: TaskData<'a>) -> Self {
        Self {
            data,
            prepared: None,
            result: Vec::new(),
        }
    }
}

impl Task for GaussianFilterSeq<'_> {
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

        self.result = input.filter_rows(0..input.height());
        true
    }

    fn finalize(&mut self) -> bool {
        write_filtered(&mut self.data, &self.result)
    }
}

/// The three taps of a horizontal filter and their sum.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Kernel3 {
    taps: [f64; 3],
    sum: f64,
}

impl Kernel3 {
    /// Returns `None` unless there are exactly three taps with a non-zero sum.
    pub(crate) fn from_taps(taps: &[i32]) -> Option<Self> {
        let &[left, center, right] = taps else {
            return None;
        };

        let integer_sum = [left, center, right]
            .into_iter()
            .map(i64::from)
            .sum::<i64>();

        if integer_sum == 0 {
            return None;
        }

        let taps = [f64::from(left), f64::from(center), f64::from(right)];

        Some(Self {
            taps,
            sum: taps.iter().sum(),
        })
    }

    fn apply(&self, left: f64, center: f64, right: f64) -> f64 {
        let [left_tap, center_tap, right_tap] = self.taps;

        (left_tap * left + center_tap * center + right_tap * right) / self.sum
    }
}

/// A block of whole image rows together with the filter to apply to them.
#[derive(Clone, Debug)]
pub(crate) struct FilterInput {
    pixels: Vec<f64>,
    width: usize,
    kernel: Kernel3,
}

impl FilterInput {
    pub(crate) fn new(pixels: Vec<f64>, width: usize, kernel: Kernel3) -> Self {
        debug_assert!(width == 0 || pixels.len() % width == 0);

        Self {
            pixels,
            width,
            kernel,
        }
    }

    pub(crate) fn width(&self) -> usize {
        self.width
    }

    pub(crate) fn kernel(&self) -> Kernel3 {
        self.kernel
    }

    pub(crate) fn pixels(&self) -> &[f64] {
        &self.pixels
    }

    pub(crate) fn height(&self) -> usize {
        self.pixels.len().checked_div(self.width).unwrap_or_default()
    }

    /// Filters the given range of rows, returning them in row-major order.
    pub(crate) fn filter_rows(&self, rows: Range<usize>) -> Vec<f64> {
        let mut filtered = Vec::with_capacity(rows.len().saturating_mul(self.width));

        for row in self
            .pixels
            .chunks_exact(self.width.max(1))
            .skip(rows.start)
            .take(rows.len())
        {
            for (column, &center) in row.iter().enumerate() {
                let left = column
                    .checked_sub(1)
                    .and_then(|previous| row.get(previous))
                    .copied()
                    .unwrap_or(0.0);
                let right = row.get(column.wrapping_add(1)).copied().unwrap_or(0.0);

                filtered.push(self.kernel.apply(left, center, right));
            }
        }

        filtered
    }
}

/// Two inputs and one output, the image being square and matched by the output, the kernel
/// having three taps.
pub(crate) fn has_filter_shape(data: &TaskData<'_>) -> bool {
    let (Some(image_count), Some(kernel_count), Some(output_count)) = (
        data.input_count(0),
        data.input_count(1),
        data.output_count(0),
    ) else {
        return false;
    };

    data.inputs().len() == 2
        && data.outputs().len() == 1
        && kernel_count == 3
        && image_count == output_count
        && square_side(image_count).is_some()
}

pub(crate) fn read_filter_input(data: &TaskData<'_>) -> Option<FilterInput> {
    let image = data.input_as::<f64>(0)?;
    let kernel = Kernel3::from_taps(data.input_as::<i32>(1)?)?;
    let width = square_side(image.len())?;

    Some(FilterInput::new(image.to_vec(), width, kernel))
}

pub(crate) fn write_filtered(data: &mut TaskData<'_>, filtered: &[f64]) -> bool {
    let Some(output) = data.output_as_mut::<f64>(0) else {
        return false;
    };

    if output.len() != filtered.len() {
        return false;
    }

    output.copy_from_slice(filtered);
    true
}

/// The side length of a square with `count` cells, if `count` is a positive perfect square.
fn square_side(count: usize) -> Option<usize> {
    let side = count.isqrt();

    (side > 0 && side.checked_mul(side) == Some(count)).then_some(side)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use task_harness::Lifecycle;
    use testing::f64_diff_abs;

    use super::*;

    /// Every third column lit, as in the classic reference image for this filter.
    fn striped_image(width: usize) -> (Vec<f64>, Vec<f64>) {
        let mut image = Vec::with_capacity(width * width);
        let mut expected = Vec::with_capacity(width * width);

        for _ in 0..width {
            for column in 0..width {
                image.push(if column % 3 == 0 { 100.0 } else { 0.0 });

                expected.push(if column == width - 1 {
                    0.0
                } else if column % 3 == 0 {
                    50.0
                } else {
                    25.0
                });
            }
        }

        (image, expected)
    }

    fn run(image: &[f64], kernel: &[i32]) -> Option<Vec<f64>> {
        let mut output = vec![0.0; image.len()];

        let mut task = GaussianFilterSeq::new(
            TaskData::new()
                .with_input(image)
                .with_input(kernel)
                .with_output(&mut output),
        );
        let succeeded = Lifecycle::new(&mut task).run_once().is_ok();
        drop(task);

        succeeded.then_some(output)
    }

    #[test]
    fn filters_striped_image() {
        let (image, expected) = striped_image(9);

        let output = run(&image, &[1, 2, 1]).unwrap();

        for (actual, expected) in output.iter().zip(&expected) {
            assert_eq!(f64_diff_abs(*actual, *expected, 1e-9), 0.0);
        }
    }

    #[test]
    fn single_pixel_image() {
        let output = run(&[8.0], &[1, 2, 1]).unwrap();

        assert_eq!(output, vec![4.0]);
    }

    #[test]
    fn identity_kernel_copies_image() {
        let image = [1.0, 2.0, 3.0, 4.0];

        assert_eq!(run(&image, &[0, 1, 0]).unwrap(), image.to_vec());
    }

    #[test]
    fn negative_taps_are_allowed() {
        let output = run(&[1.0, 2.0, 3.0, 4.0], &[-1, 3, -1]).unwrap();

        // Row [1, 2]: (3*1 - 2) / 1 = 1, (-1 + 3*2) / 1 = 5
        assert_eq!(&output[..2], &[1.0, 5.0]);
    }

    #[test]
    fn zero_sum_kernel_fails_preparation() {
        assert!(run(&[1.0, 2.0, 3.0, 4.0], &[1, -2, 1]).is_none());
        assert!(Kernel3::from_taps(&[1, -2, 1]).is_none());
    }

    #[test]
    fn validate_rejects_non_square_image() {
        let image = [1.0, 2.0, 3.0];
        let kernel = [1, 2, 1];
        let mut output = [0.0; 3];

        let task = GaussianFilterSeq::new(
            TaskData::new()
                .with_input(&image)
                .with_input(&kernel)
                .with_output(&mut output),
        );

        assert!(!task.validate());
    }

    #[test]
    fn validate_rejects_wrong_kernel_length() {
        let image = [1.0; 4];
        let kernel = [1, 2, 1, 0];
        let mut output = [0.0; 4];

        let task = GaussianFilterSeq::new(
            TaskData::new()
                .with_input(&image)
                .with_input(&kernel)
                .with_output(&mut output),
        );

        assert!(!task.validate());
    }

    #[test]
    fn validate_rejects_empty_image() {
        let image: [f64; 0] = [];
        let kernel = [1, 2, 1];
        let mut output: [f64; 0] = [];

        let task = GaussianFilterSeq::new(
            TaskData::new()
                .with_input(&image)
                .with_input(&kernel)
                .with_output(&mut output),
        );

        assert!(!task.validate());
    }

    #[test]
    fn filter_rows_covers_requested_rows_only() {
        let input = FilterInput::new(
            vec![4.0, 0.0, 0.0, 4.0],
            2,
            Kernel3::from_taps(&[1, 2, 1]).unwrap(),
        );

        assert_eq!(input.height(), 2);
        assert_eq!(input.filter_rows(1..2), vec![1.0, 2.0]);
        assert_eq!(input.filter_rows(0..0), Vec::<f64>::new());
    }

    #[test]
    fn square_side_detection() {
        assert_eq!(square_side(0), None);
        assert_eq!(square_side(1), Some(1));
        assert_eq!(square_side(81), Some(9));
        assert_eq!(square_side(82), None);
    }
}
