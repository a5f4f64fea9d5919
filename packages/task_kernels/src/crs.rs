use std::ops::Range;

use task_harness::{Task, TaskData};

/// A sparse matrix in compressed row storage (CRS): the non-zero values of every row, their
/// column indices and the offset at which every row starts.
///
/// # Examples
///
/// ```
/// use task_kernels::CrsMatrix;
///
/// let a = CrsMatrix::from_dense(&[1.0, 0.0, 0.0, 2.0], 2, 2).unwrap();
/// let b = CrsMatrix::from_dense(&[0.0, 3.0, 4.0, 0.0], 2, 2).unwrap();
///
/// assert_eq!(a.non_zero_count(), 2);
/// assert_eq!(a.multiply(&b).unwrap().to_dense(), vec![0.0, 3.0, 8.0, 0.0]);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CrsMatrix {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
    col_indices: Vec<usize>,

    // rows + 1 entries, starting at zero and ending at values.len().
    row_offsets: Vec<usize>,
}

impl CrsMatrix {
    /// Compresses a dense row-major matrix, keeping only non-zero entries.
    ///
    /// Returns `None` if `dense` does not hold exactly `rows * cols` values.
    #[must_use]
    pub fn from_dense(dense: &[f64], rows: usize, cols: usize) -> Option<Self> {
        if rows.checked_mul(cols)? != dense.len() {
            return None;
        }

        let mut block = RowBlock::default();

        for row in 0..rows {
            let start = row.checked_mul(cols)?;
            let row_values = dense.get(start..start.checked_add(cols)?)?;

            let before = block.values.len();

            for (col, &value) in row_values.iter().enumerate() {
                if value != 0.0 {
                    block.values.push(value);
                    block.col_indices.push(col);
                }
            }

            block
                .row_lengths
                .push(block.values.len().wrapping_sub(before));
        }

        Some(Self::from_row_blocks(rows, cols, [block]))
    }

    /// Expands the matrix into dense row-major form.
    #[must_use]
    pub fn to_dense(&self) -> Vec<f64> {
        let mut dense = vec![0.0; self.rows.saturating_mul(self.cols)];

        for row in 0..self.rows {
            let row_start = row.saturating_mul(self.cols);

            for (col, value) in self.row(row) {
                if let Some(cell) = dense.get_mut(row_start.saturating_add(col)) {
                    *cell = value;
                }
            }
        }

        dense
    }

    /// The number of rows.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// The number of columns.
    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// The number of stored (non-zero) entries.
    #[must_use]
    pub fn non_zero_count(&self) -> usize {
        self.values.len()
    }

    /// Multiplies `self` by `other`.
    ///
    /// Returns `None` if the inner dimensions do not match.
    #[must_use]
    pub fn multiply(&self, other: &Self) -> Option<Self> {
        if self.cols != other.rows {
            return None;
        }

        let block = self.multiply_rows(other, 0..self.rows);
        Some(Self::from_row_blocks(self.rows, other.cols, [block]))
    }

    /// The `(column, value)` pairs stored for `row`, in ascending column order.
    fn row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let start = self.row_offsets.get(row).copied().unwrap_or_default();
        let end = self
            .row_offsets
            .get(row.wrapping_add(1))
            .copied()
            .unwrap_or_default();

        let cols = self.col_indices.get(start..end).unwrap_or_default();
        let values = self.values.get(start..end).unwrap_or_default();

        cols.iter().copied().zip(values.iter().copied())
    }

    /// Computes the given rows of `self * other` with Gustavson's row-by-row algorithm.
    ///
    /// The inner dimensions must already be known to match.
    pub(crate) fn multiply_rows(&self, other: &Self, rows: Range<usize>) -> RowBlock {
        let mut block = RowBlock::default();

        let mut accumulator = vec![0.0; other.cols];
        let mut occupied = vec![false; other.cols];
        let mut touched = Vec::new();

        for row in rows {
            for (inner, left) in self.row(row) {
                for (col, right) in other.row(inner) {
                    let (Some(sum), Some(seen)) = (accumulator.get_mut(col), occupied.get_mut(col))
                    else {
                        continue;
                    };

                    *sum += left * right;

                    if !*seen {
                        *seen = true;
                        touched.push(col);
                    }
                }
            }

            touched.sort_unstable();

            for &col in &touched {
                if let (Some(sum), Some(seen)) = (accumulator.get_mut(col), occupied.get_mut(col)) {
                    block.values.push(*sum);
                    block.col_indices.push(col);

                    *sum = 0.0;
                    *seen = false;
                }
            }

            block.row_lengths.push(touched.len());
            touched.clear();
        }

        block
    }

    /// Stitches consecutive blocks of rows into one matrix.
    pub(crate) fn from_row_blocks(
        rows: usize,
        cols: usize,
        blocks: impl IntoIterator<Item = RowBlock>,
    ) -> Self {
        let mut matrix = Self {
            rows,
            cols,
            values: Vec::new(),
            col_indices: Vec::new(),
            row_offsets: vec![0],
        };

        for block in blocks {
            let mut offset = matrix.row_offsets.last().copied().unwrap_or_default();

            for length in block.row_lengths {
                offset = offset.wrapping_add(length);
                matrix.row_offsets.push(offset);
            }

            matrix.values.extend(block.values);
            matrix.col_indices.extend(block.col_indices);
        }

        debug_assert_eq!(matrix.row_offsets.len(), rows.wrapping_add(1));
        debug_assert_eq!(matrix.row_offsets.last(), Some(&matrix.values.len()));

        matrix
    }
}

/// Consecutive rows of a CRS matrix, with per-row lengths instead of absolute offsets so
/// that blocks computed independently can be concatenated.
#[derive(Debug, Default)]
pub(crate) struct RowBlock {
    values: Vec<f64>,
    col_indices: Vec<usize>,
    row_lengths: Vec<usize>,
}

/// Multiplies two matrices in compressed row storage, on the calling thread.
///
/// Descriptor layout:
///
/// | Region   | Type  | Contents                                       |
/// |----------|-------|------------------------------------------------|
/// | input 0  | `f64` | matrix A, dense row-major, `m * n` values      |
/// | input 1  | `u32` | dimensions of A: `[m, n]`                      |
/// | input 2  | `f64` | matrix B, dense row-major, `n * p` values      |
/// | input 3  | `u32` | dimensions of B: `[n, p]`                      |
/// | output 0 | `f64` | product C = A × B, dense row-major, `m * p`    |
///
/// Validation checks the region counts. The dimensions are data: preparation reads them,
/// fails if they disagree with the region counts or with each other and compresses both
/// matrices. Execution multiplies the compressed matrices and finalization expands the
/// product into the output.
#[derive(Debug)]
pub struct CrsMultiplySeq<'a> {
    data: TaskData<'a>,
    operands: Option<(CrsMatrix, CrsMatrix)>,
    product: CrsMatrix,
}

impl<'a> CrsMultiplySeq<'a> {
    /// Creates the task around a descriptor.
    #[must_use]
    pub fn new(data: TaskData<'a>) -> Self {
        Self {
            data,
            operands: None,
            product: CrsMatrix::default(),
        }
    }
}

impl Task for CrsMultiplySeq<'_> {
    fn validate(&self) -> bool {
        has_multiply_shape(&self.data)
    }

    fn prepare(&mut self) -> bool {
        self.operands = read_operands(&self.data);
        self.operands.is_some()
    }

    fn execute(&mut self) -> bool {
        let Some(product) = self
            .operands
            .as_ref()
            .and_then(|(a, b)| a.multiply(b))
        else {
            return false;
        };

        self.product = product;
        true
    }

    fn finalize(&mut self) -> bool {
        write_product(&mut self.data, &self.product)
    }
}

/// Four inputs and one output, both dimension regions holding two values.
pub(crate) fn has_multiply_shape(data: &TaskData<'_>) -> bool {
    data.inputs().len() == 4
        && data.outputs().len() == 1
        && data.input_count(1) == Some(2)
        && data.input_count(3) == Some(2)
}

/// Reads and compresses both operands, checking that their dimensions agree with the region
/// counts and with each other.
pub(crate) fn read_operands(data: &TaskData<'_>) -> Option<(CrsMatrix, CrsMatrix)> {
    let (m, n) = read_dims(data, 1)?;
    let (inner, p) = read_dims(data, 3)?;

    if n != inner || data.output_count(0)? != m.checked_mul(p)? {
        return None;
    }

    let a = CrsMatrix::from_dense(data.input_as::<f64>(0)?, m, n)?;
    let b = CrsMatrix::from_dense(data.input_as::<f64>(2)?, n, p)?;

    Some((a, b))
}

pub(crate) fn write_product(data: &mut TaskData<'_>, product: &CrsMatrix) -> bool {
    let Some(output) = data.output_as_mut::<f64>(0) else {
        return false;
    };

    let dense = product.to_dense();

    if output.len() != dense.len() {
        return false;
    }

    output.copy_from_slice(&dense);
    true
}

fn read_dims(data: &TaskData<'_>, index: usize) -> Option<(usize, usize)> {
    let &[rows, cols] = data.input_as::<u32>(index)? else {
        return None;
    };

    Some((usize::try_from(rows).ok()?, usize::try_from(cols).ok()?))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use task_harness::Lifecycle;
    use testing::f64_diff_abs;

    use super::*;

    fn dense_multiply(a: &[f64], b: &[f64], m: usize, n: usize, p: usize) -> Vec<f64> {
        let mut c = vec![0.0; m * p];

        for i in 0..m {
            for k in 0..n {
                for j in 0..p {
                    c[i * p + j] += a[i * n + k] * b[k * p + j];
                }
            }
        }

        c
    }

    /// A matrix where roughly one entry in `sparsity` is non-zero.
    fn random_sparse(rng: &mut StdRng, len: usize, sparsity: u32) -> Vec<f64> {
        (0..len)
            .map(|_| {
                if rng.random_ratio(1, sparsity) {
                    rng.random_range(-10.0..10.0)
                } else {
                    0.0
                }
            })
            .collect()
    }

    fn multiply_via_task(
        a: &[f64],
        a_dims: [u32; 2],
        b: &[f64],
        b_dims: [u32; 2],
    ) -> Option<Vec<f64>> {
        let mut output = vec![0.0; usize::try_from(a_dims[0] * b_dims[1]).unwrap()];

        let mut task = CrsMultiplySeq::new(
            TaskData::new()
                .with_input(a)
                .with_input(&a_dims)
                .with_input(b)
                .with_input(&b_dims)
                .with_output(&mut output),
        );
        let succeeded = Lifecycle::new(&mut task).run_once().is_ok();
        drop(task);

        succeeded.then_some(output)
    }

    #[test]
    fn dense_round_trip_keeps_only_non_zeros() {
        let dense = [0.0, 1.5, 0.0, 0.0, 0.0, -2.0];

        let matrix = CrsMatrix::from_dense(&dense, 2, 3).unwrap();

        assert_eq!(matrix.rows(), 2);
        assert_eq!(matrix.cols(), 3);
        assert_eq!(matrix.non_zero_count(), 2);
        assert_eq!(matrix.to_dense(), dense.to_vec());
    }

    #[test]
    fn from_dense_rejects_wrong_length() {
        assert!(CrsMatrix::from_dense(&[1.0, 2.0, 3.0], 2, 2).is_none());
    }

    #[test]
    fn multiply_rejects_mismatched_inner_dimension() {
        let a = CrsMatrix::from_dense(&[1.0, 2.0], 1, 2).unwrap();
        let b = CrsMatrix::from_dense(&[1.0, 2.0, 3.0], 3, 1).unwrap();

        assert!(a.multiply(&b).is_none());
    }

    #[test]
    fn product_matches_dense_reference() {
        let mut rng = StdRng::seed_from_u64(11);
        let (m, n, p) = (17, 23, 13);

        let a = random_sparse(&mut rng, m * n, 4);
        let b = random_sparse(&mut rng, n * p, 4);

        let expected = dense_multiply(&a, &b, m, n, p);
        let actual = multiply_via_task(&a, [17, 23], &b, [23, 13]).unwrap();

        for (actual, expected) in actual.iter().zip(&expected) {
            assert_eq!(f64_diff_abs(*actual, *expected, 1e-9), 0.0);
        }
    }

    #[test]
    fn identity_product() {
        let identity = [1.0, 0.0, 0.0, 1.0];
        let b = [1.0, 2.0, 3.0, 4.0];

        assert_eq!(
            multiply_via_task(&identity, [2, 2], &b, [2, 2]),
            Some(b.to_vec())
        );
    }

    #[test]
    fn zero_matrix_product_is_zero() {
        let a = [0.0; 6];
        let b = [1.0; 6];

        assert_eq!(
            multiply_via_task(&a, [2, 3], &b, [3, 2]),
            Some(vec![0.0; 4])
        );
    }

    #[test]
    fn prepare_rejects_inconsistent_dimensions() {
        let a = [1.0; 6];
        let b = [1.0; 6];

        // Inner dimensions 3 and 2 do not match.
        assert_eq!(multiply_via_task(&a, [2, 3], &b, [2, 3]), None);

        // A claims 3x3 but holds six values.
        assert_eq!(multiply_via_task(&a, [3, 3], &b, [3, 2]), None);
    }

    #[test]
    fn validate_rejects_missing_dimensions() {
        let a = [1.0; 4];
        let b = [1.0; 4];
        let mut output = [0.0; 4];

        let task = CrsMultiplySeq::new(
            TaskData::new()
                .with_input(&a)
                .with_input(&b)
                .with_output(&mut output),
        );

        assert!(!task.validate());
    }

    #[test]
    fn row_blocks_stitch_in_order() {
        let a = CrsMatrix::from_dense(&[1.0, 0.0, 0.0, 2.0, 3.0, 0.0], 3, 2).unwrap();
        let b = CrsMatrix::from_dense(&[1.0, 1.0, 0.0, 1.0], 2, 2).unwrap();

        let blocks = [a.multiply_rows(&b, 0..1), a.multiply_rows(&b, 1..3)];
        let stitched = CrsMatrix::from_row_blocks(3, 2, blocks);

        assert_eq!(stitched, a.multiply(&b).unwrap());
        assert_eq!(stitched.to_dense(), vec![1.0, 1.0, 0.0, 2.0, 3.0, 3.0]);
    }
}
