use task_harness::{Task, TaskData};

/// Sorts `f64` values in ascending order with Batcher's odd-even merge network, on the
/// calling thread.
///
/// Descriptor layout:
///
/// | Region   | Type  | Contents                          |
/// |----------|-------|-----------------------------------|
/// | input 0  | `f64` | values to sort                    |
/// | output 0 | `f64` | sorted values, same count as input |
///
/// Preparation fails if any value is NaN, since NaN has no place in an ascending order.
///
/// # Examples
///
/// ```
/// use task_harness::{Lifecycle, TaskData};
/// use task_kernels::BatcherSortSeq;
///
/// let input = [5.0, 4.0, 3.0, 2.0, 1.0];
/// let mut output = [0.0; 5];
///
/// let mut task = BatcherSortSeq::new(TaskData::new().with_input(&input).with_output(&mut output));
/// Lifecycle::new(&mut task).run_once().unwrap();
/// drop(task);
///
/// assert_eq!(output, [1.0, 2.0, 3.0, 4.0, 5.0]);
/// ```
#[derive(Debug)]
pub struct BatcherSortSeq<'a> {
    data: TaskData<'a>,
    input: Vec<f64>,
    result: Vec<f64>,
}

impl<'a> BatcherSortSeq<'a> {
    /// Creates the task around a descriptor.
    #[must_use]
    pub fn new(data: TaskData<'a>) -> Self {
        Self {
            data,
            input: Vec::new(),
            result: Vec::new(),
        }
    }
}

impl Task for BatcherSortSeq<'_> {
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
        self.result = batcher_sort(self.input.clone());
        true
    }

    fn finalize(&mut self) -> bool {
        write_sorted(&mut self.data, &self.result)
    }
}

/// One input and one output of equal count.
pub(crate) fn has_sort_shape(data: &TaskData<'_>) -> bool {
    data.inputs().len() == 1
        && data.outputs().len() == 1
        && data.input_count(0) == data.output_count(0)
}

/// Copies the input values into working storage, rejecting NaN.
pub(crate) fn read_sortable(data: &TaskData<'_>) -> Option<Vec<f64>> {
    let input = data.input_as::<f64>(0)?;

    if input.iter().any(|value| value.is_nan()) {
        return None;
    }

    Some(input.to_vec())
}

pub(crate) fn write_sorted(data: &mut TaskData<'_>, sorted: &[f64]) -> bool {
    let Some(output) = data.output_as_mut::<f64>(0) else {
        return false;
    };

    if output.len() != sorted.len() {
        return false;
    }

    output.copy_from_slice(sorted);
    true
}

/// Sorts `values` in ascending order (by [`f64::total_cmp()`]) with an odd-even merge
/// network.
///
/// The network only sorts power-of-two lengths, so the values are padded with positive
/// infinity, sorted and truncated back to their original length.
pub(crate) fn batcher_sort(mut values: Vec<f64>) -> Vec<f64> {
    let len = values.len();
    let padded_len = len.next_power_of_two();

    values.resize(padded_len, f64::INFINITY);

    let mut block = 1_usize;
    while block < padded_len {
        merge_blocks(&mut values, block);
        block = block.wrapping_mul(2);
    }

    values.truncate(len);
    values
}

/// Merges two sorted sequences into one sorted sequence with an odd-even merge network.
pub(crate) fn odd_even_merge(left: &[f64], right: &[f64]) -> Vec<f64> {
    let block = left.len().max(right.len()).next_power_of_two();

    let mut merged = Vec::with_capacity(block.wrapping_mul(2));
    merged.extend_from_slice(left);
    merged.resize(block, f64::INFINITY);
    merged.extend_from_slice(right);
    merged.resize(block.wrapping_mul(2), f64::INFINITY);

    merge_blocks(&mut merged, block);

    merged.truncate(left.len().wrapping_add(right.len()));
    merged
}

/// Merges every pair of adjacent sorted blocks of length `block` into one sorted block.
///
/// `values.len()` and `block` must be powers of two.
#[expect(
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing,
    clippy::integer_division,
    reason = "indices never exceed the power-of-two length of the network"
)]
fn merge_blocks(values: &mut [f64], block: usize) {
    let len = values.len();
    let span = block * 2;

    let mut distance = block;
    while distance >= 1 {
        let mut start = distance % block;

        while start + distance < len {
            for offset in 0..distance.min(len - start - distance) {
                let low = start + offset;
                let high = low + distance;

                // Only compare within the same pair of blocks.
                if low / span == high / span && values[low].total_cmp(&values[high]).is_gt() {
                    values.swap(low, high);
                }
            }

            start += distance * 2;
        }

        distance /= 2;
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use task_harness::Lifecycle;

    use super::*;

    fn sorted_copy(values: &[f64]) -> Vec<f64> {
        let mut expected = values.to_vec();
        expected.sort_by(f64::total_cmp);
        expected
    }

    #[test]
    fn sorts_power_of_two_length() {
        let values = vec![8.0, 3.0, 5.0, 1.0, 7.0, 2.0, 6.0, 4.0];

        assert_eq!(
            batcher_sort(values),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]
        );
    }

    #[test]
    fn sorts_any_length() {
        let mut rng = StdRng::seed_from_u64(42);

        for len in [0_usize, 1, 2, 3, 5, 17, 100, 1000] {
            let values: Vec<f64> = (0..len).map(|_| rng.random_range(-1e6..1e6)).collect();

            assert_eq!(batcher_sort(values.clone()), sorted_copy(&values), "len {len}");
        }
    }

    #[test]
    fn keeps_duplicates_and_infinities() {
        let values = vec![f64::INFINITY, 1.0, f64::NEG_INFINITY, 1.0, -0.0, 0.0];

        assert_eq!(batcher_sort(values.clone()), sorted_copy(&values));
    }

    #[test]
    fn merges_unequal_runs() {
        let left = [1.0, 4.0, 9.0];
        let right = [2.0, 3.0, 5.0, 8.0, 10.0, 11.0];

        assert_eq!(
            odd_even_merge(&left, &right),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 8.0, 9.0, 10.0, 11.0]
        );
        assert_eq!(odd_even_merge(&[], &right), right.to_vec());
        assert_eq!(odd_even_merge(&left, &[]), left.to_vec());
    }

    #[test]
    fn task_sorts_descending_input() {
        let input = [5.0, 4.0, 3.0, 2.0, 1.0];
        let mut output = [0.0; 5];

        let mut task =
            BatcherSortSeq::new(TaskData::new().with_input(&input).with_output(&mut output));
        Lifecycle::new(&mut task).run_once().unwrap();
        drop(task);

        assert_eq!(output, [1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn validate_rejects_count_mismatch() {
        let input = [1.0, 2.0];
        let mut output = [0.0; 3];

        let task = BatcherSortSeq::new(TaskData::new().with_input(&input).with_output(&mut output));

        assert!(!task.validate());
    }

    #[test]
    fn validate_rejects_missing_output() {
        let input = [1.0, 2.0];

        let task = BatcherSortSeq::new(TaskData::new().with_input(&input));

        assert!(!task.validate());
    }

    #[test]
    fn prepare_rejects_nan() {
        let input = [1.0, f64::NAN, 2.0];
        let mut output = [0.0; 3];

        let mut task =
            BatcherSortSeq::new(TaskData::new().with_input(&input).with_output(&mut output));

        assert!(task.validate());
        assert!(!task.prepare());
    }

    #[test]
    fn repeated_cycles_give_identical_output() {
        let input = [3.0, -1.0, 2.0, 0.5];
        let mut output = [0.0; 4];

        let mut task =
            BatcherSortSeq::new(TaskData::new().with_input(&input).with_output(&mut output));

        let mut lifecycle = Lifecycle::new(&mut task);
        lifecycle.run_once().unwrap();
        lifecycle.run_once().unwrap();

        // Repeated execution must not sort an already sorted buffer or accumulate state.
        lifecycle.validate().unwrap();
        lifecycle.prepare().unwrap();
        lifecycle.execute().unwrap();
        lifecycle.execute().unwrap();
        lifecycle.finalize().unwrap();
        drop(task);

        assert_eq!(output, [-1.0, 0.5, 2.0, 3.0]);
    }
}
