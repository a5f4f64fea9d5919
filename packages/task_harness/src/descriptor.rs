use bytemuck::Pod;

/// A read-only region of caller-owned memory that a task consumes.
///
/// The element count is declared separately from the byte length. How bytes map onto the
/// task's native element type is the concrete task's concern.
#[derive(Debug)]
pub struct InputRegion<'a> {
    bytes: &'a [u8],
    count: usize,
}

impl<'a> InputRegion<'a> {
    /// The raw bytes of the region.
    #[must_use]
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// The declared number of elements in the region.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Views the region as `count` elements of type `T`.
    ///
    /// Returns `None` if the bytes are misaligned for `T`, are not a whole number of `T`
    /// values or hold fewer than `count` elements.
    #[must_use]
    pub fn as_slice<T: Pod>(&self) -> Option<&'a [T]> {
        bytemuck::try_cast_slice::<u8, T>(self.bytes)
            .ok()?
            .get(..self.count)
    }
}

/// A writable region of caller-owned memory that a task fills in during finalization.
#[derive(Debug)]
pub struct OutputRegion<'a> {
    bytes: &'a mut [u8],
    count: usize,
}

impl OutputRegion<'_> {
    /// The raw bytes of the region.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &*self.bytes
    }

    /// The declared number of elements in the region.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Views the region as `count` elements of type `T`.
    #[must_use]
    pub fn as_slice<T: Pod>(&self) -> Option<&[T]> {
        bytemuck::try_cast_slice::<u8, T>(&*self.bytes)
            .ok()?
            .get(..self.count)
    }

    /// Views the region as `count` mutable elements of type `T`.
    ///
    /// Returns `None` under the same conditions as [`InputRegion::as_slice()`].
    #[must_use]
    pub fn as_mut_slice<T: Pod>(&mut self) -> Option<&mut [T]> {
        bytemuck::try_cast_slice_mut::<u8, T>(&mut *self.bytes)
            .ok()?
            .get_mut(..self.count)
    }
}

/// Describes the input and output buffers of a task.
///
/// This is a view, not a container: every region borrows memory owned by the caller, who
/// therefore keeps the buffers alive for as long as the task holding the descriptor exists.
/// Once the task is dropped, the caller can inspect the output buffers again.
///
/// The order of regions is significant and must match what the concrete task expects.
/// No validation happens here - a malformed descriptor is rejected by the task's
/// validation stage.
///
/// An empty descriptor is legal. In distributed configurations it is what every process
/// other than the distinguished one holds.
///
/// # Examples
///
/// ```
/// use task_harness::TaskData;
///
/// let input = [3.0_f64, 1.0, 2.0];
/// let mut output = [0.0_f64; 3];
///
/// let data = TaskData::new().with_input(&input).with_output(&mut output);
///
/// assert_eq!(data.input_count(0), Some(3));
/// assert_eq!(data.input_as::<f64>(0), Some(&input[..]));
/// assert_eq!(data.output_count(0), Some(3));
/// ```
#[derive(Debug, Default)]
pub struct TaskData<'a> {
    inputs: Vec<InputRegion<'a>>,
    outputs: Vec<OutputRegion<'a>>,
}

impl<'a> TaskData<'a> {
    /// Creates a descriptor with no regions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an input region covering the whole slice.
    pub fn push_input<T: Pod>(&mut self, values: &'a [T]) -> &mut Self {
        self.push_input_bytes(bytemuck::cast_slice(values), values.len())
    }

    /// Appends an output region covering the whole slice.
    pub fn push_output<T: Pod>(&mut self, values: &'a mut [T]) -> &mut Self {
        let count = values.len();
        self.push_output_bytes(bytemuck::cast_slice_mut(values), count)
    }

    /// Appends an input region with an explicitly declared element count.
    pub fn push_input_bytes(&mut self, bytes: &'a [u8], count: usize) -> &mut Self {
        self.inputs.push(InputRegion { bytes, count });
        self
    }

    /// Appends an output region with an explicitly declared element count.
    pub fn push_output_bytes(&mut self, bytes: &'a mut [u8], count: usize) -> &mut Self {
        self.outputs.push(OutputRegion { bytes, count });
        self
    }

    /// Appends an input region, builder style.
    #[must_use]
    pub fn with_input<T: Pod>(mut self, values: &'a [T]) -> Self {
        self.push_input(values);
        self
    }

    /// Appends an output region, builder style.
    #[must_use]
    pub fn with_output<T: Pod>(mut self, values: &'a mut [T]) -> Self {
        self.push_output(values);
        self
    }

    /// The input regions, in order.
    #[must_use]
    pub fn inputs(&self) -> &[InputRegion<'a>] {
        &self.inputs
    }

    /// The output regions, in order.
    #[must_use]
    pub fn outputs(&self) -> &[OutputRegion<'a>] {
        &self.outputs
    }

    /// Whether the descriptor has neither inputs nor outputs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty()
    }

    /// The declared element count of the input region at `index`.
    #[must_use]
    pub fn input_count(&self, index: usize) -> Option<usize> {
        self.inputs.get(index).map(InputRegion::count)
    }

    /// The declared element count of the output region at `index`.
    #[must_use]
    pub fn output_count(&self, index: usize) -> Option<usize> {
        self.outputs.get(index).map(OutputRegion::count)
    }

    /// Views the input region at `index` as elements of type `T`.
    #[must_use]
    pub fn input_as<T: Pod>(&self, index: usize) -> Option<&'a [T]> {
        self.inputs.get(index)?.as_slice()
    }

    /// Views the output region at `index` as mutable elements of type `T`.
    #[must_use]
    pub fn output_as_mut<T: Pod>(&mut self, index: usize) -> Option<&mut [T]> {
        self.outputs.get_mut(index)?.as_mut_slice()
    }
}
