use task_harness::{ProcessRole, Task, TaskData};
use tracing::debug;

use crate::gaussian::{FilterInput, Kernel3, has_filter_shape, read_filter_input, write_filtered};
use crate::{Communicator, chunk_ranges};

/// Applies a horizontal three-tap Gaussian filter to a square `f64` image across the ranks
/// of a simulated world.
///
/// The distinguished rank holds the descriptor, with the layout of
/// [`GaussianFilterSeq`][crate::GaussianFilterSeq]. During preparation it shares the kernel
/// and image width with every rank and scatters bands of whole rows. Since the filter is
/// horizontal, no rank needs pixels from another rank's band. The filtered bands are
/// gathered back on the distinguished rank during execution.
///
/// Every rank must drive its task through the same stages the same number of times.
#[derive(Debug)]
pub struct GaussianFilterDistributed<'a> {
    data: TaskData<'a>,
    comm: Communicator,
    band: Option<FilterInput>,
    result: Vec<f64>,
}

impl<'a> GaussianFilterDistributed<'a> {
    /// Creates this rank's task around its descriptor.
    #[must_use]
    pub fn new(data: TaskData<'a>, comm: Communicator) -> Self {
        Self {
            data,
            comm,
            band: None,
            result: Vec::new(),
        }
    }

    fn is_root(&self) -> bool {
        self.comm.rank() == ProcessRole::DISTINGUISHED_RANK
    }
}

impl Task for GaussianFilterDistributed<'_> {
    fn validate(&self) -> bool {
        let verdict = self.is_root().then(|| has_filter_shape(&self.data));
        self.comm.broadcast(ProcessRole::DISTINGUISHED_RANK, verdict)
    }

    fn prepare(&mut self) -> bool {
        let whole = if self.is_root() {
            Some(read_filter_input(&self.data))
        } else {
            None
        };

        let settings: Option<Option<(usize, Kernel3)>> = whole
            .as_ref()
            .map(|input| input.as_ref().map(|input| (input.width(), input.kernel())));

        let Some((width, kernel)) = self
            .comm
            .broadcast(ProcessRole::DISTINGUISHED_RANK, settings)
        else {
            return false;
        };

        let bands = whole.flatten().map(|input| {
            chunk_ranges(input.height(), self.comm.size())
                .into_iter()
                .map(|rows| {
                    let start = rows.start.saturating_mul(width);
                    let end = rows.end.saturating_mul(width);

                    input
                        .pixels()
                        .get(start..end)
                        .map(<[f64]>::to_vec)
                        .unwrap_or_default()
                })
                .collect::<Vec<_>>()
        });

        let pixels = self.comm.scatter(ProcessRole::DISTINGUISHED_RANK, bands);

        debug!(rank = self.comm.rank(), len = pixels.len(), "received band");

        self.band = Some(FilterInput::new(pixels, width, kernel));
        true
    }

    fn execute(&mut self) -> bool {
        let Some(band) = &self.band else {
            return false;
        };

        let filtered = band.filter_rows(0..band.height());

        if let Some(bands) = self.comm.gather(ProcessRole::DISTINGUISHED_RANK, filtered) {
            self.result = bands.concat();
        }

        true
    }

    fn finalize(&mut self) -> bool {
        let written = self
            .is_root()
            .then(|| write_filtered(&mut self.data, &self.result));

        self.comm.broadcast(ProcessRole::DISTINGUISHED_RANK, written)
    }

    fn role(&self) -> ProcessRole {
        self.comm.role()
    }
}
