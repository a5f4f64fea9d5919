#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Parallel compute tasks that plug into the [`task_harness`] lifecycle.
//!
//! Every algorithm comes in several execution backends that share one descriptor layout and
//! produce identical results, so their running times can be compared directly:
//!
//! | Algorithm                   | Sequential            | Thread pool               | Simulated processes           |
//! |-----------------------------|-----------------------|---------------------------|-------------------------------|
//! | Batcher odd-even merge sort | [`BatcherSortSeq`]    | [`BatcherSortThreads`]    | [`BatcherSortDistributed`]    |
//! | 3-tap Gaussian filter       | [`GaussianFilterSeq`] | [`GaussianFilterThreads`] | [`GaussianFilterDistributed`] |
//! | Sparse (CRS) matrix product | [`CrsMultiplySeq`]    | [`CrsMultiplyThreads`]    |                               |
//! | Binary component marking    | [`MarkComponentsSeq`] | [`MarkComponentsThreads`] |                               |
//!
//! The backends are built on two pieces of infrastructure that are useful on their own:
//! - [`ThreadPool`] - pre-warmed worker threads, so that timing a task does not include
//!   thread creation
//! - [`run_world()`] - an in-process simulation of a group of cooperating processes, each
//!   rank exchanging data with the others only through the collectives of its
//!   [`Communicator`]
//!
//! # Operating Principles
//!
//! ## Exact output sizes
//!
//! Every task requires its output regions to hold exactly as many elements as the result.
//! A mismatch is rejected during validation where the counts alone reveal it and during
//! preparation where it depends on dimensions stored in the input data.
//!
//! ## Repeatable execution
//!
//! The execute stage never consumes the prepared data, so executing repeatedly produces the
//! same result every time. This is what allows the compute-only timing mode of the harness
//! to execute many times after preparing once.
//!
//! ## Distributed stages are collective
//!
//! In the simulated multi-process backends every stage is a collective operation: the
//! distinguished rank decides whether validation, preparation and finalization succeed and
//! shares its verdict, so that all ranks move through the lifecycle in lockstep. Ranks other
//! than the distinguished one may hold empty descriptors.
//!
//! # Example
//!
//! ```
//! use task_harness::{MonotonicTimer, Perf, PerfAttr, TaskData};
//! use task_kernels::BatcherSortThreads;
//!
//! # fn main() -> Result<(), task_harness::Error> {
//! let input = [5.0, 4.0, 3.0, 2.0, 1.0];
//! let mut output = [0.0; 5];
//!
//! let mut task =
//!     BatcherSortThreads::new(TaskData::new().with_input(&input).with_output(&mut output));
//!
//! let mut attr = PerfAttr::builder()
//!     .repetitions(3)
//!     .timer(MonotonicTimer::start())
//!     .build()?;
//!
//! let results = Perf::new(&mut task).task_run(&mut attr);
//! results.print_to_stdout("sort_threads")?;
//!
//! drop(task);
//! assert_eq!(output, [1.0, 2.0, 3.0, 4.0, 5.0]);
//! # Ok(())
//! # }
//! ```

mod crs;
mod crs_threads;
mod gaussian;
mod gaussian_distributed;
mod gaussian_threads;
mod marking;
mod marking_threads;
mod pool;
mod sort;
mod sort_distributed;
mod sort_threads;
mod world;

pub use crs::{CrsMatrix, CrsMultiplySeq};
pub use crs_threads::*;
pub use gaussian::GaussianFilterSeq;
pub use gaussian_distributed::*;
pub use gaussian_threads::*;
pub use marking::MarkComponentsSeq;
pub use marking_threads::*;
pub use pool::*;
pub use sort::BatcherSortSeq;
pub use sort_distributed::*;
pub use sort_threads::*;
pub use world::*;
