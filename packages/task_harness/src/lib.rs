#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Execution contract and performance harness for parallel compute tasks.
//!
//! Every parallel exercise, whatever backend it runs on, plugs into the same three pieces:
//! - [`TaskData`] - a view over caller-owned input and output buffers, each buffer being a
//!   byte region with an element count
//! - [`Task`] - the four-stage validate/prepare/execute/finalize lifecycle a compute unit
//!   implements, driven in order by a [`Lifecycle`]
//! - [`Perf`] - runs a task repeatedly under caller-injected timing and produces
//!   [`PerfResults`] with a mean duration and an explicit success/failure [`Disposition`]
//!
//! # Operating Principles
//!
//! ## Caller-owned buffers
//!
//! The descriptor never owns memory. It borrows the caller's slices for the lifetime of the
//! task, so the caller regains access to the output buffers once the task is dropped.
//!
//! ## Injected timing
//!
//! The harness never reads a clock itself. The caller supplies a [`Timer`] that returns the
//! elapsed time since some fixed reference point. Tests supply scripted values, real runs use
//! [`MonotonicTimer`].
//!
//! ## Distributed roles
//!
//! When a task spans cooperating processes, only the process with the
//! [`ProcessRole::Distinguished`] role holds the authoritative input and output data. Every
//! process runs the same lifecycle the same number of times, but only the distinguished one
//! prints a report.
//!
//! # Criterion integration
//!
//! With the `criterion` feature enabled, [`Perf`] can also feed its measurements into a
//! Criterion benchmark group, using the task's own lifecycle as the measured routine.
//!
//! # Example
//!
//! ```
//! use task_harness::{MonotonicTimer, Perf, PerfAttr, Task, TaskData};
//!
//! struct Doubler<'a> {
//!     data: TaskData<'a>,
//!     values: Vec<u32>,
//! }
//!
//! impl Task for Doubler<'_> {
//!     fn validate(&self) -> bool {
//!         self.data.inputs().len() == 1 && self.data.input_count(0) == self.data.output_count(0)
//!     }
//!
//!     fn prepare(&mut self) -> bool {
//!         let Some(input) = self.data.input_as::<u32>(0) else {
//!             return false;
//!         };
//!         self.values = input.to_vec();
//!         true
//!     }
//!
//!     fn execute(&mut self) -> bool {
//!         self.values.iter_mut().for_each(|v| *v = v.wrapping_mul(2));
//!         true
//!     }
//!
//!     fn finalize(&mut self) -> bool {
//!         let Some(output) = self.data.output_as_mut::<u32>(0) else {
//!             return false;
//!         };
//!         output.copy_from_slice(&self.values);
//!         true
//!     }
//! }
//!
//! # fn main() -> Result<(), task_harness::Error> {
//! let input = [1_u32, 2, 3];
//! let mut output = [0_u32; 3];
//!
//! let mut task = Doubler {
//!     data: TaskData::new().with_input(&input).with_output(&mut output),
//!     values: Vec::new(),
//! };
//!
//! let mut attr = PerfAttr::builder()
//!     .repetitions(10)
//!     .timer(MonotonicTimer::start())
//!     .build()?;
//!
//! let results = Perf::new(&mut task).pipeline_run(&mut attr);
//! assert!(results.is_success());
//! results.print_to_stdout("doubler")?;
//!
//! drop(task);
//! assert_eq!(output, [2, 4, 6]);
//! # Ok(())
//! # }
//! ```

mod attr;
mod descriptor;
mod error;
mod perf;
mod perf_criterion;
mod results;
mod role;
mod task;

pub use attr::*;
pub use descriptor::*;
pub use error::*;
pub use perf::*;
pub use results::*;
pub use role::*;
pub use task::*;
