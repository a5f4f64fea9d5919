use std::any::type_name;
use std::fmt;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::{
    Disposition, Lifecycle, PerfAttr, PerfResults, ProcessRole, RunMode, Stage, Task,
};

/// Measures the running time of a [`Task`] over repeated executions.
///
/// Two timing modes are offered:
///
/// * [`pipeline_run()`][Self::pipeline_run] times the full validate/prepare/execute/finalize
///   cycle of every repetition.
/// * [`task_run()`][Self::task_run] prepares once, times only the execute stage of every
///   repetition and finalizes once, isolating the algorithm body from data marshalling.
///
/// Control flow is single-threaded and blocking: stages run strictly in sequence and
/// repetitions never overlap. Any parallelism lives inside the task. The harness never
/// touches the task's buffers and never reads a clock other than the injected
/// [`Timer`][crate::Timer].
///
/// In distributed executions every process must drive its task through the same run, so that
/// collective operations inside the stages stay matched. Only the distinguished process
/// reports the results.
///
/// # Examples
///
/// ```
/// use std::num::NonZero;
/// use std::time::Duration;
///
/// use task_harness::{Perf, PerfAttr, Task};
///
/// struct Idle;
///
/// impl Task for Idle {
///     fn validate(&self) -> bool {
///         true
///     }
///     fn prepare(&mut self) -> bool {
///         true
///     }
///     fn execute(&mut self) -> bool {
///         true
///     }
///     fn finalize(&mut self) -> bool {
///         true
///     }
/// }
///
/// // A scripted timer that advances by one second per reading.
/// let mut seconds = 0;
/// let timer = move || {
///     seconds += 1;
///     Duration::from_secs(seconds)
/// };
///
/// let mut attr = PerfAttr::new(NonZero::new(4).unwrap(), timer);
/// let mut task = Idle;
///
/// let results = Perf::new(&mut task).task_run(&mut attr);
///
/// assert_eq!(results.mean(), Some(Duration::from_secs(1)));
/// ```
pub struct Perf<'t, T: ?Sized> {
    lifecycle: Lifecycle<'t, T>,
}

impl<'t, T> Perf<'t, T>
where
    T: Task + ?Sized,
{
    /// Prepares to measure `task`.
    #[must_use]
    pub fn new(task: &'t mut T) -> Self {
        Self {
            lifecycle: Lifecycle::new(task),
        }
    }

    /// The task being measured.
    #[must_use]
    pub fn task(&self) -> &T {
        self.lifecycle.task()
    }

    /// Ends the measurement and hands back the borrow of the task.
    #[must_use]
    pub fn into_task(self) -> &'t mut T {
        self.lifecycle.into_task()
    }

    /// Times the complete lifecycle of every repetition.
    ///
    /// The timer is read once before the first repetition and once after each repetition,
    /// so a timer returning `t0, t1, ..., tN` yields a mean of `(tN - t0) / N`.
    ///
    /// The run stops at the first failed stage and reports which stage and repetition failed.
    pub fn pipeline_run(&mut self, attr: &mut PerfAttr<'_>) -> PerfResults {
        let role = self.lifecycle.task().role();
        let repetitions = attr.repetitions();

        debug!(
            task = type_name::<T>(),
            %role,
            repetitions = repetitions.get(),
            "starting pipeline run"
        );

        let mut samples = Vec::new();
        let mut previous = attr.now();

        for repetition in 0..repetitions.get() {
            if let Err(e) = self.lifecycle.run_once() {
                return failed(
                    RunMode::Pipeline,
                    attr,
                    role,
                    e.stage(),
                    Some(repetition),
                    samples,
                );
            }

            previous = record_sample(&mut samples, previous, attr.now(), repetition);
        }

        succeeded(RunMode::Pipeline, attr, role, samples)
    }

    /// Times only the execute stage of every repetition.
    ///
    /// Validation and preparation run once before timing starts, and finalization runs once
    /// after the last repetition to materialize the result in the output buffers. Neither is
    /// timed. The timer is read once before the first execution and once after each one.
    pub fn task_run(&mut self, attr: &mut PerfAttr<'_>) -> PerfResults {
        let role = self.lifecycle.task().role();
        let repetitions = attr.repetitions();

        debug!(
            task = type_name::<T>(),
            %role,
            repetitions = repetitions.get(),
            "starting task run"
        );

        if let Err(e) = self
            .lifecycle
            .validate()
            .and_then(|()| self.lifecycle.prepare())
        {
            return failed(RunMode::TaskRun, attr, role, e.stage(), None, Vec::new());
        }

        let mut samples = Vec::new();
        let mut previous = attr.now();

        for repetition in 0..repetitions.get() {
            if let Err(e) = self.lifecycle.execute() {
                return failed(
                    RunMode::TaskRun,
                    attr,
                    role,
                    e.stage(),
                    Some(repetition),
                    samples,
                );
            }

            previous = record_sample(&mut samples, previous, attr.now(), repetition);
        }

        if let Err(e) = self.lifecycle.finalize() {
            return failed(RunMode::TaskRun, attr, role, e.stage(), None, samples);
        }

        succeeded(RunMode::TaskRun, attr, role, samples)
    }
}

impl<T: ?Sized> fmt::Debug for Perf<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

/// Appends the time elapsed between two timer readings and returns the later reading.
fn record_sample(
    samples: &mut Vec<Duration>,
    previous: Duration,
    now: Duration,
    repetition: u64,
) -> Duration {
    let elapsed = now.checked_sub(previous).unwrap_or_else(|| {
        warn!(?previous, ?now, repetition, "timer went backwards, recording zero");
        Duration::ZERO
    });

    trace!(repetition, ?elapsed, "repetition completed");

    samples.push(elapsed);
    now
}

fn succeeded(
    mode: RunMode,
    attr: &PerfAttr<'_>,
    role: ProcessRole,
    samples: Vec<Duration>,
) -> PerfResults {
    let results = PerfResults::new(
        mode,
        attr.repetitions(),
        role,
        Disposition::Succeeded,
        samples,
    );

    debug!(%mode, mean = ?results.mean(), "run succeeded");

    results
}

fn failed(
    mode: RunMode,
    attr: &PerfAttr<'_>,
    role: ProcessRole,
    stage: Stage,
    repetition: Option<u64>,
    samples: Vec<Duration>,
) -> PerfResults {
    warn!(%mode, %stage, ?repetition, "run aborted by failed stage");

    PerfResults::new(
        mode,
        attr.repetitions(),
        role,
        Disposition::Failed { stage, repetition },
        samples,
    )
}
