use std::fmt;
use std::num::NonZero;
use std::time::Duration;

use crate::{Error, ProcessRole, Result, Stage};

/// Which part of the lifecycle a run timed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, derive_more::Display)]
#[expect(
    clippy::exhaustive_enums,
    reason = "the harness has exactly these two timing modes"
)]
pub enum RunMode {
    /// Every repetition timed the full validate/prepare/execute/finalize cycle.
    #[display("pipeline")]
    Pipeline,

    /// Only the execute stage was timed, with one untimed preparation and finalization.
    #[display("task_run")]
    TaskRun,
}

/// Whether every stage of every repetition of a run succeeded.
#[derive(Clone, Copy, Debug, Eq, PartialEq, derive_more::Display)]
#[expect(
    clippy::exhaustive_enums,
    reason = "a run either succeeded or it did not"
)]
pub enum Disposition {
    /// All repetitions completed.
    #[display("succeeded")]
    Succeeded,

    /// A stage failed and the run was aborted.
    #[display("failed at {stage}{}", describe_repetition(*repetition))]
    Failed {
        /// The stage that failed.
        stage: Stage,

        /// The zero-based index of the timed repetition in which the stage failed, or `None`
        /// if it was one of the untimed stages of a compute-only run.
        repetition: Option<u64>,
    },
}

fn describe_repetition(repetition: Option<u64>) -> String {
    repetition.map_or_else(String::new, |repetition| {
        format!(" in repetition {repetition}")
    })
}

/// The outcome of a perf run: timing samples and a disposition.
///
/// The timing is only meaningful if the run succeeded - a failed run never reports a mean,
/// since averaging an incomplete set of repetitions would misrepresent the task.
///
/// In distributed executions every process obtains results, but only the distinguished
/// process reports them (see [`print_to_stdout()`][Self::print_to_stdout]).
#[derive(Clone, Debug)]
#[must_use = "a run that is never inspected cannot report failure"]
pub struct PerfResults {
    mode: RunMode,
    repetitions: NonZero<u64>,
    role: ProcessRole,
    disposition: Disposition,

    // One per completed timed repetition.
    samples: Vec<Duration>,
}

impl PerfResults {
    /// The longest mean duration a run may report before it is considered too slow.
    pub const MAX_TIME: Duration = Duration::from_secs(10);

    pub(crate) fn new(
        mode: RunMode,
        repetitions: NonZero<u64>,
        role: ProcessRole,
        disposition: Disposition,
        samples: Vec<Duration>,
    ) -> Self {
        Self {
            mode,
            repetitions,
            role,
            disposition,
            samples,
        }
    }

    /// The timing mode of the run.
    #[must_use]
    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// The configured repetition count.
    #[must_use]
    pub fn repetitions(&self) -> NonZero<u64> {
        self.repetitions
    }

    /// The role of the process that produced these results.
    #[must_use]
    pub fn role(&self) -> ProcessRole {
        self.role
    }

    /// Whether all repetitions succeeded.
    #[must_use]
    pub fn disposition(&self) -> Disposition {
        self.disposition
    }

    /// Shorthand for checking for [`Disposition::Succeeded`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.disposition == Disposition::Succeeded
    }

    /// The elapsed time of every completed timed repetition, in order.
    #[must_use]
    pub fn samples(&self) -> &[Duration] {
        &self.samples
    }

    /// The total elapsed time over all repetitions, if the run succeeded.
    #[must_use]
    pub fn total(&self) -> Option<Duration> {
        self.is_success().then(|| self.samples.iter().sum())
    }

    /// The arithmetic mean elapsed time per repetition, if the run succeeded.
    #[must_use]
    pub fn mean(&self) -> Option<Duration> {
        let total_nanos = self.total()?.as_nanos();

        let mean_nanos = total_nanos
            .checked_div(u128::from(self.repetitions.get()))
            .expect("repetition count is NonZero, so division by zero is impossible");

        Some(Duration::from_nanos(
            mean_nanos
                .try_into()
                .expect("a mean exceeding u64 nanoseconds is unrealistic"),
        ))
    }

    /// The mean elapsed time in floating-point seconds, if the run succeeded.
    #[must_use]
    pub fn mean_secs(&self) -> Option<f64> {
        self.mean().map(|mean| mean.as_secs_f64())
    }

    /// The shortest repetition, if the run succeeded.
    #[must_use]
    pub fn min(&self) -> Option<Duration> {
        self.is_success()
            .then(|| self.samples.iter().min().copied())
            .flatten()
    }

    /// The longest repetition, if the run succeeded.
    #[must_use]
    pub fn max(&self) -> Option<Duration> {
        self.is_success()
            .then(|| self.samples.iter().max().copied())
            .flatten()
    }

    /// Checks the mean duration against [`MAX_TIME`][Self::MAX_TIME].
    ///
    /// A failed run has no mean and passes this check - its failure is reported through the
    /// disposition instead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TimeLimitExceeded`] if the mean is at or above the limit.
    pub fn check_time_limit(&self) -> Result<()> {
        match self.mean() {
            Some(mean) if mean >= Self::MAX_TIME => Err(Error::TimeLimitExceeded {
                mean,
                limit: Self::MAX_TIME,
            }),
            _ => Ok(()),
        }
    }

    /// A one-line human-readable summary of the run, labelled with the name of the task.
    ///
    /// Renders as `label:mode:seconds` with ten decimal places on success and as
    /// `label:mode:failed at stage` otherwise.
    pub fn report<'r>(&'r self, label: &'r str) -> Report<'r> {
        Report {
            label,
            results: self,
        }
    }

    /// Prints the summary to stdout, then checks the time limit.
    ///
    /// Prints nothing on processes other than the distinguished one, so that a distributed
    /// run reports exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TimeLimitExceeded`] if the mean is at or above
    /// [`MAX_TIME`][Self::MAX_TIME].
    #[cfg_attr(test, mutants::skip)] // Too difficult to test stdout output reliably.
    pub fn print_to_stdout(&self, label: &str) -> Result<()> {
        if !self.role.is_distinguished() {
            return Ok(());
        }

        println!("{}", self.report(label));
        self.check_time_limit()
    }
}

/// Human-readable summary of [`PerfResults`], produced by [`PerfResults::report()`].
#[derive(Debug)]
pub struct Report<'r> {
    label: &'r str,
    results: &'r PerfResults,
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:", self.label, self.results.mode)?;

        match (self.results.mean_secs(), self.results.disposition) {
            (Some(mean_secs), _) => write!(f, "{mean_secs:.10}"),
            (None, disposition) => write!(f, "{disposition}"),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(PerfResults: Send, Sync);

    fn succeeded(samples_ms: &[u64]) -> PerfResults {
        PerfResults::new(
            RunMode::Pipeline,
            NonZero::new(samples_ms.len() as u64).unwrap(),
            ProcessRole::Distinguished,
            Disposition::Succeeded,
            samples_ms.iter().copied().map(Duration::from_millis).collect(),
        )
    }

    #[test]
    fn aggregates_samples() {
        let results = succeeded(&[10, 30, 20]);

        assert!(results.is_success());
        assert_eq!(results.total(), Some(Duration::from_millis(60)));
        assert_eq!(results.mean(), Some(Duration::from_millis(20)));
        assert_eq!(results.min(), Some(Duration::from_millis(10)));
        assert_eq!(results.max(), Some(Duration::from_millis(30)));
    }

    #[test]
    fn failed_run_has_no_timing() {
        let results = PerfResults::new(
            RunMode::TaskRun,
            NonZero::new(4).unwrap(),
            ProcessRole::Distinguished,
            Disposition::Failed {
                stage: Stage::Execute,
                repetition: Some(2),
            },
            vec![Duration::from_millis(5), Duration::from_millis(5)],
        );

        assert!(!results.is_success());
        assert_eq!(results.samples().len(), 2);
        assert_eq!(results.total(), None);
        assert_eq!(results.mean(), None);
        assert_eq!(results.mean_secs(), None);
        assert_eq!(results.min(), None);
        assert!(results.check_time_limit().is_ok());
    }

    #[test]
    fn report_formats_mean_seconds() {
        let results = succeeded(&[1500, 500]);

        assert_eq!(
            results.report("sort_seq").to_string(),
            "sort_seq:pipeline:1.0000000000"
        );
    }

    #[test]
    fn report_formats_failure() {
        let results = PerfResults::new(
            RunMode::TaskRun,
            NonZero::new(3).unwrap(),
            ProcessRole::Distinguished,
            Disposition::Failed {
                stage: Stage::Prepare,
                repetition: None,
            },
            Vec::new(),
        );

        assert_eq!(
            results.report("filter").to_string(),
            "filter:task_run:failed at prepare"
        );
    }

    #[test]
    fn time_limit_enforced() {
        let fast = succeeded(&[9_999]);
        let slow = succeeded(&[10_000]);

        assert!(fast.check_time_limit().is_ok());
        assert!(matches!(
            slow.check_time_limit(),
            Err(Error::TimeLimitExceeded { .. })
        ));
    }

    #[test]
    fn disposition_display() {
        assert_eq!(Disposition::Succeeded.to_string(), "succeeded");
        assert_eq!(
            Disposition::Failed {
                stage: Stage::Finalize,
                repetition: Some(0),
            }
            .to_string(),
            "failed at finalize in repetition 0"
        );
        assert_eq!(
            Disposition::Failed {
                stage: Stage::Prepare,
                repetition: None,
            }
            .to_string(),
            "failed at prepare"
        );
    }
}
