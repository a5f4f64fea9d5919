use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the perf harness outside of the task lifecycle itself.
///
/// Stage failures are not errors in this sense: they are recorded in the
/// [`Disposition`][crate::Disposition] of the run results.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A run was configured with zero repetitions.
    #[error("repetition count must be positive")]
    ZeroRepetitions,

    /// A run was configured without a timer.
    #[error("a timer is required to measure a run")]
    MissingTimer,

    /// The mean duration of a run exceeded the permitted limit.
    #[error("mean execution time {mean:?} exceeds the limit of {limit:?}")]
    TimeLimitExceeded {
        /// The mean duration that was measured.
        mean: Duration,

        /// The limit that was exceeded.
        limit: Duration,
    },
}

/// A specialized `Result` type for harness operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn time_limit_message_names_both_durations() {
        let error = Error::TimeLimitExceeded {
            mean: Duration::from_secs(12),
            limit: Duration::from_secs(10),
        };

        assert_eq!(
            error.to_string(),
            "mean execution time 12s exceeds the limit of 10s"
        );
    }
}
