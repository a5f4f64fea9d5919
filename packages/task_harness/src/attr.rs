use std::num::NonZero;
use std::time::{Duration, Instant};

use crate::{Error, Result};

/// A source of elapsed time since some externally fixed reference point.
///
/// The perf harness reads time exclusively through this trait, which makes it deterministic
/// with respect to whatever timer the caller injects. Any `FnMut() -> Duration` closure is a
/// timer.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use task_harness::Timer;
///
/// let mut ticks = 0_u64;
/// let mut timer = move || {
///     ticks += 1;
///     Duration::from_millis(ticks)
/// };
///
/// assert_eq!(timer.now(), Duration::from_millis(1));
/// assert_eq!(timer.now(), Duration::from_millis(2));
/// ```
pub trait Timer {
    /// Returns the time elapsed since the reference point of this timer.
    fn now(&mut self) -> Duration;
}

impl<F> Timer for F
where
    F: FnMut() -> Duration,
{
    fn now(&mut self) -> Duration {
        self()
    }
}

/// A wall-clock timer whose reference point is the moment it was started.
#[derive(Clone, Copy, Debug)]
pub struct MonotonicTimer {
    origin: Instant,
}

impl MonotonicTimer {
    /// Creates a timer that measures from the current instant.
    #[must_use]
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Timer for MonotonicTimer {
    #[cfg_attr(test, mutants::skip)] // Real clocks cannot be asserted on precisely.
    fn now(&mut self) -> Duration {
        self.origin.elapsed()
    }
}

/// How a perf run is configured: how many repetitions to execute and how to read the time.
///
/// Construct with [`PerfAttr::builder()`], which rejects invalid configurations before any
/// run starts, or with [`PerfAttr::new()`] when the repetition count is already known to be
/// positive.
#[derive(derive_more::Debug)]
pub struct PerfAttr<'a> {
    repetitions: NonZero<u64>,

    #[debug(ignore)]
    timer: Box<dyn Timer + 'a>,
}

impl<'a> PerfAttr<'a> {
    /// The repetition count used when the builder is not given one.
    pub const DEFAULT_REPETITIONS: NonZero<u64> = NonZero::new(5).unwrap();

    /// Creates a configuration from an already validated repetition count.
    #[must_use]
    pub fn new(repetitions: NonZero<u64>, timer: impl Timer + 'a) -> Self {
        Self {
            repetitions,
            timer: Box::new(timer),
        }
    }

    /// Starts configuring a run.
    pub fn builder() -> PerfAttrBuilder<'a> {
        PerfAttrBuilder::default()
    }

    /// How many repetitions the run executes.
    #[must_use]
    pub fn repetitions(&self) -> NonZero<u64> {
        self.repetitions
    }

    /// Reads the injected timer.
    pub(crate) fn now(&mut self) -> Duration {
        self.timer.now()
    }
}

/// Builder for [`PerfAttr`].
#[derive(derive_more::Debug, Default)]
#[must_use]
pub struct PerfAttrBuilder<'a> {
    repetitions: Option<u64>,

    #[debug(ignore)]
    timer: Option<Box<dyn Timer + 'a>>,
}

impl<'a> PerfAttrBuilder<'a> {
    /// Sets how many repetitions the run executes.
    ///
    /// Defaults to [`PerfAttr::DEFAULT_REPETITIONS`].
    pub fn repetitions(mut self, repetitions: u64) -> Self {
        self.repetitions = Some(repetitions);
        self
    }

    /// Sets the timer the run reads elapsed time from. Required.
    pub fn timer(mut self, timer: impl Timer + 'a) -> Self {
        self.timer = Some(Box::new(timer));
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroRepetitions`] if the repetition count is zero and
    /// [`Error::MissingTimer`] if no timer was provided.
    pub fn build(self) -> Result<PerfAttr<'a>> {
        let repetitions = match self.repetitions {
            Some(count) => NonZero::new(count).ok_or(Error::ZeroRepetitions)?,
            None => PerfAttr::DEFAULT_REPETITIONS,
        };

        let timer = self.timer.ok_or(Error::MissingTimer)?;

        Ok(PerfAttr { repetitions, timer })
    }
}
