#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing and benchmarking tasks in this workspace.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

/// Runs a test with a timeout so that a deadlocked collective or thread pool fails the test
/// instead of hanging the build.
///
/// The timeout is 10 seconds under normal conditions and 60 seconds under Miri, where thread
/// synchronization primitives are significantly slower.
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the watchdog is disabled
/// and the test function is executed directly, so that mutation testing can detect hanging
/// mutations.
///
/// # Panics
///
/// Panics if the test exceeds the timeout (when not in mutation testing mode) and resumes
/// the panic of the test function if it panicked.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// let sum = with_watchdog(|| (1..=4).sum::<u32>());
/// assert_eq!(sum, 10);
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let timeout = if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    };

    let (tx, rx) = mpsc::channel();

    let test_handle = thread::spawn(move || {
        let result = test_fn();
        // If this fails, the receiver has already timed out.
        drop(tx.send(result));
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            test_handle.join().expect("test thread should not panic");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test exceeded the {timeout:?} watchdog timeout");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_handle.join() {
            Ok(()) => panic!("test thread disconnected unexpectedly"),
            Err(e) => std::panic::resume_unwind(e),
        },
    }
}

/// Calculates the difference between two f64 values and considers
/// them equal if the difference is not more than `close_enough`.
///
/// This is a "correctly performed" floating point equality comparison.
#[must_use]
pub fn f64_diff_abs(a: f64, b: f64, close_enough: f64) -> f64 {
    let diff = (a - b).abs();

    if diff <= close_enough { 0.0 } else { diff }
}

/// A timer that returns a scripted sequence of readings, one per call.
///
/// Clones share the same script and call counter, so a test can hand one clone to the code
/// under test and inspect the other afterwards.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
///
/// use testing::ScriptedTimer;
///
/// let timer = ScriptedTimer::from_secs([1.0, 2.5]);
/// let reader = timer.clone();
///
/// assert_eq!(reader.read(), Duration::from_secs(1));
/// assert_eq!(reader.read(), Duration::from_millis(2500));
/// assert_eq!(timer.calls(), 2);
/// ```
#[derive(Clone, Debug)]
pub struct ScriptedTimer {
    state: Arc<Mutex<ScriptedTimerState>>,
}

#[derive(Debug)]
struct ScriptedTimerState {
    remaining: VecDeque<Duration>,
    calls: usize,
}

impl ScriptedTimer {
    /// Creates a timer that returns the given readings in order.
    #[must_use]
    pub fn new(readings: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptedTimerState {
                remaining: readings.into_iter().collect(),
                calls: 0,
            })),
        }
    }

    /// Creates a timer from readings expressed in seconds.
    #[must_use]
    pub fn from_secs(readings: impl IntoIterator<Item = f64>) -> Self {
        Self::new(readings.into_iter().map(Duration::from_secs_f64))
    }

    /// Returns the next scripted reading.
    ///
    /// # Panics
    ///
    /// Panics if the script has been exhausted, which means the code under test read the
    /// timer more often than the test expected.
    #[must_use]
    pub fn read(&self) -> Duration {
        let mut state = self
            .state
            .lock()
            .expect("ScriptedTimer state lock should not be poisoned");

        state.calls = state.calls.wrapping_add(1);

        state
            .remaining
            .pop_front()
            .expect("scripted timer read more often than the test scripted")
    }

    /// How many readings have been taken so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.state
            .lock()
            .expect("ScriptedTimer state lock should not be poisoned")
            .calls
    }
}
