use std::any::type_name;
use std::fmt;

use thiserror::Error;
use tracing::{trace, warn};

use crate::ProcessRole;

/// A parallel compute unit with a four-stage lifecycle.
///
/// A concrete task is constructed around a [`TaskData`][crate::TaskData] descriptor and is
/// driven through [`validate()`][Self::validate], [`prepare()`][Self::prepare],
/// [`execute()`][Self::execute] and [`finalize()`][Self::finalize], strictly in that order.
/// Each stage reports success as a boolean and a failed stage aborts the rest of the cycle.
///
/// The cycle may be repeated many times on the same instance, so every stage must be safe to
/// repeat: running the full cycle twice on unchanged inputs must produce identical outputs.
///
/// Use a [`Lifecycle`] to drive a task with stage-order enforcement, or hand it to
/// [`Perf`][crate::Perf] to measure it.
#[cfg_attr(test, mockall::automock)]
pub trait Task {
    /// Checks that input and output counts and shapes satisfy the task's contract.
    ///
    /// Only reads counts, never touches buffer contents.
    fn validate(&self) -> bool;

    /// Reads the input buffers into the task's private working representation.
    ///
    /// Returns `false` if the data cannot be converted, e.g. because of a sentinel value
    /// the algorithm cannot handle.
    fn prepare(&mut self) -> bool;

    /// Runs the algorithm body over the private working representation.
    ///
    /// This is where any fan-out to threads or cooperating processes happens. Returns `false`
    /// only on an internal invariant violation.
    fn execute(&mut self) -> bool;

    /// Writes the private result into the output buffers.
    ///
    /// Returns `false` if the result cannot be mapped onto the declared output shape.
    fn finalize(&mut self) -> bool;

    /// The role of the current process in the execution of this task.
    fn role(&self) -> ProcessRole {
        ProcessRole::Distinguished
    }
}

/// One of the four stages of the task lifecycle.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, derive_more::Display)]
#[expect(
    clippy::exhaustive_enums,
    reason = "the lifecycle has exactly these four stages"
)]
pub enum Stage {
    /// Shape and count checks.
    #[display("validate")]
    Validate,

    /// Conversion of inputs into working storage.
    #[display("prepare")]
    Prepare,

    /// The algorithm body.
    #[display("execute")]
    Execute,

    /// Materialization of the result into the outputs.
    #[display("finalize")]
    Finalize,
}

impl Stage {
    /// All stages, in lifecycle order.
    pub const ALL: [Self; 4] = [Self::Validate, Self::Prepare, Self::Execute, Self::Finalize];

    /// Whether this stage may be entered when `last_completed` was the most recently
    /// completed stage (`None` meaning no cycle is in progress).
    ///
    /// Execution may repeat without re-preparing, which is what compute-only timing relies on.
    #[must_use]
    pub fn may_follow(self, last_completed: Option<Self>) -> bool {
        matches!(
            (last_completed, self),
            (None | Some(Self::Finalize), Self::Validate)
                | (Some(Self::Validate), Self::Prepare)
                | (Some(Self::Prepare | Self::Execute), Self::Execute)
                | (Some(Self::Execute), Self::Finalize)
        )
    }
}

/// Why a lifecycle stage did not complete.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum StageError {
    /// The task reported failure from the stage.
    #[error("task reported failure in the {0} stage")]
    Failed(Stage),

    /// The stage was requested before its predecessor completed. The task was not called.
    #[error("the {requested} stage cannot follow {}", describe_last(.last_completed.as_ref()))]
    OutOfOrder {
        /// The stage that was requested.
        requested: Stage,

        /// The most recently completed stage, if a cycle was in progress.
        last_completed: Option<Stage>,
    },
}

impl StageError {
    /// The stage the error relates to.
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Failed(stage) => *stage,
            Self::OutOfOrder { requested, .. } => *requested,
        }
    }
}

fn describe_last(last_completed: Option<&Stage>) -> String {
    last_completed.map_or_else(
        || "the start of a cycle".to_string(),
        |stage| format!("the {stage} stage"),
    )
}

/// Drives a [`Task`] through its stages, refusing out-of-order transitions.
///
/// A stage is only reachable once its predecessor succeeded. A failed stage ends the
/// current cycle, after which only [`validate()`][Self::validate] is accepted.
///
/// # Examples
///
/// ```
/// use task_harness::{Lifecycle, Stage, StageError, Task};
///
/// struct Noop;
///
/// impl Task for Noop {
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
/// let mut task = Noop;
/// let mut lifecycle = Lifecycle::new(&mut task);
///
/// assert!(matches!(
///     lifecycle.execute(),
///     Err(StageError::OutOfOrder { requested: Stage::Execute, .. })
/// ));
///
/// lifecycle.run_once().unwrap();
/// assert_eq!(lifecycle.last_completed(), Some(Stage::Finalize));
/// ```
pub struct Lifecycle<'t, T: ?Sized> {
    task: &'t mut T,
    last_completed: Option<Stage>,
}

impl<'t, T> Lifecycle<'t, T>
where
    T: Task + ?Sized,
{
    /// Starts driving `task` with no cycle in progress.
    #[must_use]
    pub fn new(task: &'t mut T) -> Self {
        Self {
            task,
            last_completed: None,
        }
    }

    /// The most recently completed stage of the current cycle.
    #[must_use]
    pub fn last_completed(&self) -> Option<Stage> {
        self.last_completed
    }

    /// The task being driven.
    #[must_use]
    pub fn task(&self) -> &T {
        &*self.task
    }

    /// Stops driving the task and hands back the borrow of it.
    #[must_use]
    pub fn into_task(self) -> &'t mut T {
        self.task
    }

    /// Runs the validation stage, starting a new cycle.
    ///
    /// # Errors
    ///
    /// Fails if a cycle is in progress or the task rejects its descriptor.
    pub fn validate(&mut self) -> Result<(), StageError> {
        self.enter(Stage::Validate)?;
        let succeeded = self.task.validate();
        self.complete(Stage::Validate, succeeded)
    }

    /// Runs the preparation stage.
    ///
    /// # Errors
    ///
    /// Fails if validation has not just completed or the task cannot prepare its data.
    pub fn prepare(&mut self) -> Result<(), StageError> {
        self.enter(Stage::Prepare)?;
        let succeeded = self.task.prepare();
        self.complete(Stage::Prepare, succeeded)
    }

    /// Runs the execution stage. May be repeated without re-preparing.
    ///
    /// # Errors
    ///
    /// Fails if preparation has not completed or the task hits an internal error.
    pub fn execute(&mut self) -> Result<(), StageError> {
        self.enter(Stage::Execute)?;
        let succeeded = self.task.execute();
        self.complete(Stage::Execute, succeeded)
    }

    /// Runs the finalization stage, ending the cycle.
    ///
    /// # Errors
    ///
    /// Fails if execution has not completed or the result does not fit the outputs.
    pub fn finalize(&mut self) -> Result<(), StageError> {
        self.enter(Stage::Finalize)?;
        let succeeded = self.task.finalize();
        self.complete(Stage::Finalize, succeeded)
    }

    /// Runs one complete cycle, stopping at the first stage that fails.
    ///
    /// # Errors
    ///
    /// Returns the error of the first stage that did not complete.
    pub fn run_once(&mut self) -> Result<(), StageError> {
        self.validate()?;
        self.prepare()?;
        self.execute()?;
        self.finalize()
    }

    fn enter(&self, requested: Stage) -> Result<(), StageError> {
        if requested.may_follow(self.last_completed) {
            Ok(())
        } else {
            Err(StageError::OutOfOrder {
                requested,
                last_completed: self.last_completed,
            })
        }
    }

    fn complete(&mut self, stage: Stage, succeeded: bool) -> Result<(), StageError> {
        if succeeded {
            trace!(%stage, "stage completed");
            self.last_completed = Some(stage);
            Ok(())
        } else {
            warn!(%stage, task = type_name::<T>(), "stage failed");
            self.last_completed = None;
            Err(StageError::Failed(stage))
        }
    }
}

impl<T: ?Sized> fmt::Debug for Lifecycle<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("last_completed", &self.last_completed)
            .finish_non_exhaustive()
    }
}
