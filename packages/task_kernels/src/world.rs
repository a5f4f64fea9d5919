use std::any::Any;
use std::num::NonZero;
use std::panic;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use task_harness::ProcessRole;
use tracing::{debug, trace};

/// Runs `f` on `size` simulated processes ("ranks") concurrently and returns the per-rank
/// results in rank order.
///
/// Every rank is a thread that runs the same function with its own [`Communicator`]. Ranks
/// exchange data exclusively through the collective operations of the communicator, so a
/// task written against it behaves as it would with one process per rank: rank
/// [`ProcessRole::DISTINGUISHED_RANK`] holds the authoritative data and the others
/// participate.
///
/// # Examples
///
/// ```
/// use std::num::NonZero;
///
/// use task_kernels::run_world;
///
/// let sums = run_world(NonZero::new(3).unwrap(), |comm| {
///     let values = comm.all_gather(comm.rank());
///     values.iter().sum::<usize>()
/// });
///
/// assert_eq!(sums, vec![3, 3, 3]);
/// ```
///
/// # Panics
///
/// Resumes the panic of the first rank that panicked. Once a rank has panicked, every other
/// rank panics as soon as it waits in (or enters) a collective, so that the world never
/// deadlocks on a rank that is gone.
pub fn run_world<F, R>(size: NonZero<usize>, f: F) -> Vec<R>
where
    F: Fn(Communicator) -> R + Sync,
    R: Send,
{
    let shared = Arc::new(Shared::new(size));

    debug!(size, "starting simulated world");

    thread::scope(|scope| {
        let handles = (0..size.get())
            .map(|rank| {
                let comm = Communicator {
                    rank,
                    shared: Arc::clone(&shared),
                };
                let f = &f;
                let shared = &*shared;

                thread::Builder::new()
                    .name(format!("rank-{rank}"))
                    .spawn_scoped(scope, move || {
                        let _guard = AbortOnPanic { shared, rank };
                        f(comm)
                    })
                    .expect("failed to spawn rank thread: thread spawning failure is not supported")
            })
            .collect::<Vec<_>>();

        let mut outcomes = handles
            .into_iter()
            .map(|handle| handle.join())
            .collect::<Vec<_>>();

        // The other ranks only panicked because this one did.
        if let Some(rank) = shared.first_panicked_rank() {
            if rank < outcomes.len() {
                if let Err(payload) = outcomes.swap_remove(rank) {
                    panic::resume_unwind(payload);
                }
            }
        }

        outcomes
            .into_iter()
            .map(|outcome| outcome.unwrap_or_else(|payload| panic::resume_unwind(payload)))
            .collect()
    })
}

/// Marks the world as aborted if the rank it guards unwinds.
struct AbortOnPanic<'s> {
    shared: &'s Shared,
    rank: usize,
}

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.shared.abort(self.rank);
        }
    }
}

type Slot = Option<Box<dyn Any + Send>>;

const TYPE_MISMATCH: &str =
    "collective type mismatch: every rank must call the same collective with the same type";

const ABORTED: &str = "another rank panicked, abandoning the collective";

#[derive(Debug)]
struct Shared {
    size: NonZero<usize>,

    barrier: Mutex<BarrierState>,
    barrier_released: Condvar,

    // One mailbox per rank. A collective writes, synchronizes, reads and synchronizes again,
    // so mailboxes are always empty between collectives.
    slots: Mutex<Vec<Slot>>,
}

impl Shared {
    fn new(size: NonZero<usize>) -> Self {
        Self {
            size,
            barrier: Mutex::new(BarrierState::default()),
            barrier_released: Condvar::new(),
            slots: Mutex::new((0..size.get()).map(|_| None).collect()),
        }
    }

    // Aborting happens during unwinding, so this must not panic on a poisoned lock.
    fn barrier_state(&self) -> MutexGuard<'_, BarrierState> {
        self.barrier.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until every rank has arrived, or panics if a rank panicked.
    fn wait(&self) {
        let mut state = self.barrier_state();

        // Never panic while holding the lock, the unwinding rank still has to abort.
        if state.aborted_by.is_some() {
            drop(state);
            panic!("{ABORTED}");
        }

        let generation = state.generation;
        state.arrived = state.arrived.wrapping_add(1);

        if state.arrived == self.size.get() {
            state.arrived = 0;
            state.generation = generation.wrapping_add(1);
            drop(state);

            self.barrier_released.notify_all();
            return;
        }

        let state = self
            .barrier_released
            .wait_while(state, |state| {
                state.generation == generation && state.aborted_by.is_none()
            })
            .unwrap_or_else(PoisonError::into_inner);

        let released = state.generation != generation;
        drop(state);

        assert!(released, "{ABORTED}");
    }

    fn abort(&self, rank: usize) {
        let mut state = self.barrier_state();
        let first = *state.aborted_by.get_or_insert(rank);
        drop(state);

        debug!(rank, first, "rank panicked, aborting world");

        self.barrier_released.notify_all();
    }

    fn first_panicked_rank(&self) -> Option<usize> {
        self.barrier_state().aborted_by
    }
}

/// A reusable barrier that can be abandoned.
#[derive(Debug, Default)]
struct BarrierState {
    arrived: usize,

    // Incremented every time all ranks have arrived.
    generation: u64,

    aborted_by: Option<usize>,
}

/// One rank's handle to the group of ranks started by [`run_world()`].
///
/// Every collective operation must be called by every rank, in the same order and with the
/// same element type. Mismatched collectives are a programming error: a type mismatch
/// panics and a missing call deadlocks.
#[derive(Clone, Debug)]
pub struct Communicator {
    rank: usize,
    shared: Arc<Shared>,
}

impl Communicator {
    /// The index of this rank in the group.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// The number of ranks in the group.
    #[must_use]
    pub fn size(&self) -> NonZero<usize> {
        self.shared.size
    }

    /// The role this rank plays in a distributed task.
    #[must_use]
    pub fn role(&self) -> ProcessRole {
        ProcessRole::from_rank(self.rank)
    }

    /// Waits until every rank has reached this point.
    ///
    /// # Panics
    ///
    /// Panics if another rank has panicked.
    pub fn barrier(&self) {
        self.shared.wait();
    }

    /// Sends `value` from `root` to every rank, including the root itself.
    ///
    /// Only the root provides a value. Other ranks pass `None`.
    ///
    /// # Panics
    ///
    /// Panics if the root passes `None`.
    pub fn broadcast<T>(&self, root: usize, value: Option<T>) -> T
    where
        T: Clone + Send + 'static,
    {
        if self.rank == root {
            let value = value.expect("the root of a broadcast must provide the value");
            self.put(root, value);
        }

        self.barrier();
        let value = self.peek::<T>(root);
        self.barrier();

        if self.rank == root {
            drop(self.take::<T>(root));
        }

        trace!(rank = self.rank, root, "broadcast completed");

        value
    }

    /// Collects one value from every rank and returns all of them, in rank order, to every
    /// rank.
    pub fn all_gather<T>(&self, value: T) -> Vec<T>
    where
        T: Clone + Send + 'static,
    {
        self.put(self.rank, value);

        self.barrier();
        let values = (0..self.shared.size.get())
            .map(|rank| self.peek::<T>(rank))
            .collect();
        self.barrier();

        drop(self.take::<T>(self.rank));

        values
    }

    /// Distributes one chunk to every rank from `root`.
    ///
    /// Only the root provides the chunks, exactly one per rank. Other ranks pass `None`.
    ///
    /// # Panics
    ///
    /// Panics if the root passes `None` or a number of chunks that differs from the number of
    /// ranks.
    pub fn scatter<T>(&self, root: usize, chunks: Option<Vec<Vec<T>>>) -> Vec<T>
    where
        T: Send + 'static,
    {
        if self.rank == root {
            let chunks = chunks.expect("the root of a scatter must provide the chunks");
            assert_eq!(
                chunks.len(),
                self.shared.size.get(),
                "a scatter needs exactly one chunk per rank"
            );

            for (rank, chunk) in chunks.into_iter().enumerate() {
                self.put(rank, chunk);
            }
        }

        self.barrier();
        let chunk = self.take::<Vec<T>>(self.rank);
        self.barrier();

        trace!(rank = self.rank, root, len = chunk.len(), "scatter completed");

        chunk
    }

    /// Collects one chunk from every rank on `root`.
    ///
    /// Returns the chunks in rank order on the root and `None` on every other rank.
    pub fn gather<T>(&self, root: usize, chunk: Vec<T>) -> Option<Vec<Vec<T>>>
    where
        T: Send + 'static,
    {
        self.put(self.rank, chunk);

        self.barrier();
        let chunks = (self.rank == root).then(|| {
            (0..self.shared.size.get())
                .map(|rank| self.take::<Vec<T>>(rank))
                .collect()
        });
        self.barrier();

        trace!(rank = self.rank, root, "gather completed");

        chunks
    }

    fn slots(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.shared
            .slots
            .lock()
            .expect("world mailboxes are never poisoned unless a rank panicked mid-collective")
    }

    fn put<T: Send + 'static>(&self, rank: usize, value: T) {
        let mut slots = self.slots();
        let slot = slots
            .get_mut(rank)
            .expect("collective addressed a rank outside the world");

        assert!(
            slot.is_none(),
            "mailbox of rank {rank} still occupied: collectives were called out of order"
        );

        *slot = Some(Box::new(value));
    }

    fn peek<T: Clone + 'static>(&self, rank: usize) -> T {
        self.slots()
            .get(rank)
            .and_then(Option::as_ref)
            .and_then(|value| value.downcast_ref::<T>())
            .expect(TYPE_MISMATCH)
            .clone()
    }

    fn take<T: 'static>(&self, rank: usize) -> T {
        let value = self
            .slots()
            .get_mut(rank)
            .and_then(Option::take)
            .expect("collective read an empty mailbox: every rank must call the same collective");

        *value
            .downcast::<T>()
            .unwrap_or_else(|_| panic!("{TYPE_MISMATCH}"))
    }
}
