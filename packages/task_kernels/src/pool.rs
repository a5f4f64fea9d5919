use std::num::NonZero;
use std::ops::Range;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::{iter, mem};

use num_integer::Integer;
use tracing::debug;

/// Pre-warmed worker threads for the shared-memory backend of a task.
///
/// Threads are created once, when the pool is created, so that timing the execute stage of a
/// task does not include thread creation. A task owns its pool for its whole lifetime.
///
/// # Examples
///
/// ```
/// use std::num::NonZero;
///
/// use task_kernels::ThreadPool;
///
/// let mut pool = ThreadPool::new(NonZero::new(3).unwrap());
/// let data = [10, 20, 30];
///
/// // Every worker receives its index and may borrow from the caller.
/// let results = pool.broadcast(|worker_index| data[worker_index] + 1);
///
/// assert_eq!(&*results, &[11, 21, 31]);
/// ```
///
/// # Lifecycle
///
/// Dropping the pool waits for all threads to finish executing their work.
#[derive(Debug)]
pub struct ThreadPool {
    command_txs: Vec<mpsc::Sender<Command>>,
    join_handles: Vec<JoinHandle<()>>,
    thread_count: NonZero<usize>,
}

impl ThreadPool {
    /// Creates a pool with the given number of worker threads.
    ///
    /// # Panics
    ///
    /// Panics if the operating system refuses to create a thread.
    #[must_use]
    pub fn new(thread_count: NonZero<usize>) -> Self {
        let (command_txs, join_handles) = (0..thread_count.get())
            .map(|worker_index| {
                let (tx, rx) = mpsc::channel();

                let handle = thread::Builder::new()
                    .name(format!("task-worker-{worker_index}"))
                    .spawn(move || worker_entrypoint(&rx))
                    .expect("failed to spawn worker thread: thread spawning failure is not supported");

                (tx, handle)
            })
            .unzip();

        debug!(thread_count, "thread pool started");

        Self {
            command_txs,
            join_handles,
            thread_count,
        }
    }

    /// Returns the number of threads in the pool.
    #[must_use]
    pub fn thread_count(&self) -> NonZero<usize> {
        self.thread_count
    }

    /// Executes `f` once on every thread in the pool, passing the index of the worker, and
    /// waits for all of them to complete, returning the results in worker index order.
    ///
    /// The callback may borrow from the caller because this function does not return before
    /// every worker has finished with it.
    ///
    /// # Panics
    ///
    /// Panics if a worker panics while executing `f` or has exited after an earlier panic.
    /// The panic is raised only after every other worker has finished with `f`.
    #[cfg_attr(test, mutants::skip)] // If work does not get enqueued, deadlocks are very easy.
    #[expect(
        clippy::needless_pass_by_ref_mut,
        reason = "protects users from deadlock through concurrent usage"
    )]
    pub fn broadcast<'f, F, R>(&mut self, f: F) -> Box<[R]>
    where
        F: FnOnce(usize) -> R + Clone + Send + 'f,
        R: Send + 'static,
    {
        // This requires a `&mut` exclusive reference because two concurrent broadcasts on the
        // same pool would interleave their commands. Internally, we have no need for a `&mut`
        // reference, this is just for caller safety.

        let (result_txs, result_rxs): (Vec<_>, Vec<_>) =
            iter::repeat_with(oneshot::channel::<R>)
                .take(self.thread_count.get())
                .unzip();

        for ((worker_index, tx), result_tx) in self.command_txs.iter().enumerate().zip(result_txs)
        {
            let f = f.clone();
            let f: Box<dyn FnOnce() + Send + 'f> = Box::new(move || {
                let result = f(worker_index);

                result_tx.send(result).expect(
                    "receiver must still exist - this is mandatory for scoped lifetime logic",
                );
            });

            // SAFETY: We wait on every result channel before returning or panicking. A channel
            // only completes once its closure has sent a result or been dropped (by a worker
            // unwinding from a panic or by a rejected send), so anything borrowed by `f` is
            // still borrowed for as long as any worker can touch it. The callee still operates
            // under the `'f` lifetime from the caller's point of view, the `'static` is only
            // needed to pass the closure through the command channel.
            let f = unsafe {
                mem::transmute::<Box<dyn FnOnce() + Send + 'f>, Box<dyn FnOnce() + Send + 'static>>(
                    f,
                )
            };

            // If the worker is gone, the rejected command is dropped here together with its
            // result sender, which the receive loop below observes as a missing result.
            drop(tx.send(Command::Execute(f)));
        }

        // Every result channel must be drained before we may panic: until a worker has sent
        // its result or dropped its sender while unwinding, it may still be touching data
        // borrowed from the caller.
        let mut results = Vec::with_capacity(self.thread_count.get());
        let mut all_delivered = true;

        for rx in result_rxs {
            match rx.recv() {
                Ok(result) => results.push(result),
                Err(_) => all_delivered = false,
            }
        }

        assert!(
            all_delivered,
            "worker thread failed to send result - did it panic?"
        );

        results.into_boxed_slice()
    }
}

impl Default for ThreadPool {
    /// Creates a pool with one thread per unit of available parallelism.
    fn default() -> Self {
        Self::new(thread::available_parallelism().unwrap_or(NonZero::<usize>::MIN))
    }
}

impl Drop for ThreadPool {
    #[cfg_attr(test, mutants::skip)] // Impractical to test that stuff stops happening.
    fn drop(&mut self) {
        if thread::panicking() {
            // If the thread is panicking, we are probably in a dirty state and shutting down
            // may make the problem worse by hiding the original panic, so just do nothing.
            return;
        }

        for tx in self.command_txs.drain(..) {
            // A worker that already exited has nothing left to shut down.
            drop(tx.send(Command::Shutdown));
        }

        for handle in self.join_handles.drain(..) {
            drop(handle.join());
        }
    }
}

enum Command {
    Execute(Box<dyn FnOnce() + Send>),
    Shutdown,
}

#[cfg_attr(test, mutants::skip)] // Impractical to test that things do not happen when worker function is missing.
fn worker_entrypoint(rx: &mpsc::Receiver<Command>) {
    while let Ok(Command::Execute(f)) = rx.recv() {
        f();
    }
}

/// Splits `len` items into `parts` contiguous ranges whose sizes differ by at most one.
///
/// Earlier ranges receive the extra items. Some ranges are empty if `len < parts`.
///
/// # Examples
///
/// ```
/// use std::num::NonZero;
///
/// use task_kernels::chunk_ranges;
///
/// let ranges = chunk_ranges(10, NonZero::new(4).unwrap());
/// assert_eq!(ranges, vec![0..3, 3..6, 6..8, 8..10]);
/// ```
#[must_use]
pub fn chunk_ranges(len: usize, parts: NonZero<usize>) -> Vec<Range<usize>> {
    let (base, remainder) = len.div_rem(&parts.get());

    let mut start = 0_usize;

    (0..parts.get())
        .map(|part| {
            let size = if part < remainder {
                base.wrapping_add(1)
            } else {
                base
            };

            let range = start..start.wrapping_add(size);
            start = range.end;
            range
        })
        .collect()
}

#[cfg(test)]
#[cfg(not(miri))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::Arc;
    use std::sync::atomic::{self, AtomicBool, AtomicUsize};
    use std::time::Duration;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(ThreadPool: Send);

    #[test]
    fn smoke_test_all() {
        let mut pool = ThreadPool::default();
        let expected_thread_count = pool.thread_count().get();

        let counter = Arc::new(AtomicUsize::new(0));

        pool.broadcast({
            let counter = Arc::clone(&counter);
            move |_| {
                counter.fetch_add(1, atomic::Ordering::SeqCst);
            }
        });

        assert_eq!(
            counter.load(atomic::Ordering::SeqCst),
            expected_thread_count
        );
    }

    #[test]
    fn results_are_in_worker_order() {
        let mut pool = ThreadPool::new(NonZero::new(4).unwrap());

        let results = pool.broadcast(|worker_index| worker_index * 10);

        assert_eq!(&*results, &[0, 10, 20, 30]);
    }

    #[test]
    fn borrows_caller_data() {
        let mut pool = ThreadPool::new(NonZero::new(2).unwrap());
        let values = vec![1_u64, 2, 3, 4, 5, 6];
        let ranges = chunk_ranges(values.len(), pool.thread_count());

        let sums = pool.broadcast(|worker_index| {
            values[ranges[worker_index].clone()].iter().sum::<u64>()
        });

        assert_eq!(&*sums, &[6, 15]);
    }

    #[test]
    fn worker_panic_waits_for_other_workers() {
        let mut pool = ThreadPool::new(NonZero::new(2).unwrap());
        let owned = vec![1_u64, 2, 3];
        let finished = Arc::new(AtomicBool::new(false));

        panic::catch_unwind(AssertUnwindSafe(|| {
            pool.broadcast({
                let owned = &owned;
                let finished = Arc::clone(&finished);
                move |worker_index| {
                    assert_ne!(worker_index, 0, "worker 0 fails");

                    thread::sleep(Duration::from_millis(200));
                    assert_eq!(owned.iter().sum::<u64>(), 6);
                    finished.store(true, atomic::Ordering::SeqCst);
                }
            });
        }))
        .unwrap_err();

        // The failure only surfaces once the surviving worker let go of the borrow.
        assert!(finished.load(atomic::Ordering::SeqCst));
        drop(owned);
    }

    #[test]
    fn pool_is_reusable() {
        let mut pool = ThreadPool::new(NonZero::new(2).unwrap());

        for round in 0..5_usize {
            let results = pool.broadcast(move |worker_index| worker_index + round);
            assert_eq!(&*results, &[round, round + 1]);
        }
    }

    #[test]
    fn chunk_ranges_cover_everything() {
        let ranges = chunk_ranges(7, NonZero::new(3).unwrap());
        assert_eq!(ranges, vec![0..3, 3..5, 5..7]);
    }

    #[test]
    fn chunk_ranges_with_more_parts_than_items() {
        let ranges = chunk_ranges(2, NonZero::new(4).unwrap());
        assert_eq!(ranges, vec![0..1, 1..2, 2..2, 2..2]);
    }

    #[test]
    fn chunk_ranges_of_nothing() {
        let ranges = chunk_ranges(0, NonZero::new(2).unwrap());
        assert_eq!(ranges, vec![0..0, 0..0]);
    }
}
