#![cfg(any(test, feature = "criterion"))]

use std::num::NonZero;
use std::time::Duration;

use criterion::BenchmarkGroup;
use criterion::measurement::WallTime;

use crate::{MonotonicTimer, Perf, PerfAttr, Task};

impl<T> Perf<'_, T>
where
    T: Task + ?Sized,
{
    /// Benchmarks the execute stage of the task as part of a Criterion benchmark group.
    ///
    /// Every Criterion sample is one compute-only run whose repetition count is the number of
    /// iterations Criterion asks for, so the task is prepared and finalized once per sample.
    ///
    /// # Panics
    ///
    /// Panics if any stage of the task fails, since a failed run has no timing to record.
    #[cfg_attr(test, mutants::skip)] // Criterion owns the measurement loop.
    pub fn bench_task_run(&mut self, group: &mut BenchmarkGroup<'_, WallTime>, name: &str) {
        group.bench_function(name, |b| {
            b.iter_custom(|iters| {
                let Some(repetitions) = NonZero::new(iters) else {
                    return Duration::ZERO;
                };

                let mut attr = PerfAttr::new(repetitions, MonotonicTimer::start());
                let results = self.task_run(&mut attr);

                results.total().unwrap_or_else(|| {
                    panic!("benchmarked task {name} {}", results.disposition())
                })
            });
        });
    }

    /// Benchmarks the full lifecycle of the task as part of a Criterion benchmark group.
    ///
    /// # Panics
    ///
    /// Panics if any stage of the task fails.
    #[cfg_attr(test, mutants::skip)] // Criterion owns the measurement loop.
    pub fn bench_pipeline_run(&mut self, group: &mut BenchmarkGroup<'_, WallTime>, name: &str) {
        group.bench_function(name, |b| {
            b.iter_custom(|iters| {
                let Some(repetitions) = NonZero::new(iters) else {
                    return Duration::ZERO;
                };

                let mut attr = PerfAttr::new(repetitions, MonotonicTimer::start());
                let results = self.pipeline_run(&mut attr);

                results.total().unwrap_or_else(|| {
                    panic!("benchmarked task {name} {}", results.disposition())
                })
            });
        });
    }
}
