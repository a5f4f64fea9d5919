//! Compares the execution backends of every kernel on inputs of a realistic size.
//!
//! The `compute` groups time only the execute stage, the `pipeline` groups time the full
//! lifecycle including the copies in and out of the descriptor.

#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use criterion::{Criterion, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use task_harness::{Perf, TaskData};
use task_kernels::{
    BatcherSortSeq, BatcherSortThreads, CrsMultiplySeq, CrsMultiplyThreads, GaussianFilterSeq,
    GaussianFilterThreads, MarkComponentsSeq, MarkComponentsThreads,
};

criterion_group!(benches, sort, gaussian, crs, marking);
criterion_main!(benches);

const SORT_LEN: usize = 1 << 16;
const IMAGE_SIDE: usize = 512;
const MATRIX_SIDE: usize = 256;

fn sort(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(1);
    let input: Vec<f64> = (0..SORT_LEN).map(|_| rng.random_range(-1e6..1e6)).collect();
    let mut output = vec![0.0; SORT_LEN];

    let mut group = c.benchmark_group("sort_compute");

    let mut task = BatcherSortSeq::new(TaskData::new().with_input(&input).with_output(&mut output));
    Perf::new(&mut task).bench_task_run(&mut group, "seq");
    drop(task);

    let mut task =
        BatcherSortThreads::new(TaskData::new().with_input(&input).with_output(&mut output));
    Perf::new(&mut task).bench_task_run(&mut group, "threads");
    drop(task);

    group.finish();

    let mut group = c.benchmark_group("sort_pipeline");

    let mut task = BatcherSortSeq::new(TaskData::new().with_input(&input).with_output(&mut output));
    Perf::new(&mut task).bench_pipeline_run(&mut group, "seq");
    drop(task);

    let mut task =
        BatcherSortThreads::new(TaskData::new().with_input(&input).with_output(&mut output));
    Perf::new(&mut task).bench_pipeline_run(&mut group, "threads");
    drop(task);

    group.finish();
}

fn gaussian(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(2);
    let image: Vec<f64> = (0..IMAGE_SIDE * IMAGE_SIDE)
        .map(|_| rng.random_range(0.0..255.0))
        .collect();
    let kernel = [1, 2, 1];
    let mut output = vec![0.0; image.len()];

    let mut group = c.benchmark_group("gaussian_compute");

    let mut task = GaussianFilterSeq::new(
        TaskData::new()
            .with_input(&image)
            .with_input(&kernel)
            .with_output(&mut output),
    );
    Perf::new(&mut task).bench_task_run(&mut group, "seq");
    drop(task);

    let mut task = GaussianFilterThreads::new(
        TaskData::new()
            .with_input(&image)
            .with_input(&kernel)
            .with_output(&mut output),
    );
    Perf::new(&mut task).bench_task_run(&mut group, "threads");
    drop(task);

    group.finish();
}

fn crs(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(3);
    let mut random_sparse = || -> Vec<f64> {
        (0..MATRIX_SIDE * MATRIX_SIDE)
            .map(|_| {
                if rng.random_ratio(1, 20) {
                    rng.random_range(-1.0..1.0)
                } else {
                    0.0
                }
            })
            .collect()
    };

    let a = random_sparse();
    let b = random_sparse();
    let dims = [
        u32::try_from(MATRIX_SIDE).unwrap(),
        u32::try_from(MATRIX_SIDE).unwrap(),
    ];
    let mut output = vec![0.0; MATRIX_SIDE * MATRIX_SIDE];

    let mut group = c.benchmark_group("crs_compute");

    let mut task = CrsMultiplySeq::new(
        TaskData::new()
            .with_input(&a)
            .with_input(&dims)
            .with_input(&b)
            .with_input(&dims)
            .with_output(&mut output),
    );
    Perf::new(&mut task).bench_task_run(&mut group, "seq");
    drop(task);

    let mut task = CrsMultiplyThreads::new(
        TaskData::new()
            .with_input(&a)
            .with_input(&dims)
            .with_input(&b)
            .with_input(&dims)
            .with_output(&mut output),
    );
    Perf::new(&mut task).bench_task_run(&mut group, "threads");
    drop(task);

    group.finish();
}

fn marking(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(4);
    let image: Vec<i32> = (0..IMAGE_SIDE * IMAGE_SIDE)
        .map(|_| i32::from(rng.random_bool(0.4)))
        .collect();
    let dims = [
        u32::try_from(IMAGE_SIDE).unwrap(),
        u32::try_from(IMAGE_SIDE).unwrap(),
    ];
    let mut labels = vec![0; image.len()];

    let mut group = c.benchmark_group("marking_compute");

    let mut task = MarkComponentsSeq::new(
        TaskData::new()
            .with_input(&image)
            .with_input(&dims)
            .with_output(&mut labels),
    );
    Perf::new(&mut task).bench_task_run(&mut group, "seq");
    drop(task);

    let mut task = MarkComponentsThreads::new(
        TaskData::new()
            .with_input(&image)
            .with_input(&dims)
            .with_output(&mut labels),
    );
    Perf::new(&mut task).bench_task_run(&mut group, "threads");
    drop(task);

    group.finish();
}
