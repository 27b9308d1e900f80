use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation handle shared between the control thread and
/// worker pools. Workers observe it at their next safe point (between
/// generation attempts, between evaluations); it does not preempt
/// in-flight work.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Capability a parallel backend must provide so the Generator and
/// Evaluator can be written against the abstraction rather than a concrete
/// pool. `shac` ships [`ThreadWorkerPool`]; an OS-process backend could
/// implement the same trait (see SPEC_FULL.md §4.5 for why one isn't
/// shipped here).
pub trait WorkerPool: Send + Sync {
    /// Runs `task` once per index in `0..count`, in parallel, returning
    /// results in index order regardless of completion order.
    fn run_indexed<T, F>(&self, count: usize, task: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Send + Sync;

    fn worker_count(&self) -> usize;
}

/// Default backend: a dedicated `rayon::ThreadPool`, sized independently of
/// the global rayon pool so the Generator and Evaluator can each pick their
/// own degree of parallelism.
pub struct ThreadWorkerPool {
    pool: rayon::ThreadPool,
    size: usize,
}

impl ThreadWorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(size)
            .build()
            .expect("rayon thread pool should be constructible");
        Self { pool, size }
    }
}

impl WorkerPool for ThreadWorkerPool {
    fn run_indexed<T, F>(&self, count: usize, task: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Send + Sync,
    {
        use rayon::prelude::*;
        self.pool
            .install(|| (0..count).into_par_iter().map(task).collect())
    }

    fn worker_count(&self) -> usize {
        self.size
    }
}

/// Resolves the effective parallelism cap: `SHAC_MAX_PARALLELISM` if set and
/// parseable, otherwise the probed hardware parallelism. Warns and clamps
/// when a caller-requested count exceeds the cap.
pub fn resolve_parallelism(requested: usize) -> usize {
    let cap = std::env::var("SHAC_MAX_PARALLELISM")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or_else(num_cpus::get);
    let cap = cap.max(1);
    if requested > cap {
        log::warn!(
            "requested parallelism {requested} exceeds available cap {cap}; reducing to {cap}"
        );
        cap
    } else {
        requested.max(1)
    }
}
