use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::pool::{CancellationToken, WorkerPool};
use crate::value::Sample;

/// The user-supplied scoring function. Called concurrently from multiple
/// workers with a stable `worker_id` for the duration of one epoch; the
/// function is responsible for its own thread-safety.
pub type EvalFn = dyn Fn(usize, &Sample) -> std::result::Result<f64, String> + Send + Sync;

enum EvalFailure {
    Failed(String),
    TimedOut(u128),
}

fn call_with_timeout(
    eval_fn: &Arc<EvalFn>,
    worker_id: usize,
    sample: Arc<Sample>,
    timeout: Option<Duration>,
) -> std::result::Result<f64, EvalFailure> {
    match timeout {
        None => (eval_fn)(worker_id, &sample).map_err(EvalFailure::Failed),
        Some(limit) => {
            let (tx, rx) = mpsc::channel();
            let eval_fn = Arc::clone(eval_fn);
            std::thread::spawn(move || {
                let result = (eval_fn)(worker_id, &sample);
                let _ = tx.send(result);
            });
            let start = Instant::now();
            match rx.recv_timeout(limit) {
                Ok(result) => result.map_err(EvalFailure::Failed),
                Err(_) => Err(EvalFailure::TimedOut(start.elapsed().as_millis())),
            }
        }
    }
}

/// Parallel execution harness for the user scoring function. Owns no state
/// beyond the configured timeout; the worker pool and cancellation token
/// are passed in per batch so the engine controls their lifetimes.
pub struct Evaluator {
    timeout: Option<Duration>,
}

impl Evaluator {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Scores `samples` in parallel, preserving input order in the
    /// returned vector. A single failed or timed-out evaluation fails the
    /// whole batch (the engine halts the epoch per SPEC_FULL.md §7).
    pub fn evaluate_batch<P: WorkerPool>(
        &self,
        pool: &P,
        samples: &[Sample],
        eval_fn: Arc<EvalFn>,
        epoch: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<f64>> {
        let worker_count = pool.worker_count().max(1);
        let timeout = self.timeout;

        let results: Vec<Result<f64>> = pool.run_indexed(samples.len(), |slot_index| {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled { epoch });
            }
            let worker_id = slot_index % worker_count;
            let sample = Arc::new(samples[slot_index].clone());
            call_with_timeout(&eval_fn, worker_id, sample, timeout).map_err(|failure| match failure {
                EvalFailure::Failed(reason) => Error::EvaluationFailed { slot_index, reason },
                EvalFailure::TimedOut(elapsed_ms) => Error::EvaluationTimeout {
                    slot_index,
                    elapsed_ms,
                },
            })
        });

        results.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ThreadWorkerPool;
    use crate::value::Value;

    fn sample_set(n: usize) -> Vec<Sample> {
        (0..n).map(|i| Sample(vec![Value::Real(i as f64)])).collect()
    }

    #[test]
    fn evaluates_in_input_order() {
        let evaluator = Evaluator::new(None);
        let pool = ThreadWorkerPool::new(4);
        let cancel = CancellationToken::new();
        let eval_fn: Arc<EvalFn> =
            Arc::new(|_worker, sample: &Sample| Ok(sample.get(0).unwrap().as_real().unwrap() * 2.0));
        let scores = evaluator
            .evaluate_batch(&pool, &sample_set(10), eval_fn, 0, &cancel)
            .unwrap();
        assert_eq!(scores, (0..10).map(|i| i as f64 * 2.0).collect::<Vec<_>>());
    }

    #[test]
    fn propagates_evaluation_failure() {
        let evaluator = Evaluator::new(None);
        let pool = ThreadWorkerPool::new(2);
        let cancel = CancellationToken::new();
        let eval_fn: Arc<EvalFn> = Arc::new(|_worker, sample: &Sample| {
            if sample.get(0).unwrap().as_real().unwrap() == 3.0 {
                Err("boom".to_string())
            } else {
                Ok(0.0)
            }
        });
        let err = evaluator
            .evaluate_batch(&pool, &sample_set(5), eval_fn, 2, &cancel)
            .unwrap_err();
        assert!(matches!(err, Error::EvaluationFailed { .. }));
    }

    #[test]
    fn times_out_slow_evaluations() {
        let evaluator = Evaluator::new(Some(Duration::from_millis(20)));
        let pool = ThreadWorkerPool::new(2);
        let cancel = CancellationToken::new();
        let eval_fn: Arc<EvalFn> = Arc::new(|_worker, _sample: &Sample| {
            std::thread::sleep(Duration::from_millis(200));
            Ok(0.0)
        });
        let err = evaluator
            .evaluate_batch(&pool, &sample_set(1), eval_fn, 0, &cancel)
            .unwrap_err();
        assert!(matches!(err, Error::EvaluationTimeout { .. }));
    }
}
