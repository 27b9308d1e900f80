use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::classifier::{cascade_accepts, CascadeEntry, Classifier, DecisionTreeEnsemble};
use crate::dataset::{folds_are_discriminative, labels_of, stratified_kfold, threshold_of, Dataset, Objective};
use crate::error::{Error, Result};
use crate::evaluator::{EvalFn, Evaluator};
use crate::generator::Generator;
use crate::param::ParameterSpace;
use crate::persist::atomic_write;
use crate::pool::{resolve_parallelism, CancellationToken, ThreadWorkerPool};
use crate::value::Sample;

const ENGINE_VERSION: &str = "1";
const NUM_TREES: usize = 11;
/// Epoch marker used when deriving generation seeds for `predict`, kept
/// apart from real training epochs so predictions stay reproducible
/// regardless of how many epochs have since been trained.
const PREDICT_EPOCH: usize = usize::MAX;

fn default_max_classifiers() -> usize {
    18
}

fn default_generation_attempt_cap() -> usize {
    10_000
}

/// Everything the engine needs to know up front. Mirrors SPEC_FULL.md §4.6;
/// `seed: None` means "pick one at construction time and remember it", not
/// "reseed every call".
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    pub total_budget: usize,
    pub num_batches: usize,
    pub objective: Objective,
    #[serde(default = "default_max_classifiers")]
    pub max_classifiers: usize,
    pub skip_cv_checks: bool,
    pub early_stop: bool,
    pub relax_checks: bool,
    pub seed: Option<u64>,
    #[serde(default = "default_generation_attempt_cap")]
    pub generation_attempt_cap: usize,
    pub max_classifiers_for_predict: Option<usize>,
    pub parallelism: Option<usize>,
    #[serde(default)]
    pub eval_timeout_ms: Option<u64>,
}

impl EngineConfig {
    pub fn new(total_budget: usize, num_batches: usize, objective: Objective) -> Self {
        Self {
            total_budget,
            num_batches,
            objective,
            max_classifiers: default_max_classifiers(),
            skip_cv_checks: false,
            early_stop: false,
            relax_checks: false,
            seed: None,
            generation_attempt_cap: default_generation_attempt_cap(),
            max_classifiers_for_predict: None,
            parallelism: None,
            eval_timeout_ms: None,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.total_budget == 0 {
            return Err(Error::InvalidConfig {
                reason: "total_budget must be > 0".to_string(),
            });
        }
        if self.num_batches == 0 {
            return Err(Error::InvalidConfig {
                reason: "num_batches must be > 0".to_string(),
            });
        }
        Ok(())
    }

    fn eval_timeout(&self) -> Option<Duration> {
        self.eval_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HaltReason {
    GeneratorExhausted,
    EvaluationFailed,
    EvaluationTimeout,
    Cancelled,
    EarlyStop,
}

/// Summary of one `fit` call, returned instead of a bare `()` so callers can
/// tell a clean budget exhaustion apart from a halt partway through.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FitOutcome {
    pub epochs_completed: usize,
    pub cascade_len: usize,
    pub halted: Option<HaltReason>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct CascadeMeta {
    training_size: usize,
    validation_score: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Meta {
    engine_version: String,
    epoch: usize,
    config: EngineConfig,
    resolved_seed: u64,
    cascade: Vec<CascadeMeta>,
}

/// Orchestrates the generate -> evaluate -> label -> train -> persist
/// epoch loop. Owns the parameter space, the dataset, and the classifier
/// cascade; the checkpoint directory is passed in at `fit`/`save` time
/// rather than held as ambient process state.
pub struct Engine {
    config: EngineConfig,
    resolved_seed: u64,
    space: Arc<ParameterSpace>,
    dataset: Dataset,
    cascade: Vec<CascadeEntry>,
    epoch: usize,
}

enum ClassifierOutcome {
    Added(CascadeEntry),
    Skipped,
    Rejected,
}

impl Engine {
    pub fn new(space: ParameterSpace, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        if config.total_budget % config.num_batches != 0 {
            log::warn!(
                "BudgetMisconfigured: num_batches ({}) does not evenly divide total_budget ({}); \
                 final epoch will be truncated to {} samples",
                config.num_batches,
                config.total_budget,
                config.total_budget % config.num_batches
            );
        }
        let resolved_seed = config
            .seed
            .unwrap_or_else(|| SmallRng::from_entropy().next_u64());
        Ok(Self {
            config,
            resolved_seed,
            space: Arc::new(space),
            dataset: Dataset::new(),
            cascade: Vec::new(),
            epoch: 0,
        })
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn cascade_len(&self) -> usize {
        self.cascade.len()
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Number of epochs `fit` will run to exhaust `total_budget`. When
    /// `num_batches` does not evenly divide `total_budget` this is the
    /// ceiling, not the floor: the final epoch is truncated to whatever
    /// budget remains rather than being dropped (see `BudgetMisconfigured`
    /// in SPEC_FULL.md §7 and the `total_budget < num_batches` boundary
    /// case in §8, which requires exactly one truncated epoch rather than
    /// zero).
    pub fn num_epochs(&self) -> usize {
        let total = self.config.total_budget;
        let per = self.config.num_batches;
        (total + per - 1) / per
    }

    /// Trains until the budget is spent or the engine halts, checkpointing
    /// to `checkpoint_dir` at the end of every completed epoch.
    pub fn fit(
        &mut self,
        eval_fn: Arc<EvalFn>,
        checkpoint_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<FitOutcome> {
        fs::create_dir_all(checkpoint_dir).map_err(|source| Error::PersistenceFailed {
            path: checkpoint_dir.to_path_buf(),
            source,
        })?;
        fs::create_dir_all(checkpoint_dir.join("classifiers")).map_err(|source| {
            Error::PersistenceFailed {
                path: checkpoint_dir.join("classifiers"),
                source,
            }
        })?;

        let requested_parallelism = self.config.parallelism.unwrap_or_else(num_cpus::get);
        let parallelism = resolve_parallelism(requested_parallelism);
        let generation_pool = ThreadWorkerPool::new(parallelism);
        let eval_pool = ThreadWorkerPool::new(parallelism.min(self.config.num_batches).max(1));
        let generator = Generator::new(Arc::clone(&self.space), self.config.generation_attempt_cap);
        let evaluator = Evaluator::new(self.config.eval_timeout());

        let num_epochs = self.num_epochs();
        let mut halted = None;

        while self.epoch < num_epochs {
            if cancel.is_cancelled() {
                halted = Some(HaltReason::Cancelled);
                break;
            }
            let remaining = self.config.total_budget.saturating_sub(self.dataset.len());
            let batch_size = remaining.min(self.config.num_batches);
            log::info!(
                "epoch {} starting (cascade len = {}, batch size = {batch_size})",
                self.epoch,
                self.cascade.len()
            );

            let batch = match generator.generate_batch(
                &generation_pool,
                &self.cascade,
                batch_size,
                self.resolved_seed,
                self.epoch,
                cancel,
            ) {
                Ok(batch) => batch,
                Err(Error::GeneratorExhausted { .. }) => {
                    log::error!("epoch {}: generator exhausted, halting", self.epoch);
                    halted = Some(HaltReason::GeneratorExhausted);
                    break;
                }
                Err(Error::Cancelled { .. }) => {
                    halted = Some(HaltReason::Cancelled);
                    break;
                }
                Err(other) => return Err(other),
            };

            let scores = match evaluator.evaluate_batch(
                &eval_pool,
                &batch,
                Arc::clone(&eval_fn),
                self.epoch,
                cancel,
            ) {
                Ok(scores) => scores,
                Err(Error::EvaluationFailed { .. }) => {
                    log::error!("epoch {}: evaluation failed, halting", self.epoch);
                    halted = Some(HaltReason::EvaluationFailed);
                    break;
                }
                Err(Error::EvaluationTimeout { .. }) => {
                    log::error!("epoch {}: evaluation timed out, halting", self.epoch);
                    halted = Some(HaltReason::EvaluationTimeout);
                    break;
                }
                Err(Error::Cancelled { .. }) => {
                    halted = Some(HaltReason::Cancelled);
                    break;
                }
                Err(other) => return Err(other),
            };

            let batch_len = batch.len();
            for (sample, score) in batch.into_iter().zip(scores.into_iter()) {
                self.dataset.append(sample, score);
            }

            let (batch_samples, batch_scores) = self.dataset.tail(batch_len);
            let threshold = threshold_of(batch_scores, 0.5, self.config.objective);
            let labels = labels_of(batch_scores, threshold, self.config.objective);
            let encoded_rows: Vec<Vec<f64>> = batch_samples.iter().map(|s| self.space.encode(s)).collect();

            log::info!(
                "epoch {}: threshold={threshold:.6}, accepted={}/{}",
                self.epoch,
                labels.iter().filter(|&&l| l).count(),
                labels.len()
            );

            let mut triggers_early_stop = false;
            if self.cascade.len() < self.config.max_classifiers {
                match self.try_train_classifier(&encoded_rows, &labels) {
                    ClassifierOutcome::Added(entry) => {
                        log::info!("epoch {}: classifier added, cascade len = {}", self.epoch, entry.version + 1);
                        self.cascade.push(entry);
                    }
                    ClassifierOutcome::Skipped => {
                        log::warn!("epoch {}: classifier skipped (ClassifierUntrainable)", self.epoch);
                        triggers_early_stop = self.config.early_stop;
                    }
                    ClassifierOutcome::Rejected => {
                        log::warn!("epoch {}: classifier rejected (CascadeStalled)", self.epoch);
                        triggers_early_stop = self.config.early_stop;
                    }
                }
            }

            self.epoch += 1;
            self.checkpoint(checkpoint_dir)?;

            if triggers_early_stop {
                halted = Some(HaltReason::EarlyStop);
                break;
            }
        }

        Ok(FitOutcome {
            epochs_completed: self.epoch,
            cascade_len: self.cascade.len(),
            halted,
        })
    }

    fn try_train_classifier(&self, rows: &[Vec<f64>], labels: &[bool]) -> ClassifierOutcome {
        // SPEC_FULL.md §4.3: skip training entirely if either label has
        // fewer than 2 samples in the batch, independent of what
        // `DecisionTreeEnsemble::fit` itself would do with that input.
        let accepted = labels.iter().filter(|&&l| l).count();
        let rejected = labels.iter().filter(|&&l| !l).count();
        if accepted < 2 || rejected < 2 {
            return ClassifierOutcome::Skipped;
        }

        if !self.config.skip_cv_checks {
            let k = 5.min(rows.len()).max(1);
            let folds = stratified_kfold(labels, k, self.resolved_seed ^ self.epoch as u64);
            if !folds_are_discriminative(labels, &folds) {
                return ClassifierOutcome::Skipped;
            }
        }

        let train_seed = self.resolved_seed ^ ((self.epoch as u64).wrapping_mul(0x9E3779B1));
        let model = match DecisionTreeEnsemble::fit(rows, labels, train_seed, NUM_TREES) {
            Some(model) => model,
            None => return ClassifierOutcome::Skipped,
        };
        let model: Arc<dyn Classifier> = Arc::new(model);

        let accepted_indices: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, &label)| label)
            .map(|(i, _)| i)
            .collect();
        let gate_passes = accepted_indices
            .iter()
            .any(|&i| cascade_accepts(&self.cascade, &rows[i]) && model.predict(&rows[i]));

        if !gate_passes && !self.config.relax_checks {
            return ClassifierOutcome::Rejected;
        }

        ClassifierOutcome::Added(CascadeEntry {
            version: self.cascade.len(),
            training_size: rows.len(),
            validation_score: None,
            model,
        })
    }

    /// Draws `n` samples through the Generator using the (optionally
    /// truncated) current cascade. Pure: does not touch the dataset or
    /// mutate the cascade, and is deterministic given the engine's seed.
    pub fn predict(&self, n: usize) -> Result<Vec<Sample>> {
        let cascade_len = self
            .config
            .max_classifiers_for_predict
            .map(|cap| cap.min(self.cascade.len()))
            .unwrap_or(self.cascade.len());
        let cascade = &self.cascade[..cascade_len];

        let parallelism = resolve_parallelism(self.config.parallelism.unwrap_or_else(num_cpus::get));
        let pool = ThreadWorkerPool::new(parallelism);
        let generator = Generator::new(Arc::clone(&self.space), self.config.generation_attempt_cap);
        let cancel = CancellationToken::new();
        generator.generate_batch(&pool, cascade, n, self.resolved_seed, PREDICT_EPOCH, &cancel)
    }

    /// Explicit checkpoint write: `dataset.csv`, `parameters.json`,
    /// `classifiers/cls_<i>.bin`, `meta.json`, each via write-temp-then-
    /// rename.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).map_err(|source| Error::PersistenceFailed {
            path: dir.to_path_buf(),
            source,
        })?;
        fs::create_dir_all(dir.join("classifiers")).map_err(|source| Error::PersistenceFailed {
            path: dir.join("classifiers"),
            source,
        })?;
        self.checkpoint(dir)
    }

    fn checkpoint(&self, dir: &Path) -> Result<()> {
        self.dataset.save(dir, &self.space)?;

        let schema_json = serde_json::to_vec_pretty(self.space.parameters()).map_err(|e| {
            Error::Serialization {
                what: "parameters.json",
                path: dir.join("parameters.json"),
                source: Box::new(e),
            }
        })?;
        atomic_write(&dir.join("parameters.json"), &schema_json)?;

        for (i, entry) in self.cascade.iter().enumerate() {
            let bytes = entry.model.to_bytes()?;
            let path = dir.join("classifiers").join(format!("cls_{:0>4}.bin", i));
            atomic_write(&path, &bytes)?;
        }

        let meta = Meta {
            engine_version: ENGINE_VERSION.to_string(),
            epoch: self.epoch,
            config: self.config.clone(),
            resolved_seed: self.resolved_seed,
            cascade: self
                .cascade
                .iter()
                .map(|entry| CascadeMeta {
                    training_size: entry.training_size,
                    validation_score: entry.validation_score,
                })
                .collect(),
        };
        let meta_json = serde_json::to_vec_pretty(&meta).map_err(|e| Error::Serialization {
            what: "meta.json",
            path: dir.join("meta.json"),
            source: Box::new(e),
        })?;
        atomic_write(&dir.join("meta.json"), &meta_json)?;

        log::debug!("epoch {}: checkpoint written to {}", self.epoch, dir.display());
        Ok(())
    }

    /// Restores an engine from a directory written by [`Engine::save`] or a
    /// `fit` checkpoint. Fails with `SchemaMismatch`/`MissingCheckpointFile`
    /// rather than silently dropping classifiers if the directory is
    /// inconsistent.
    pub fn restore(dir: &Path) -> Result<Self> {
        let meta_path = dir.join("meta.json");
        let meta_bytes = fs::read(&meta_path).map_err(|source| Error::PersistenceFailed {
            path: meta_path.clone(),
            source,
        })?;
        let meta: Meta = serde_json::from_slice(&meta_bytes).map_err(|e| Error::Serialization {
            what: "meta.json",
            path: meta_path,
            source: Box::new(e),
        })?;

        let schema_path = dir.join("parameters.json");
        let schema_bytes = fs::read(&schema_path).map_err(|source| Error::PersistenceFailed {
            path: schema_path.clone(),
            source,
        })?;
        let parameters = serde_json::from_slice(&schema_bytes).map_err(|e| Error::Serialization {
            what: "parameters.json",
            path: schema_path,
            source: Box::new(e),
        })?;
        let space = ParameterSpace::new(parameters)?;

        let dataset = Dataset::load(dir, &space)?;

        let mut cascade = Vec::with_capacity(meta.cascade.len());
        for (i, cascade_meta) in meta.cascade.iter().enumerate() {
            let path = dir.join("classifiers").join(format!("cls_{:0>4}.bin", i));
            if !path.exists() {
                return Err(Error::MissingCheckpointFile {
                    dir: dir.to_path_buf(),
                    path,
                });
            }
            let bytes = fs::read(&path).map_err(|source| Error::PersistenceFailed {
                path: path.clone(),
                source,
            })?;
            let model = DecisionTreeEnsemble::deserialize(&bytes)?;
            cascade.push(CascadeEntry {
                version: i,
                training_size: cascade_meta.training_size,
                validation_score: cascade_meta.validation_score,
                model: Arc::new(model),
            });
        }

        Ok(Self {
            config: meta.config,
            resolved_seed: meta.resolved_seed,
            space: Arc::new(space),
            dataset,
            cascade,
            epoch: meta.epoch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::Parameter;
    use crate::value::Value;

    fn linear_objective() -> Arc<EvalFn> {
        Arc::new(|_worker, sample: &Sample| {
            let x = sample.get(0).unwrap().as_real().unwrap();
            let y = sample.get(1).unwrap().as_real().unwrap();
            Ok(((2.0 * x - y) - 4.0).powi(2))
        })
    }

    #[test]
    fn fit_consumes_exact_budget() {
        let space = ParameterSpace::new(vec![
            Parameter::uniform("x", -5.0, 5.0),
            Parameter::uniform("y", -2.0, 2.0),
        ])
        .unwrap();
        let mut config = EngineConfig::new(40, 10, Objective::Min);
        config.skip_cv_checks = true;
        config.seed = Some(0);
        let mut engine = Engine::new(space, config).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let outcome = engine
            .fit(linear_objective(), dir.path(), &CancellationToken::new())
            .unwrap();
        assert_eq!(outcome.halted, None);
        assert_eq!(engine.dataset().len(), 40);
        assert!(engine.cascade_len() <= 18);
        assert!(engine.cascade_len() <= outcome.epochs_completed);
    }

    #[test]
    fn singleton_minority_label_skips_classifier_training() {
        let space = ParameterSpace::new(vec![Parameter::uniform("x", 0.0, 1.0)]).unwrap();
        let mut config = EngineConfig::new(10, 10, Objective::Min);
        config.skip_cv_checks = true;
        config.relax_checks = true;
        config.seed = Some(6);
        let engine = Engine::new(space, config).unwrap();

        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64 / 10.0]).collect();
        let mut labels = vec![true; 10];
        labels[0] = false; // exactly one rejected sample, nine accepted
        assert!(matches!(
            engine.try_train_classifier(&rows, &labels),
            ClassifierOutcome::Skipped
        ));
    }

    #[test]
    fn sub_batch_budget_runs_one_truncated_epoch() {
        let space = ParameterSpace::new(vec![Parameter::uniform("x", -5.0, 5.0)]).unwrap();
        let mut config = EngineConfig::new(5, 10, Objective::Min);
        config.skip_cv_checks = true;
        config.seed = Some(2);
        assert_eq!(config.num_batches, 10);
        let mut engine = Engine::new(space, config).unwrap();
        assert_eq!(engine.num_epochs(), 1);
        let dir = tempfile::tempdir().unwrap();
        let eval_fn: Arc<EvalFn> =
            Arc::new(|_w, sample: &Sample| Ok(sample.get(0).unwrap().as_real().unwrap()));
        let outcome = engine.fit(eval_fn, dir.path(), &CancellationToken::new()).unwrap();
        assert_eq!(outcome.halted, None);
        assert_eq!(outcome.epochs_completed, 1);
        assert_eq!(engine.dataset().len(), 5);
    }

    #[test]
    fn uneven_budget_truncates_final_epoch_only() {
        let space = ParameterSpace::new(vec![Parameter::uniform("x", -5.0, 5.0)]).unwrap();
        let mut config = EngineConfig::new(23, 10, Objective::Min);
        config.skip_cv_checks = true;
        config.seed = Some(4);
        let mut engine = Engine::new(space, config).unwrap();
        assert_eq!(engine.num_epochs(), 3);
        let dir = tempfile::tempdir().unwrap();
        let eval_fn: Arc<EvalFn> =
            Arc::new(|_w, sample: &Sample| Ok(sample.get(0).unwrap().as_real().unwrap()));
        let outcome = engine.fit(eval_fn, dir.path(), &CancellationToken::new()).unwrap();
        assert_eq!(outcome.halted, None);
        assert_eq!(outcome.epochs_completed, 3);
        assert_eq!(engine.dataset().len(), 23);
    }

    #[test]
    fn max_classifiers_caps_cascade_growth() {
        let space = ParameterSpace::new(vec![Parameter::uniform("x", -5.0, 5.0)]).unwrap();
        let mut config = EngineConfig::new(100, 10, Objective::Min);
        config.skip_cv_checks = true;
        config.relax_checks = true;
        config.max_classifiers = 3;
        config.seed = Some(1);
        let mut engine = Engine::new(space, config).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let eval_fn: Arc<EvalFn> = Arc::new(|_w, sample: &Sample| {
            Ok(sample.get(0).unwrap().as_real().unwrap())
        });
        let outcome = engine.fit(eval_fn, dir.path(), &CancellationToken::new()).unwrap();
        assert_eq!(outcome.epochs_completed, 10);
        assert_eq!(engine.cascade_len(), 3);
        assert_eq!(engine.dataset().len(), 100);
    }

    #[test]
    fn save_restore_round_trip_predicts_identically() {
        let space = ParameterSpace::new(vec![Parameter::uniform("x", -5.0, 5.0)]).unwrap();
        let mut config = EngineConfig::new(50, 10, Objective::Min);
        config.skip_cv_checks = true;
        config.seed = Some(3);
        let mut engine = Engine::new(space, config).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let eval_fn: Arc<EvalFn> = Arc::new(|_w, sample: &Sample| {
            Ok(sample.get(0).unwrap().as_real().unwrap().abs())
        });
        engine.fit(eval_fn, dir.path(), &CancellationToken::new()).unwrap();

        let restored = Engine::restore(dir.path()).unwrap();
        assert_eq!(restored.cascade_len(), engine.cascade_len());
        assert_eq!(restored.dataset().len(), engine.dataset().len());
        assert_eq!(restored.predict(20).unwrap(), engine.predict(20).unwrap());
    }

    #[test]
    fn predict_is_pure_and_deterministic() {
        let space = ParameterSpace::new(vec![Parameter::discrete(
            "v",
            vec![Value::Int(0), Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)],
        )])
        .unwrap();
        let mut config = EngineConfig::new(1, 1, Objective::Min);
        config.seed = Some(5);
        let engine = Engine::new(space, config).unwrap();
        let a = engine.predict(10).unwrap();
        let b = engine.predict(10).unwrap();
        assert_eq!(a, b);
        assert_eq!(engine.dataset().len(), 0);
        assert_eq!(engine.cascade_len(), 0);
    }

    #[test]
    fn halts_on_evaluation_failure_and_persists_completed_epochs() {
        let space = ParameterSpace::new(vec![Parameter::uniform("x", 0.0, 1.0)]).unwrap();
        let mut config = EngineConfig::new(30, 10, Objective::Min);
        config.skip_cv_checks = true;
        config.seed = Some(9);
        let mut engine = Engine::new(space, config).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let eval_fn: Arc<EvalFn> = Arc::new(move |_w, sample: &Sample| {
            let n = calls_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n >= 16 {
                Err("boom".to_string())
            } else {
                Ok(sample.get(0).unwrap().as_real().unwrap())
            }
        });
        let outcome = engine.fit(eval_fn, dir.path(), &CancellationToken::new()).unwrap();
        assert_eq!(outcome.halted, Some(HaltReason::EvaluationFailed));
        assert_eq!(outcome.epochs_completed, 1);
        assert_eq!(engine.dataset().len(), 10);

        let restored = Engine::restore(dir.path()).unwrap();
        assert_eq!(restored.dataset().len(), 10);
    }
}
