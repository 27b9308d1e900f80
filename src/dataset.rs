use std::path::Path;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::param::{Parameter, ParameterSpace};
use crate::persist::atomic_write;
use crate::value::{Sample, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    Min,
    Max,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoreStats {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

/// Linear-interpolated p-quantile of `scores` (not modified in place).
/// Returns `0.0` for an empty slice — callers never call this on an empty
/// batch since the engine always generates at least one sample per epoch.
pub fn quantile(scores: &[f64], p: f64) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

/// The acceptance threshold for a batch of `scores` under `objective`, at
/// acceptance fraction `p`. For `Min`, this is the p-quantile (accept iff
/// score <= threshold); for `Max`, the (1-p)-quantile (accept iff score >=
/// threshold).
pub fn threshold_of(scores: &[f64], p: f64, objective: Objective) -> f64 {
    match objective {
        Objective::Min => quantile(scores, p),
        Objective::Max => quantile(scores, 1.0 - p),
    }
}

pub fn labels_of(scores: &[f64], threshold: f64, objective: Objective) -> Vec<bool> {
    scores
        .iter()
        .map(|&s| match objective {
            Objective::Min => s <= threshold,
            Objective::Max => s >= threshold,
        })
        .collect()
}

/// Stratified k-fold split of `labels`: each class is shuffled
/// independently under `seed` and distributed round-robin across folds, so
/// folds stay balanced and the split is reproducible.
pub fn stratified_kfold(labels: &[bool], k: usize, seed: u64) -> Vec<(Vec<usize>, Vec<usize>)> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut by_class: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
    for (i, &label) in labels.iter().enumerate() {
        by_class[label as usize].push(i);
    }
    for class in &mut by_class {
        for i in (1..class.len()).rev() {
            let j = rng.gen_range(0..=i);
            class.swap(i, j);
        }
    }

    let mut folds: Vec<Vec<usize>> = vec![Vec::new(); k];
    for class in &by_class {
        for (i, &idx) in class.iter().enumerate() {
            folds[i % k].push(idx);
        }
    }

    (0..k)
        .map(|i| {
            let val_idx = folds[i].clone();
            let train_idx = folds
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .flat_map(|(_, f)| f.iter().copied())
                .collect();
            (train_idx, val_idx)
        })
        .collect()
}

/// Whether every fold of a stratified split has both classes represented in
/// its training half (the condition the classifier's CV gate checks).
pub fn folds_are_discriminative(labels: &[bool], folds: &[(Vec<usize>, Vec<usize>)]) -> bool {
    folds.iter().all(|(train_idx, _)| {
        let has_true = train_idx.iter().any(|&i| labels[i]);
        let has_false = train_idx.iter().any(|&i| !labels[i]);
        has_true && has_false
    })
}

/// Append-only store of (sample, score) records, in the order they were
/// evaluated.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    samples: Vec<Sample>,
    scores: Vec<f64>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, sample: Sample, score: f64) {
        self.samples.push(sample);
        self.scores.push(score);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    /// The most recently appended `n` (sample, score) pairs, in append
    /// order. Used by the engine to compute the per-epoch acceptance
    /// threshold over the latest batch only.
    pub fn tail(&self, n: usize) -> (&[Sample], &[f64]) {
        let start = self.samples.len().saturating_sub(n);
        (&self.samples[start..], &self.scores[start..])
    }

    pub fn threshold(&self, p: f64, objective: Objective) -> f64 {
        threshold_of(&self.scores, p, objective)
    }

    pub fn labels(&self, threshold: f64, objective: Objective) -> Vec<bool> {
        labels_of(&self.scores, threshold, objective)
    }

    pub fn score_stats(&self) -> ScoreStats {
        if self.scores.is_empty() {
            return ScoreStats {
                mean: 0.0,
                std_dev: 0.0,
                min: 0.0,
                max: 0.0,
            };
        }
        let n = self.scores.len() as f64;
        let mean = self.scores.iter().sum::<f64>() / n;
        let var = self.scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        ScoreStats {
            mean,
            std_dev: var.sqrt(),
            min: self.scores.iter().cloned().fold(f64::INFINITY, f64::min),
            max: self.scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        }
    }

    /// Writes `dataset.csv`: header row of `space`'s parameter names +
    /// `score`, then one row per record in append order.
    /// Write-temp-then-rename, via the `csv` crate so quoting of
    /// string-valued discrete parameters is handled by a tested writer
    /// rather than a hand-rolled escaper.
    pub fn save(&self, dir: &Path, space: &ParameterSpace) -> Result<()> {
        let path = dir.join("dataset.csv");
        let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());

        let mut header: Vec<String> = space.names().map(str::to_string).collect();
        header.push("score".to_string());
        writer.write_record(&header).map_err(|source| csv_err(&path, source))?;

        for (sample, score) in self.samples.iter().zip(self.scores.iter()) {
            let mut fields: Vec<String> = sample.0.iter().map(Value::to_csv_field).collect();
            fields.push(score.to_string());
            writer.write_record(&fields).map_err(|source| csv_err(&path, source))?;
        }

        let bytes = writer.into_inner().map_err(|source| Error::Serialization {
            what: "dataset.csv",
            path: path.clone(),
            source: Box::new(source.into_error()),
        })?;
        atomic_write(&path, &bytes)
    }

    pub fn load(dir: &Path, space: &ParameterSpace) -> Result<Self> {
        let path = dir.join("dataset.csv");
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&path)
            .map_err(|source| csv_err(&path, source))?;

        let expected_cols = space.arity() + 1;
        let header_len = reader.headers().map_err(|source| csv_err(&path, source))?.len();
        if header_len != expected_cols {
            return Err(Error::SchemaMismatch {
                reason: format!(
                    "dataset.csv header has {header_len} columns, expected {expected_cols}"
                ),
            });
        }

        let mut dataset = Dataset::new();
        for result in reader.records() {
            let record = result.map_err(|source| csv_err(&path, source))?;
            if record.len() != expected_cols {
                return Err(Error::SchemaMismatch {
                    reason: format!(
                        "row {record:?} has {} fields, expected {expected_cols}",
                        record.len()
                    ),
                });
            }
            let values: Result<Vec<Value>> = record
                .iter()
                .take(space.arity())
                .zip(space.parameters())
                .map(|(field, param)| parse_value(field, param))
                .collect();
            let score_field = record.get(space.arity()).unwrap_or("");
            let score: f64 = score_field.parse().map_err(|_| Error::SchemaMismatch {
                reason: format!("score field {score_field:?} is not a real number"),
            })?;
            let sample = Sample(values?);
            if !space.conforms(&sample) {
                return Err(Error::SchemaMismatch {
                    reason: format!("row {record:?} does not conform to the parameter space schema"),
                });
            }
            dataset.append(sample, score);
        }
        Ok(dataset)
    }
}

fn csv_err(path: &Path, source: csv::Error) -> Error {
    Error::Serialization {
        what: "dataset.csv",
        path: path.to_path_buf(),
        source: Box::new(source),
    }
}

fn parse_value(field: &str, param: &Parameter) -> Result<Value> {
    match param {
        Parameter::Discrete { values, .. } => match values.first() {
            Some(Value::Int(_)) => field
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| Error::SchemaMismatch {
                    reason: format!("expected integer for {:?}, got {field:?}", param.name()),
                }),
            Some(Value::Str(_)) | None => Ok(Value::Str(field.to_string())),
            Some(Value::Real(_)) => field
                .parse::<f64>()
                .map(Value::Real)
                .map_err(|_| Error::SchemaMismatch {
                    reason: format!("expected real for {:?}, got {field:?}", param.name()),
                }),
        },
        Parameter::UniformContinuous { .. } | Parameter::NormalContinuous { .. } => field
            .parse::<f64>()
            .map(Value::Real)
            .map_err(|_| Error::SchemaMismatch {
                reason: format!("expected real for {:?}, got {field:?}", param.name()),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_split_is_balanced() {
        let scores: Vec<f64> = (0..11).map(|i| i as f64).collect();
        let threshold = threshold_of(&scores, 0.5, Objective::Min);
        let labels = labels_of(&scores, threshold, Objective::Min);
        let accepted = labels.iter().filter(|&&b| b).count();
        assert!((5..=6).contains(&accepted), "accepted={accepted}");
    }

    #[test]
    fn max_objective_accepts_high_scores() {
        let scores = vec![1.0, 2.0, 3.0, 4.0];
        let threshold = threshold_of(&scores, 0.5, Objective::Max);
        let labels = labels_of(&scores, threshold, Objective::Max);
        assert_eq!(labels, vec![false, false, true, true]);
    }

    #[test]
    fn kfold_is_stratified_and_reproducible() {
        let labels: Vec<bool> = (0..20).map(|i| i % 2 == 0).collect();
        let a = stratified_kfold(&labels, 5, 11);
        let b = stratified_kfold(&labels, 5, 11);
        assert_eq!(a.len(), 5);
        for ((train_a, val_a), (train_b, val_b)) in a.iter().zip(b.iter()) {
            assert_eq!(train_a, train_b);
            assert_eq!(val_a, val_b);
        }
        assert!(folds_are_discriminative(&labels, &a));
    }

    #[test]
    fn save_and_load_round_trip() {
        use crate::param::Parameter;
        let space = ParameterSpace::new(vec![
            Parameter::uniform("x", -5.0, 5.0),
            Parameter::discrete("v", vec![Value::Int(0), Value::Int(1), Value::Int(2)]),
        ])
        .unwrap();
        let mut dataset = Dataset::new();
        dataset.append(Sample(vec![Value::Real(1.5), Value::Int(2)]), 0.25);
        dataset.append(Sample(vec![Value::Real(-3.25), Value::Int(0)]), -1.0);

        let dir = tempfile::tempdir().unwrap();
        dataset.save(dir.path(), &space).unwrap();
        let loaded = Dataset::load(dir.path(), &space).unwrap();
        assert_eq!(loaded.samples(), dataset.samples());
        assert_eq!(loaded.scores(), dataset.scores());
    }
}
