use std::collections::HashMap;

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::{Sample, Value};

/// One dimension of the search space. The three kinds share a capability
/// set (`sample`/`encode`/`decode`) dispatched through a match rather than a
/// trait object, since the set of kinds is closed.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Parameter {
    Discrete { name: String, values: Vec<Value> },
    UniformContinuous { name: String, low: f64, high: f64 },
    NormalContinuous { name: String, mean: f64, std_dev: f64 },
}

impl Parameter {
    pub fn discrete(name: impl Into<String>, values: Vec<Value>) -> Self {
        Parameter::Discrete {
            name: name.into(),
            values,
        }
    }

    pub fn uniform(name: impl Into<String>, low: f64, high: f64) -> Self {
        Parameter::UniformContinuous {
            name: name.into(),
            low,
            high,
        }
    }

    pub fn normal(name: impl Into<String>, mean: f64, std_dev: f64) -> Self {
        Parameter::NormalContinuous {
            name: name.into(),
            mean,
            std_dev,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Parameter::Discrete { name, .. } => name,
            Parameter::UniformContinuous { name, .. } => name,
            Parameter::NormalContinuous { name, .. } => name,
        }
    }

    pub fn sample(&self, rng: &mut impl Rng) -> Value {
        match self {
            Parameter::Discrete { values, .. } => {
                let idx = rng.gen_range(0..values.len());
                values[idx].clone()
            }
            Parameter::UniformContinuous { low, high, .. } => Value::Real(rng.gen_range(*low..*high)),
            Parameter::NormalContinuous { mean, std_dev, .. } => {
                let dist = Normal::new(*mean, *std_dev).expect("std_dev must be positive");
                Value::Real(dist.sample(rng))
            }
        }
    }

    /// Deterministic encode. For discrete dims this is the 0-based index of
    /// `value` in the declared list (by value equality); for continuous
    /// dims it is the identity.
    pub fn encode(&self, value: &Value) -> f64 {
        match self {
            Parameter::Discrete { values, .. } => values
                .iter()
                .position(|v| v == value)
                .map(|i| i as f64)
                .unwrap_or(0.0),
            Parameter::UniformContinuous { .. } | Parameter::NormalContinuous { .. } => {
                value.as_real().unwrap_or(0.0)
            }
        }
    }

    /// Inverse of `encode` on numeric dims; for discrete dims rounds to the
    /// nearest valid ordinal index, clamping into range.
    pub fn decode(&self, x: f64) -> Value {
        match self {
            Parameter::Discrete { values, .. } => {
                let last = values.len().saturating_sub(1) as f64;
                let idx = x.round().clamp(0.0, last) as usize;
                values[idx].clone()
            }
            Parameter::UniformContinuous { .. } | Parameter::NormalContinuous { .. } => Value::Real(x),
        }
    }
}

/// Ordered collection of [`Parameter`]s. Immutable after construction and
/// freely shared across workers behind an `Arc`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSpace {
    parameters: Vec<Parameter>,
}

impl ParameterSpace {
    pub fn new(parameters: Vec<Parameter>) -> Result<Self> {
        let mut seen = HashMap::with_capacity(parameters.len());
        for p in &parameters {
            if seen.insert(p.name().to_string(), ()).is_some() {
                return Err(Error::DuplicateParameterName {
                    name: p.name().to_string(),
                });
            }
        }
        Ok(Self { parameters })
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(Parameter::name)
    }

    pub fn sample(&self, rng: &mut impl Rng) -> Sample {
        Sample(self.parameters.iter().map(|p| p.sample(rng)).collect())
    }

    pub fn encode(&self, sample: &Sample) -> Vec<f64> {
        self.parameters
            .iter()
            .zip(sample.0.iter())
            .map(|(p, v)| p.encode(v))
            .collect()
    }

    pub fn decode(&self, row: &[f64]) -> Sample {
        Sample(
            self.parameters
                .iter()
                .zip(row.iter())
                .map(|(p, x)| p.decode(*x))
                .collect(),
        )
    }

    /// Checks that `sample` has one value per declared parameter. Does not
    /// check value domains (a restored dataset row that has drifted in type
    /// is caught by the caller as `SchemaMismatch`).
    pub fn conforms(&self, sample: &Sample) -> bool {
        sample.len() == self.parameters.len()
    }
}
