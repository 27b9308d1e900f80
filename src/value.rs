use serde::{Deserialize, Serialize};

/// A single parameter value. `Discrete` parameters may carry any of the
/// three variants (but a single parameter's value list is uniformly typed);
/// continuous parameters always produce `Real`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Int(i64),
    Real(f64),
    Str(String),
}

impl Value {
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            Value::Str(_) => None,
        }
    }

    /// Renders the value as a single CSV field's raw text. Quoting of
    /// fields that need it (commas, quotes, embedded newlines) is the
    /// `csv` writer's job, not this method's.
    pub fn to_csv_field(&self) -> String {
        match self {
            Value::Int(i) => i.to_string(),
            Value::Real(r) => r.to_string(),
            Value::Str(s) => s.clone(),
        }
    }
}

/// A joint draw from a [`crate::param::ParameterSpace`], positional against
/// that space's declared parameter order. Two samples are only meaningfully
/// comparable when drawn from the same space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample(pub Vec<Value>);

impl Sample {
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
