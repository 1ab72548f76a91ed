// Job Arguments & Argument Schemas

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Scalar argument value
///
/// Untagged so that `{"name": "Dany", "count": 3}` maps naturally.
/// Variant order matters: integers must be tried before floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl ArgValue {
    pub fn kind(&self) -> ArgKind {
        match self {
            ArgValue::Bool(_) => ArgKind::Bool,
            ArgValue::Int(_) => ArgKind::Int,
            ArgValue::Float(_) => ArgKind::Float,
            ArgValue::String(_) => ArgKind::String,
        }
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        ArgValue::String(s.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        ArgValue::String(s)
    }
}

impl From<i64> for ArgValue {
    fn from(v: i64) -> Self {
        ArgValue::Int(v)
    }
}

impl From<f64> for ArgValue {
    fn from(v: f64) -> Self {
        ArgValue::Float(v)
    }
}

impl From<bool> for ArgValue {
    fn from(v: bool) -> Self {
        ArgValue::Bool(v)
    }
}

/// Kind of an argument value, used by schemas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgKind {
    Bool,
    Int,
    Float,
    String,
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgKind::Bool => write!(f, "bool"),
            ArgKind::Int => write!(f, "int"),
            ArgKind::Float => write!(f, "float"),
            ArgKind::String => write!(f, "string"),
        }
    }
}

/// Ordered, immutable-after-enqueue argument map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobArgs(BTreeMap<String, ArgValue>);

impl JobArgs {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&ArgValue> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// String argument, `Validation` if missing or not a string
    pub fn str(&self, key: &str) -> Result<&str> {
        match self.0.get(key) {
            Some(ArgValue::String(s)) => Ok(s),
            Some(other) => Err(mismatch(key, ArgKind::String, other.kind())),
            None => Err(missing(key)),
        }
    }

    pub fn i64(&self, key: &str) -> Result<i64> {
        match self.0.get(key) {
            Some(ArgValue::Int(v)) => Ok(*v),
            Some(other) => Err(mismatch(key, ArgKind::Int, other.kind())),
            None => Err(missing(key)),
        }
    }

    /// Float argument; integers are widened
    pub fn f64(&self, key: &str) -> Result<f64> {
        match self.0.get(key) {
            Some(ArgValue::Float(v)) => Ok(*v),
            Some(ArgValue::Int(v)) => Ok(*v as f64),
            Some(other) => Err(mismatch(key, ArgKind::Float, other.kind())),
            None => Err(missing(key)),
        }
    }

    pub fn bool(&self, key: &str) -> Result<bool> {
        match self.0.get(key) {
            Some(ArgValue::Bool(v)) => Ok(*v),
            Some(other) => Err(mismatch(key, ArgKind::Bool, other.kind())),
            None => Err(missing(key)),
        }
    }
}

impl<K: Into<String>, V: Into<ArgValue>> FromIterator<(K, V)> for JobArgs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

fn missing(key: &str) -> AppError {
    AppError::Validation(format!("missing required argument '{}'", key))
}

fn mismatch(key: &str, expected: ArgKind, actual: ArgKind) -> AppError {
    AppError::Validation(format!(
        "argument '{}' must be {}, got {}",
        key, expected, actual
    ))
}

/// Required-argument schema for one job type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArgSchema {
    required: Vec<(String, ArgKind)>,
}

impl ArgSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, key: impl Into<String>, kind: ArgKind) -> Self {
        self.required.push((key.into(), kind));
        self
    }

    pub fn require_str(self, key: impl Into<String>) -> Self {
        self.require(key, ArgKind::String)
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
    }

    /// Check that every required key is present with the right kind.
    ///
    /// Reports the first offending key. Empty strings count as missing for
    /// `String` arguments.
    pub fn validate(&self, args: &JobArgs) -> Result<()> {
        for (key, kind) in &self.required {
            match kind {
                ArgKind::String => {
                    if args.str(key)?.is_empty() {
                        return Err(missing(key));
                    }
                }
                ArgKind::Int => {
                    args.i64(key)?;
                }
                ArgKind::Float => {
                    args.f64(key)?;
                }
                ArgKind::Bool => {
                    args.bool(key)?;
                }
            }
        }
        Ok(())
    }
}
