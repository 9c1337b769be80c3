use crate::template::DataFetchTemplate;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Number, Value as JsonValue};
use std::{fmt, sync::Arc};
use thiserror::Error;

/// Result type returned by compute functions.
pub type ComputeResult<T> = Result<T, ComputeError>;

/// A pure function from the fetched parent data to a derived field value.
pub type ComputeFn = Arc<dyn Fn(&JsonValue) -> ComputeResult<JsonValue> + Send + Sync>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ComputeError {
    #[error("Cannot compute `{aggregate}` of `{path}`: no values")]
    EmptyAggregation { aggregate: Aggregate, path: String },
    #[error("Fetched data is missing `{0}`")]
    MissingData(String),
    #[error("Value at `{path}` is not numeric: {value}")]
    NotNumeric { path: String, value: String },
    #[error("Integer overflow while computing `{aggregate}` of `{path}`")]
    Overflow { aggregate: Aggregate, path: String },
    #[error("{0}")]
    Custom(String),
    #[error("No compute function registered for `{type_name}.{field_name}`")]
    Unbound {
        type_name: String,
        field_name: String,
    },
}

/// A dotted response-key path such as `repos.nodes.stargazers.totalCount`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn parse(path: &str) -> Option<Self> {
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return None;
        }
        Some(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Collect every value at the end of this path, flattening lists on the way.
    ///
    /// `null` along the path marks absent optional data and is skipped. A key that
    /// is absent from an object means the data was never fetched.
    pub fn collect<'a>(&self, root: &'a JsonValue) -> ComputeResult<Vec<&'a JsonValue>> {
        let mut current = vec![root];

        for (depth, segment) in self.0.iter().enumerate() {
            let mut next = Vec::with_capacity(current.len());
            for value in current {
                descend(value, segment, &mut next).map_err(|_| {
                    ComputeError::MissingData(self.0[..=depth].join("."))
                })?;
            }
            current = next;
        }

        let mut leaves = Vec::with_capacity(current.len());
        for value in current {
            flatten(value, &mut leaves);
        }

        Ok(leaves)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

fn descend<'a>(value: &'a JsonValue, key: &str, out: &mut Vec<&'a JsonValue>) -> Result<(), ()> {
    match value {
        JsonValue::Null => Ok(()),
        JsonValue::Array(items) => {
            for item in items {
                descend(item, key, out)?;
            }
            Ok(())
        }
        JsonValue::Object(map) => match map.get(key) {
            Some(JsonValue::Null) => Ok(()),
            Some(v) => {
                out.push(v);
                Ok(())
            }
            None => Err(()),
        },
        _ => Err(()),
    }
}

fn flatten<'a>(value: &'a JsonValue, out: &mut Vec<&'a JsonValue>) {
    match value {
        JsonValue::Null => {}
        JsonValue::Array(items) => items.iter().for_each(|item| flatten(item, out)),
        other => out.push(other),
    }
}

/// Built-in declarative aggregations over a [`FieldPath`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    Sum,
    Max,
    Min,
    Count,
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Aggregate::Sum => "sum",
            Aggregate::Max => "max",
            Aggregate::Min => "min",
            Aggregate::Count => "count",
        };
        write!(f, "{name}")
    }
}

enum Numbers {
    Ints(Vec<i64>),
    Floats(Vec<f64>),
}

/// The aggregations that reduce numbers.
#[derive(Clone, Copy)]
enum Fold {
    Sum,
    Max,
    Min,
}

impl Fold {
    fn ints(self, path: &FieldPath, values: Vec<i64>) -> ComputeResult<JsonValue> {
        let result = match self {
            Fold::Sum => values
                .into_iter()
                .try_fold(0i64, |acc, v| acc.checked_add(v))
                .ok_or_else(|| ComputeError::Overflow {
                    aggregate: Aggregate::Sum,
                    path: path.to_string(),
                })?,
            Fold::Max => values.into_iter().max().unwrap_or_default(),
            Fold::Min => values.into_iter().min().unwrap_or_default(),
        };

        Ok(JsonValue::from(result))
    }

    fn floats(self, values: Vec<f64>) -> f64 {
        match self {
            Fold::Sum => values.into_iter().sum(),
            Fold::Max => values.into_iter().fold(f64::NEG_INFINITY, f64::max),
            Fold::Min => values.into_iter().fold(f64::INFINITY, f64::min),
        }
    }
}

impl Aggregate {
    /// Apply the aggregation to the values found at `path` under `parent`.
    ///
    /// `count` of no values is `0`; every other aggregation of no values fails with
    /// [`ComputeError::EmptyAggregation`].
    pub fn apply(self, path: &FieldPath, parent: &JsonValue) -> ComputeResult<JsonValue> {
        let leaves = path.collect(parent)?;

        let fold = match self {
            Aggregate::Count => return Ok(JsonValue::from(leaves.len())),
            Aggregate::Sum => Fold::Sum,
            Aggregate::Max => Fold::Max,
            Aggregate::Min => Fold::Min,
        };
        if leaves.is_empty() {
            return Err(ComputeError::EmptyAggregation {
                aggregate: self,
                path: path.to_string(),
            });
        }

        match numbers(path, &leaves)? {
            Numbers::Ints(values) => fold.ints(path, values),
            Numbers::Floats(values) => Ok(float_value(fold.floats(values))),
        }
    }

    /// Wrap this aggregation over `path` as a [`ComputeFn`].
    pub fn compute_fn(self, path: FieldPath) -> ComputeFn {
        Arc::new(move |parent| self.apply(&path, parent))
    }
}

fn numbers(path: &FieldPath, leaves: &[&JsonValue]) -> ComputeResult<Numbers> {
    let not_numeric = |v: &JsonValue| ComputeError::NotNumeric {
        path: path.to_string(),
        value: v.to_string(),
    };

    let ints: Option<Vec<i64>> = leaves.iter().map(|v| v.as_i64()).collect();
    if let Some(ints) = ints {
        return Ok(Numbers::Ints(ints));
    }

    leaves
        .iter()
        .map(|v| v.as_f64().ok_or_else(|| not_numeric(v)))
        .collect::<ComputeResult<Vec<f64>>>()
        .map(Numbers::Floats)
}

fn float_value(value: f64) -> JsonValue {
    Number::from_f64(value)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

/// A derived field with its data-fetch template and compute function resolved.
#[derive(Clone)]
pub struct ComputeBinding {
    pub type_name: String,
    pub field_name: String,
    pub template: Arc<DataFetchTemplate>,
    pub compute: ComputeFn,
}

impl ComputeBinding {
    pub fn compute(&self, parent: &JsonValue) -> ComputeResult<JsonValue> {
        (self.compute)(parent)
    }
}

impl fmt::Debug for ComputeBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeBinding")
            .field("type_name", &self.type_name)
            .field("field_name", &self.field_name)
            .field("template", &self.template.name)
            .finish()
    }
}

struct RegisteredCompute {
    compute: ComputeFn,
    /// Paths the function reads, when known.
    reads: Vec<FieldPath>,
}

/// Compute functions keyed by `(type_name, field_name)`.
#[derive(Default)]
pub struct ComputeRegistry {
    functions: IndexMap<(String, String), RegisteredCompute>,
}

impl fmt::Debug for ComputeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.functions.keys().map(|(t, n)| format!("{t}.{n}")))
            .finish()
    }
}

impl ComputeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, type_name: &str, field_name: &str, compute: F)
    where
        F: Fn(&JsonValue) -> ComputeResult<JsonValue> + Send + Sync + 'static,
    {
        self.functions.insert(
            (type_name.to_string(), field_name.to_string()),
            RegisteredCompute {
                compute: Arc::new(compute),
                reads: Vec::new(),
            },
        );
    }

    /// Register a built-in aggregation. The path is recorded so that it can be
    /// checked against the field's template before the schema is composed.
    pub fn register_aggregate(
        &mut self,
        type_name: &str,
        field_name: &str,
        aggregate: Aggregate,
        path: FieldPath,
    ) {
        self.functions.insert(
            (type_name.to_string(), field_name.to_string()),
            RegisteredCompute {
                compute: aggregate.compute_fn(path.clone()),
                reads: vec![path],
            },
        );
    }

    pub fn get(&self, type_name: &str, field_name: &str) -> Option<ComputeFn> {
        self.entry(type_name, field_name).map(|r| r.compute.clone())
    }

    pub fn reads(&self, type_name: &str, field_name: &str) -> &[FieldPath] {
        self.entry(type_name, field_name)
            .map(|r| r.reads.as_slice())
            .unwrap_or_default()
    }

    pub fn invoke(
        &self,
        type_name: &str,
        field_name: &str,
        parent: &JsonValue,
    ) -> ComputeResult<JsonValue> {
        let registered =
            self.entry(type_name, field_name)
                .ok_or_else(|| ComputeError::Unbound {
                    type_name: type_name.to_string(),
                    field_name: field_name.to_string(),
                })?;

        (registered.compute)(parent)
    }

    fn entry(&self, type_name: &str, field_name: &str) -> Option<&RegisteredCompute> {
        self.functions
            .get(&(type_name.to_string(), field_name.to_string()))
    }
}
