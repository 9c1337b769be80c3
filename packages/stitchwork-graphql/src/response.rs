use crate::{compute::ComputeError, upstream::UpstreamError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// `extensions.code` of errors caused by selecting a field or type that does not exist.
pub const UNKNOWN_TYPE: &str = "UNKNOWN_TYPE";
/// `extensions.code` of errors raised by a derived field's compute function.
pub const COMPUTATION: &str = "COMPUTATION";
/// `extensions.code` of errors reported by, or while talking to, the upstream API.
pub const UPSTREAM_EXECUTION: &str = "UPSTREAM_EXECUTION";
pub const UPSTREAM_INTROSPECTION: &str = "UPSTREAM_INTROSPECTION";
pub const SCHEMA_COMPOSITION: &str = "SCHEMA_COMPOSITION";
pub const GRAPHQL_PARSE_FAILED: &str = "GRAPHQL_PARSE_FAILED";
pub const GRAPHQL_VALIDATION_FAILED: &str = "GRAPHQL_VALIDATION_FAILED";

/// A GraphQL request as received over HTTP.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl GraphQLRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = Some(variables);
        self
    }

    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(i) => write!(f, "{i}"),
            PathSegment::Key(k) => write!(f, "{k}"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// An entry of a GraphQL response's `errors` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl ResponseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: Vec::new(),
            extensions: None,
        }
    }

    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = path;
        self
    }

    pub fn with_code(mut self, code: &str) -> Self {
        self.extensions
            .get_or_insert_with(Map::new)
            .insert("code".to_string(), Value::String(code.to_string()));
        self
    }

    pub fn code(&self) -> Option<&str> {
        self.extensions
            .as_ref()
            .and_then(|ext| ext.get("code"))
            .and_then(Value::as_str)
    }
}

/// A GraphQL response: resolved data plus partial-failure entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQLResponse {
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ResponseError>,
}

impl GraphQLResponse {
    pub fn from_error(error: ResponseError) -> Self {
        Self {
            data: None,
            errors: vec![error],
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Errors raised while executing a single request.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Could not parse query: {0}")]
    Parse(String),
    #[error("Unknown operation named `{0}`")]
    OperationNotFound(String),
    #[error("Operation name is required when the document contains multiple operations")]
    OperationNameRequired,
    #[error("{0} operations are not supported")]
    UnsupportedOperation(&'static str),
    #[error("Introspection fields cannot be mixed with data fields in one operation")]
    MixedIntrospection,
    #[error("Cannot query field `{field_name}` on type `{type_name}`")]
    UnknownField {
        type_name: String,
        field_name: String,
    },
    #[error("Unknown type `{0}`")]
    UnknownType(String),
    #[error("Unknown argument `{argument}` on field `{type_name}.{field_name}`")]
    UnknownArgument {
        type_name: String,
        field_name: String,
        argument: String,
    },
    #[error("Unknown fragment `{0}`")]
    UnknownFragment(String),
    #[error("Fragment `{0}` spreads itself")]
    FragmentCycle(String),
    #[error("Invalid selection on `{type_name}.{field_name}`: {reason}")]
    InvalidSelection {
        type_name: String,
        field_name: String,
        reason: &'static str,
    },
    #[error("Fields `{0}` conflict because they select different fields or arguments")]
    FieldConflict(String),
    #[error("Response key `{0}` uses a reserved prefix")]
    ReservedAlias(String),
    #[error("Invalid value for variable `{0}`")]
    InvalidVariable(String),
    #[error("Directive `@{0}` requires a boolean `if` argument")]
    InvalidDirective(String),
    #[error("Failed to compute `{type_name}.{field_name}`: {source}")]
    Computation {
        type_name: String,
        field_name: String,
        #[source]
        source: ComputeError,
    },
    #[error("Upstream request failed: {0}")]
    Upstream(#[from] UpstreamError),
}

impl ExecutionError {
    pub fn code(&self) -> &'static str {
        match self {
            ExecutionError::Parse(_) => GRAPHQL_PARSE_FAILED,
            ExecutionError::UnknownField { .. } | ExecutionError::UnknownType(_) => UNKNOWN_TYPE,
            ExecutionError::Computation { .. } => COMPUTATION,
            ExecutionError::Upstream(_) => UPSTREAM_EXECUTION,
            _ => GRAPHQL_VALIDATION_FAILED,
        }
    }
}

impl From<ExecutionError> for ResponseError {
    fn from(err: ExecutionError) -> Self {
        ResponseError::new(err.to_string()).with_code(err.code())
    }
}

impl From<ExecutionError> for GraphQLResponse {
    fn from(err: ExecutionError) -> Self {
        GraphQLResponse::from_error(err.into())
    }
}
