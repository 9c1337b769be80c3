use crate::{
    introspection::INTROSPECTION_QUERY,
    response::ResponseError,
    schema::{UpstreamSchema, UpstreamSchemaError},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub type UpstreamResult<T> = Result<T, UpstreamError>;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Upstream responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Could not decode upstream response: {0}")]
    Decode(String),
    #[error("Invalid upstream schema: {0}")]
    Schema(#[from] UpstreamSchemaError),
    #[error("Upstream introspection failed: {0}")]
    Introspection(String),
    #[error("Upstream introspection returned no data")]
    EmptyIntrospection,
}

/// A query forwarded to the upstream API.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub variables: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    /// Extra HTTP headers for this request only.
    #[serde(skip)]
    pub headers: Vec<(String, String)>,
}

impl UpstreamRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_operation_name(mut self, name: Option<String>) -> Self {
        self.operation_name = name;
        self
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Vec<ResponseError>,
}

/// The GraphQL API being extended.
#[async_trait]
pub trait Upstream: Send + Sync + 'static {
    /// Fetch the upstream type system. Defaults to running the standard
    /// introspection query through [`Upstream::execute`].
    async fn introspect(&self) -> UpstreamResult<UpstreamSchema> {
        introspect_with(self).await
    }

    async fn execute(&self, request: UpstreamRequest) -> UpstreamResult<UpstreamResponse>;
}

/// Run [`INTROSPECTION_QUERY`] against `upstream` and convert the result.
pub async fn introspect_with<U: Upstream + ?Sized>(upstream: &U) -> UpstreamResult<UpstreamSchema> {
    let request = UpstreamRequest::new(INTROSPECTION_QUERY)
        .with_operation_name(Some("IntrospectionQuery".to_string()));
    let response = upstream.execute(request).await?;

    if !response.errors.is_empty() {
        let messages: Vec<&str> = response.errors.iter().map(|e| e.message.as_str()).collect();
        return Err(UpstreamError::Introspection(messages.join("; ")));
    }

    let data = response.data.ok_or(UpstreamError::EmptyIntrospection)?;
    Ok(UpstreamSchema::from_introspection(data)?)
}
