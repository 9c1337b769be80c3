use crate::{
    loader::ExtensionSet,
    merge::{ComposedSchema, MergeError},
    query,
    response::{
        GraphQLRequest, GraphQLResponse, ResponseError, SCHEMA_COMPOSITION,
        UPSTREAM_INTROSPECTION,
    },
    upstream::{Upstream, UpstreamError},
};
use serde::Serialize;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

/// Errors that prevent the composed schema from being built.
#[derive(Debug, Error)]
pub enum StitchError {
    #[error("Upstream introspection failed: {0}")]
    UpstreamIntrospection(#[source] UpstreamError),
    #[error("Schema composition failed: {0}")]
    Merge(#[from] MergeError),
}

impl StitchError {
    pub fn code(&self) -> &'static str {
        match self {
            StitchError::UpstreamIntrospection(_) => UPSTREAM_INTROSPECTION,
            StitchError::Merge(_) => SCHEMA_COMPOSITION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AdapterState {
    Uninitialized,
    Building,
    Ready,
}

struct BuildingGuard<'a>(&'a AtomicBool);

impl<'a> BuildingGuard<'a> {
    fn new(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for BuildingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Serves requests against the upstream schema extended with derived fields.
///
/// The composed schema is built on first use, or by an explicit call to
/// [`ExecutionAdapter::initialize`]. Concurrent first callers share one build; a
/// failed build leaves the adapter uninitialized so that the next call retries.
pub struct ExecutionAdapter {
    upstream: Arc<dyn Upstream>,
    extensions: Arc<ExtensionSet>,
    schema: OnceCell<Arc<ComposedSchema>>,
    building: AtomicBool,
}

impl ExecutionAdapter {
    pub fn new(upstream: Arc<dyn Upstream>, extensions: ExtensionSet) -> Self {
        Self {
            upstream,
            extensions: Arc::new(extensions),
            schema: OnceCell::new(),
            building: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> AdapterState {
        if self.schema.initialized() {
            AdapterState::Ready
        } else if self.building.load(Ordering::SeqCst) {
            AdapterState::Building
        } else {
            AdapterState::Uninitialized
        }
    }

    /// The composed schema, if it has been built.
    pub fn schema(&self) -> Option<Arc<ComposedSchema>> {
        self.schema.get().cloned()
    }

    pub async fn initialize(&self) -> Result<Arc<ComposedSchema>, StitchError> {
        if let Some(schema) = self.schema.get() {
            debug!("Composed schema already built, nothing to initialize.");
            return Ok(schema.clone());
        }

        let schema = self.schema.get_or_try_init(|| self.build()).await?;
        Ok(schema.clone())
    }

    async fn build(&self) -> Result<Arc<ComposedSchema>, StitchError> {
        let _building = BuildingGuard::new(&self.building);

        info!("Introspecting upstream schema.");
        let upstream = self.upstream.introspect().await.map_err(|e| {
            error!("Upstream introspection failed: {e}");
            StitchError::UpstreamIntrospection(e)
        })?;

        let composed = self.extensions.compose(upstream).map_err(|e| {
            error!("Failed to compose schema: {e}");
            StitchError::from(e)
        })?;

        info!(
            "Composed schema with {} derived field(s).",
            composed.derived_fields().count()
        );

        Ok(Arc::new(composed))
    }

    pub async fn handle(&self, request: GraphQLRequest) -> GraphQLResponse {
        self.handle_with_headers(request, Vec::new()).await
    }

    /// Handle a request, forwarding `headers` with the upstream query.
    pub async fn handle_with_headers(
        &self,
        request: GraphQLRequest,
        headers: Vec<(String, String)>,
    ) -> GraphQLResponse {
        let schema = match self.initialize().await {
            Ok(schema) => schema,
            Err(e) => {
                return GraphQLResponse::from_error(
                    ResponseError::new(e.to_string()).with_code(e.code()),
                )
            }
        };

        query::execute(&schema, self.upstream.as_ref(), &request, headers).await
    }
}
