use crate::uses::{graphql_get, graphql_post, health_check, playground};
use axum::{
    extract::{DefaultBodyLimit, Extension, Json},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use hyper::Error as HyperError;
use serde_json::json;
use std::{net::SocketAddr, sync::Arc, time::Instant};
use stitchwork_graphql::ExecutionAdapter;
use stitchwork_lib::config::StitchConfig;
use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

pub type ApiResult<T> = core::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Bad request: {0}")]
    BadRequest(String),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Serialization error {0:?}")]
    Serde(#[from] serde_json::Error),
    #[error("Http error {0:?}")]
    Http(#[from] HttpError),
    #[error("Hyper error: {0:?}")]
    HyperError(#[from] HyperError),
    #[error("Io error: {0:?}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, err_msg) = match self {
            ApiError::Http(HttpError::BadRequest(msg)) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Serde(e) => (StatusCode::BAD_REQUEST, format!("Invalid JSON: {e}")),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error.".to_string(),
            ),
        };

        error!("{:?} - {}", status, err_msg);

        (
            status,
            Json(json!({
                "success": "false",
                "details": err_msg,
            })),
        )
            .into_response()
    }
}

pub struct GraphQlApi;

impl GraphQlApi {
    /// Routes of the API server, without binding a listener.
    pub fn build(config: &StitchConfig, adapter: Arc<ExecutionAdapter>) -> Router {
        let start_time = Arc::new(Instant::now());

        let graph_route = Router::new()
            .route("/graphql", get(graphql_get).post(graphql_post))
            .route("/playground", get(playground))
            .layer(Extension(adapter.clone()));

        let health_route = Router::new()
            .route("/health", get(health_check))
            .layer(Extension(adapter))
            .layer(Extension(start_time));

        Router::new()
            .merge(graph_route)
            .merge(health_route)
            .layer(DefaultBodyLimit::max(config.graphql_api.max_body_size))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    pub async fn run(config: StitchConfig, adapter: Arc<ExecutionAdapter>) -> ApiResult<()> {
        let listen_on: SocketAddr = config.graphql_api.socket_addr()?;
        let app = Self::build(&config, adapter);

        info!("Stitchwork API server listening on {listen_on}");

        axum::Server::bind(&listen_on)
            .serve(app.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }
    info!("Shutting down Stitchwork API server");
}
