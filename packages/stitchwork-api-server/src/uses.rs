use crate::{api::ApiResult, models::GraphQLQueryParams};
use async_graphql::http::{playground_source, GraphQLPlaygroundConfig};
use axum::{
    extract::{Extension, Json, Query},
    http::HeaderMap,
    response::Html,
};
use serde_json::{json, Value};
use std::{sync::Arc, time::Instant};
use stitchwork_graphql::{AdapterState, ExecutionAdapter, GraphQLRequest, GraphQLResponse};
use stitchwork_lib::utils::ServiceStatus;
use tracing::debug;

/// Incoming headers passed through to the upstream with the forwarded query.
///
/// Only `x-` extension headers are kept, minus proxy bookkeeping.
pub(crate) fn forwarded_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| {
            let name = name.as_str();
            name.starts_with("x-") && !name.starts_with("x-forwarded-")
        })
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

pub(crate) async fn graphql_post(
    Extension(adapter): Extension<Arc<ExecutionAdapter>>,
    headers: HeaderMap,
    Json(request): Json<GraphQLRequest>,
) -> Json<GraphQLResponse> {
    debug!("POST /graphql operation={:?}", request.operation_name);
    Json(
        adapter
            .handle_with_headers(request, forwarded_headers(&headers))
            .await,
    )
}

pub(crate) async fn graphql_get(
    Extension(adapter): Extension<Arc<ExecutionAdapter>>,
    headers: HeaderMap,
    Query(params): Query<GraphQLQueryParams>,
) -> ApiResult<Json<GraphQLResponse>> {
    let request = GraphQLRequest::try_from(params)?;
    debug!("GET /graphql operation={:?}", request.operation_name);
    Ok(Json(
        adapter
            .handle_with_headers(request, forwarded_headers(&headers))
            .await,
    ))
}

pub(crate) async fn playground() -> Html<String> {
    Html(playground_source(GraphQLPlaygroundConfig::new("/graphql")))
}

pub(crate) async fn health_check(
    Extension(adapter): Extension<Arc<ExecutionAdapter>>,
    Extension(start_time): Extension<Arc<Instant>>,
) -> ApiResult<Json<Value>> {
    let uptime = start_time.elapsed().as_secs().to_string();
    let state = adapter.state();
    let schema_status = match state {
        AdapterState::Ready => ServiceStatus::OK,
        AdapterState::Uninitialized | AdapterState::Building => ServiceStatus::NotOk,
    };

    Ok(Json(json!({
        "status": ServiceStatus::OK,
        "schema_status": schema_status,
        "adapter_state": state,
        "uptime(seconds)": uptime,
    })))
}
