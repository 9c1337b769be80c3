pub(crate) mod plan;
pub(crate) mod render;
pub(crate) mod shape;

use crate::{
    merge::ComposedSchema,
    response::{ExecutionError, GraphQLRequest, GraphQLResponse, ResponseError},
    upstream::{Upstream, UpstreamRequest},
};
use async_graphql_parser::parse_query;
use plan::Planned;
use tracing::{debug, error};

/// Execute a request against the composed schema, forwarding data fields upstream.
pub async fn execute(
    schema: &ComposedSchema,
    upstream: &dyn Upstream,
    request: &GraphQLRequest,
    headers: Vec<(String, String)>,
) -> GraphQLResponse {
    let doc = match parse_query(&request.query) {
        Ok(doc) => doc,
        Err(e) => return ExecutionError::Parse(e.to_string()).into(),
    };

    let op = match plan::plan(schema, &doc, request) {
        Ok(Planned::Forward(op)) => op,
        Ok(Planned::Introspection) => return introspect(schema, request).await,
        Err(e) => {
            debug!("Rejected request: {e}");
            return e.into();
        }
    };

    let query = render::render(&op);
    debug!("Forwarding query upstream: {query}");

    let forwarded = UpstreamRequest::new(query)
        .with_operation_name(op.name.clone())
        .with_headers(headers);

    match upstream.execute(forwarded).await {
        Ok(response) => shape::shape(schema, &op, response),
        Err(e) => {
            error!("Upstream request failed: {e}");
            ExecutionError::Upstream(e).into()
        }
    }
}

async fn introspect(schema: &ComposedSchema, request: &GraphQLRequest) -> GraphQLResponse {
    let mut gql_request = async_graphql::Request::new(request.query.as_str());
    if let Some(variables) = &request.variables {
        gql_request = gql_request.variables(async_graphql::Variables::from_json(
            serde_json::Value::Object(variables.clone()),
        ));
    }
    if let Some(name) = &request.operation_name {
        gql_request = gql_request.operation_name(name.as_str());
    }

    let response = schema.introspection_schema().execute(gql_request).await;

    let errors = response
        .errors
        .iter()
        .map(|e| {
            serde_json::to_value(e)
                .ok()
                .and_then(|v| serde_json::from_value::<ResponseError>(v).ok())
                .unwrap_or_else(|| ResponseError::new(e.message.clone()))
        })
        .collect();

    GraphQLResponse {
        data: response.data.into_json().ok(),
        errors,
    }
}
