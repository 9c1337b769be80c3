use crate::api::{ApiResult, HttpError};
use serde::Deserialize;
use serde_json::{Map, Value};
use stitchwork_graphql::GraphQLRequest;

/// Query string of a `GET /graphql` request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphQLQueryParams {
    pub query: String,
    pub operation_name: Option<String>,
    /// JSON-encoded variables object.
    pub variables: Option<String>,
}

impl TryFrom<GraphQLQueryParams> for GraphQLRequest {
    type Error = crate::api::ApiError;

    fn try_from(params: GraphQLQueryParams) -> ApiResult<Self> {
        let mut request = GraphQLRequest::new(params.query);

        if let Some(name) = params.operation_name {
            request = request.with_operation_name(name);
        }

        match params.variables.as_deref() {
            None | Some("") => {}
            Some(raw) => match serde_json::from_str::<Value>(raw)? {
                Value::Object(map) => request = request.with_variables(map),
                Value::Null => request = request.with_variables(Map::new()),
                _ => {
                    return Err(HttpError::BadRequest(
                        "`variables` must be a JSON object".to_string(),
                    )
                    .into())
                }
            },
        }

        Ok(request)
    }
}
