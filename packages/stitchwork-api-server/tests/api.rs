use assert_matches::assert_matches;
use axum::{
    body::Body,
    extract::{Extension, Json},
    http::{HeaderMap, Request, StatusCode},
    routing::post,
    Router,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, Mutex},
};
use stitchwork_api_server::{api::GraphQlApi, upstream::HttpUpstream};
use stitchwork_graphql::{
    ExecutionAdapter, ExtensionManifest, Upstream, UpstreamError, UpstreamRequest,
};
use stitchwork_lib::config::{StitchConfig, UpstreamConfig};
use tower::ServiceExt;

const SDL: &str = r#"
type Query {
  organization(login: String!): Organization
}

type Organization {
  login: String!
  name: String
  repositories(first: Int): RepositoryConnection!
}

type RepositoryConnection {
  nodes: [Repository]
}

type Repository {
  name: String!
  stargazers: StargazerConnection!
}

type StargazerConnection {
  totalCount: Int!
}
"#;

const MANIFEST: &str = r#"
schema: |
  extend type Organization {
    countSum: Int
  }
templates:
  - name: repo_stars
    type: Organization
    selection: "repos: repositories(first: 100) { nodes { stargazers { totalCount } } }"
fields:
  - type: Organization
    field: countSum
    template: repo_stars
    compute: { aggregate: sum, path: repos.nodes.stargazers.totalCount }
"#;

#[derive(Clone, Default)]
struct Recorded(Arc<Mutex<Vec<(HeaderMap, Value)>>>);

impl Recorded {
    fn last(&self) -> (HeaderMap, Value) {
        self.0.lock().unwrap().last().cloned().unwrap()
    }
}

async fn fake_graphql(
    Extension(recorded): Extension<Recorded>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    recorded.0.lock().unwrap().push((headers, body));
    Json(json!({
        "data": {
            "organization": {
                "name": "GitHub",
                "_stitch_repo_stars_repos": {
                    "nodes": [
                        { "stargazers": { "totalCount": 3 } },
                        { "stargazers": { "totalCount": 7 } }
                    ]
                }
            }
        }
    }))
}

async fn broken() -> (StatusCode, &'static str) {
    (StatusCode::BAD_GATEWAY, "upstream down")
}

async fn spawn_fake_upstream() -> (SocketAddr, Recorded) {
    let recorded = Recorded::default();
    let app = Router::new()
        .route("/graphql", post(fake_graphql))
        .route("/broken", post(broken))
        .layer(Extension(recorded.clone()));

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::Server::from_tcp(listener)
            .unwrap()
            .serve(app.into_make_service())
            .await
            .unwrap()
    });

    (addr, recorded)
}

fn schema_file(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "stitchwork-{name}-{}.graphql",
        std::process::id()
    ));
    std::fs::write(&path, SDL).unwrap();
    path
}

fn upstream_config(addr: SocketAddr, path: &str, schema: &str) -> UpstreamConfig {
    UpstreamConfig {
        url: format!("http://{addr}{path}"),
        token: Some("secret".to_string()),
        schema_path: Some(schema_file(schema)),
        ..UpstreamConfig::default()
    }
}

async fn app(name: &str) -> (Router, Arc<ExecutionAdapter>, Recorded) {
    let (addr, recorded) = spawn_fake_upstream().await;
    let upstream = HttpUpstream::new(&upstream_config(addr, "/graphql", name)).unwrap();
    let extensions = ExtensionManifest::from_str(MANIFEST)
        .unwrap()
        .into_registries()
        .unwrap();

    let adapter = Arc::new(ExecutionAdapter::new(Arc::new(upstream), extensions));
    let router = GraphQlApi::build(&StitchConfig::default(), adapter.clone());

    (router, adapter, recorded)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn url_encode(s: &str) -> String {
    s.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{b:02X}"),
        })
        .collect()
}

#[tokio::test]
async fn test_post_graphql_resolves_derived_fields() {
    let (router, _, recorded) = app("post").await;

    let request = Request::builder()
        .method("POST")
        .uri("/graphql")
        .header("content-type", "application/json")
        .header("x-github-next-global-id", "1")
        .body(Body::from(
            json!({ "query": r#"{ organization(login: "github") { name countSum } }"# })
                .to_string(),
        ))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({ "data": { "organization": { "name": "GitHub", "countSum": 10 } } })
    );

    let (headers, body) = recorded.last();
    assert_eq!(headers["authorization"], "bearer secret");
    assert_eq!(headers["x-github-next-global-id"], "1");
    assert!(headers["user-agent"]
        .to_str()
        .unwrap()
        .starts_with("stitchwork/"));
    assert!(body["query"]
        .as_str()
        .unwrap()
        .contains("_stitch_repo_stars_repos: repositories(first: 100)"));
}

#[tokio::test]
async fn test_get_graphql_with_variables() {
    let (router, _, recorded) = app("get").await;

    let query = "query Org($login: String!) { organization(login: $login) { name countSum } }";
    let uri = format!(
        "/graphql?query={}&operationName=Org&variables={}",
        url_encode(query),
        url_encode(r#"{"login":"github"}"#)
    );
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await["data"]["organization"]["countSum"],
        json!(10)
    );

    let (_, body) = recorded.last();
    assert_eq!(body["operationName"], "Org");
    assert!(body["query"]
        .as_str()
        .unwrap()
        .contains(r#"organization(login: "github")"#));
}

#[tokio::test]
async fn test_get_graphql_rejects_malformed_variables() {
    let (router, _, recorded) = app("bad-variables").await;

    let uri = format!(
        "/graphql?query={}&variables={}",
        url_encode("{ organization(login: \"github\") { name } }"),
        url_encode("[1, 2]")
    );
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(recorded.0.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_health_reports_adapter_state() {
    let (router, adapter, _) = app("health").await;

    let health = |router: Router| async move {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        body_json(router.oneshot(request).await.unwrap()).await
    };

    let body = health(router.clone()).await;
    assert_eq!(body["status"], "OK");
    assert_eq!(body["adapter_state"], "Uninitialized");
    assert_eq!(body["schema_status"], "NotOk");

    adapter.initialize().await.unwrap();

    let body = health(router).await;
    assert_eq!(body["adapter_state"], "Ready");
    assert_eq!(body["schema_status"], "OK");
}

#[tokio::test]
async fn test_playground_is_served() {
    let (router, _, _) = app("playground").await;

    let request = Request::builder()
        .uri("/playground")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("GraphQL Playground"));
}

#[tokio::test]
async fn test_http_upstream_reads_schema_file() {
    let (addr, recorded) = spawn_fake_upstream().await;
    let upstream = HttpUpstream::new(&upstream_config(addr, "/graphql", "schema-file")).unwrap();

    let schema = upstream.introspect().await.unwrap();

    assert_eq!(schema.query_type(), "Query");
    assert!(schema.type_def("Organization").is_some());
    assert!(recorded.0.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_http_upstream_reports_status_errors() {
    let (addr, _) = spawn_fake_upstream().await;
    let upstream = HttpUpstream::new(&upstream_config(addr, "/broken", "broken")).unwrap();

    let result = upstream.execute(UpstreamRequest::new("{ __typename }")).await;

    assert_matches!(
        result,
        Err(UpstreamError::Status { status: 502, body }) if body == "upstream down"
    );
}
