use async_trait::async_trait;
use reqwest::Client;
use std::{path::PathBuf, time::Duration};
use stitchwork_graphql::{
    upstream::introspect_with, Upstream, UpstreamError, UpstreamRequest, UpstreamResponse,
    UpstreamSchema,
};
use stitchwork_lib::config::UpstreamConfig;
use tracing::{debug, info};

/// Upstream GraphQL API reached over HTTP.
pub struct HttpUpstream {
    client: Client,
    url: String,
    token: Option<String>,
    schema_path: Option<PathBuf>,
}

impl HttpUpstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            token: config.token.clone(),
            schema_path: config.schema_path.clone(),
        })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn introspect(&self) -> Result<UpstreamSchema, UpstreamError> {
        match &self.schema_path {
            Some(path) => {
                info!("Reading upstream schema from {path:?}");
                let sdl = tokio::fs::read_to_string(path).await.map_err(|e| {
                    UpstreamError::Transport(format!("Could not read {path:?}: {e}"))
                })?;
                Ok(UpstreamSchema::from_sdl(&sdl)?)
            }
            None => {
                info!("Introspecting upstream schema at {}", self.url);
                introspect_with(self).await
            }
        }
    }

    async fn execute(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        let mut builder = self.client.post(&self.url).json(&request);

        if let Some(token) = &self.token {
            builder = builder.header("Authorization", format!("bearer {token}"));
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        debug!("Forwarding operation {:?} to {}", request.operation_name, self.url);

        let response = builder
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<UpstreamResponse>()
            .await
            .map_err(|e| UpstreamError::Decode(e.to_string()))
    }
}
