use crate::{
    config::{Env, EnvVar, StitchConfigResult},
    defaults,
    utils::opt_env_key,
};
use serde::Deserialize;
use std::{
    fmt::{Debug, Formatter},
    path::PathBuf,
};

/// Connection settings for the upstream GraphQL API being extended.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// URL of the upstream GraphQL endpoint.
    pub url: String,

    /// Bearer token forwarded as `Authorization: bearer <token>`.
    pub token: Option<String>,

    /// Local SDL file used instead of introspecting the upstream.
    pub schema_path: Option<PathBuf>,

    /// Timeout (seconds) applied to every upstream request.
    pub timeout_secs: u64,

    /// `User-Agent` sent upstream. GitHub rejects requests without one.
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: defaults::UPSTREAM_URL.to_string(),
            token: None,
            schema_path: None,
            timeout_secs: defaults::UPSTREAM_TIMEOUT_SECS,
            user_agent: defaults::UPSTREAM_USER_AGENT.to_string(),
        }
    }
}

impl Debug for UpstreamConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let UpstreamConfig {
            url,
            token,
            schema_path,
            timeout_secs,
            user_agent,
        } = self;
        f.debug_struct("UpstreamConfig")
            .field("url", &url)
            .field("token", &token.as_ref().map(|_| "XXXX"))
            .field("schema_path", &schema_path)
            .field("timeout_secs", &timeout_secs)
            .field("user_agent", &user_agent)
            .finish()
    }
}

impl Env for UpstreamConfig {
    fn inject_opt_env_vars(&mut self) -> StitchConfigResult<()> {
        if let Some(key) = opt_env_key(&self.url) {
            self.url = std::env::var(key)?;
        }

        match self.token.as_deref().map(opt_env_key) {
            Some(Some(key)) => self.token = Some(std::env::var(key)?),
            Some(None) => {}
            // Fall back to the conventional variable so that a YAML config without
            // a token still authenticates.
            None => self.token = std::env::var(EnvVar::UpstreamToken.as_ref()).ok(),
        }

        Ok(())
    }
}
