use crate::{
    config::{Env, StitchConfigResult},
    defaults,
    utils::derive_socket_addr,
};
use serde::Deserialize;
use std::{io, net::SocketAddr};

#[derive(Clone, Deserialize, Debug)]
#[serde(default)]
pub struct GraphQLConfig {
    /// GraphQL API host.
    pub host: String,

    /// GraphQL API port.
    pub port: String,

    /// Max body size for GraphQL API requests.
    pub max_body_size: usize,
}

impl std::fmt::Display for GraphQLConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl Default for GraphQLConfig {
    fn default() -> Self {
        Self {
            host: defaults::GRAPHQL_API_HOST.into(),
            port: defaults::GRAPHQL_API_PORT.into(),
            max_body_size: defaults::MAX_BODY_SIZE,
        }
    }
}

impl GraphQLConfig {
    pub fn socket_addr(&self) -> io::Result<SocketAddr> {
        derive_socket_addr(&self.host, &self.port)
    }
}

impl Env for GraphQLConfig {
    fn inject_opt_env_vars(&mut self) -> StitchConfigResult<()> {
        Ok(())
    }
}
