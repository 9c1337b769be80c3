pub mod graphql;
pub mod upstream;

pub use crate::{
    config::{graphql::GraphQLConfig, upstream::UpstreamConfig},
    defaults,
};
pub use clap::Parser;
use serde::Deserialize;
use std::{
    fs::File,
    io::Error,
    path::{Path, PathBuf},
};
use strum::{AsRefStr, EnumString};
use thiserror::Error;

/// Error type returned by configuration operations.
#[derive(Error, Debug)]
pub enum StitchConfigError {
    #[error("Error parsing env variables from config")]
    EnvVarParseError(#[from] std::env::VarError),
    #[error("Error processing file: {0:?}")]
    ConfigFileError(#[from] Error),
    #[error("Error processing YAML file: {0:?}")]
    SerdeYamlError(#[from] serde_yaml::Error),
}

/// Result type returned by configuration operations.
pub type StitchConfigResult<T> = core::result::Result<T, StitchConfigError>;

/// Set of environment variables read by the configuration.
#[derive(Debug, EnumString, AsRefStr)]
pub enum EnvVar {
    #[strum(serialize = "UPSTREAM_TOKEN")]
    UpstreamToken,
}

#[derive(Debug, Parser, Clone)]
#[clap(
    name = "Stitchwork API Server",
    about = "Serve an upstream GraphQL API extended with derived fields.",
    version
)]
pub struct ApiServerArgs {
    /// Log level passed to the API server.
    #[clap(long, default_value = defaults::LOG_LEVEL, value_parser(["info", "debug", "error", "warn", "trace"]), help = "Log level passed to the API server.")]
    pub log_level: String,

    /// API server config file.
    #[clap(short, long, value_name = "FILE", help = "API server config file.")]
    pub config: Option<PathBuf>,

    /// Extension manifest declaring derived fields.
    #[clap(
        short,
        long,
        value_name = "FILE",
        help = "Extension manifest declaring derived fields.",
        default_value = defaults::EXTENSIONS_MANIFEST
    )]
    pub extensions: PathBuf,

    /// URL of the upstream GraphQL API.
    #[clap(
        long,
        env = "UPSTREAM_URL",
        help = "URL of the upstream GraphQL API.",
        default_value = defaults::UPSTREAM_URL
    )]
    pub upstream_url: String,

    /// Bearer token forwarded to the upstream GraphQL API.
    #[clap(
        long,
        env = "UPSTREAM_TOKEN",
        hide_env_values = true,
        help = "Bearer token forwarded to the upstream GraphQL API."
    )]
    pub upstream_token: Option<String>,

    /// Read the upstream schema from an SDL file instead of introspecting it.
    #[clap(
        long,
        value_name = "FILE",
        help = "Read the upstream schema from an SDL file instead of introspecting it."
    )]
    pub upstream_schema: Option<PathBuf>,

    /// Timeout (seconds) for upstream requests.
    #[clap(long, help = "Timeout (seconds) for upstream requests.", default_value_t = defaults::UPSTREAM_TIMEOUT_SECS)]
    pub upstream_timeout: u64,

    /// GraphQL API host.
    #[clap(long, help = "GraphQL API host.", default_value = defaults::GRAPHQL_API_HOST)]
    pub graphql_api_host: String,

    /// GraphQL API port.
    #[clap(long, help = "GraphQL API port.", default_value = defaults::GRAPHQL_API_PORT)]
    pub graphql_api_port: String,

    /// Max body size for GraphQL API requests.
    #[clap(long, help = "Max body size for GraphQL API requests.", default_value_t = defaults::MAX_BODY_SIZE)]
    pub max_body_size: usize,

    /// Build the composed schema at startup instead of on the first request.
    #[clap(
        long,
        help = "Build the composed schema at startup instead of on the first request."
    )]
    pub eager_init: bool,

    /// Enable verbose logging.
    #[clap(short, long, help = "Enable verbose logging.")]
    pub verbose: bool,
}

impl Default for ApiServerArgs {
    fn default() -> Self {
        Self {
            log_level: defaults::LOG_LEVEL.to_string(),
            config: None,
            extensions: PathBuf::from(defaults::EXTENSIONS_MANIFEST),
            upstream_url: defaults::UPSTREAM_URL.to_string(),
            upstream_token: None,
            upstream_schema: None,
            upstream_timeout: defaults::UPSTREAM_TIMEOUT_SECS,
            graphql_api_host: defaults::GRAPHQL_API_HOST.to_string(),
            graphql_api_port: defaults::GRAPHQL_API_PORT.to_string(),
            max_body_size: defaults::MAX_BODY_SIZE,
            eager_init: defaults::EAGER_INIT,
            verbose: defaults::VERBOSE_LOGGING,
        }
    }
}

pub trait Env {
    fn inject_opt_env_vars(&mut self) -> StitchConfigResult<()>;
}

/// Stitchwork API server configuration.
#[derive(Clone, Deserialize, Debug)]
#[serde(default)]
pub struct StitchConfig {
    pub log_level: String,
    pub verbose: bool,
    pub upstream: UpstreamConfig,
    pub graphql_api: GraphQLConfig,
    pub extensions: PathBuf,
    pub eager_init: bool,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            log_level: defaults::LOG_LEVEL.to_string(),
            verbose: defaults::VERBOSE_LOGGING,
            upstream: UpstreamConfig::default(),
            graphql_api: GraphQLConfig::default(),
            extensions: PathBuf::from(defaults::EXTENSIONS_MANIFEST),
            eager_init: defaults::EAGER_INIT,
        }
    }
}

impl TryFrom<ApiServerArgs> for StitchConfig {
    type Error = StitchConfigError;

    fn try_from(args: ApiServerArgs) -> StitchConfigResult<Self> {
        let mut config = StitchConfig {
            log_level: args.log_level,
            verbose: args.verbose,
            upstream: UpstreamConfig {
                url: args.upstream_url,
                token: args.upstream_token,
                schema_path: args.upstream_schema,
                timeout_secs: args.upstream_timeout,
                ..UpstreamConfig::default()
            },
            graphql_api: GraphQLConfig {
                host: args.graphql_api_host,
                port: args.graphql_api_port,
                max_body_size: args.max_body_size,
            },
            extensions: args.extensions,
            eager_init: args.eager_init,
        };

        config.inject_opt_env_vars()?;

        Ok(config)
    }
}

impl StitchConfig {
    // When building the config via a file, any section (e.g., upstream, graphql_api), or
    // any individual setting in a section (e.g., upstream.url) that is absent is
    // replaced with its respective default value.
    pub fn from_file(path: impl AsRef<Path>) -> StitchConfigResult<Self> {
        let file = File::open(path)?;

        let mut config: StitchConfig = serde_yaml::from_reader(file)?;

        config.inject_opt_env_vars()?;

        Ok(config)
    }

    // Inject env vars into each section of the config
    pub fn inject_opt_env_vars(&mut self) -> StitchConfigResult<()> {
        self.upstream.inject_opt_env_vars()?;
        self.graphql_api.inject_opt_env_vars()?;

        Ok(())
    }
}
