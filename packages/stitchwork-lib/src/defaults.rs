pub const LOG_LEVEL: &str = "info";
pub const VERBOSE_LOGGING: bool = false;

pub const GRAPHQL_API_HOST: &str = "127.0.0.1";
pub const GRAPHQL_API_PORT: &str = "29987";
pub const MAX_BODY_SIZE: usize = 5242880; // 5MB in bytes

pub const UPSTREAM_URL: &str = "https://api.github.com/graphql";
pub const UPSTREAM_TIMEOUT_SECS: u64 = 30;
pub const UPSTREAM_USER_AGENT: &str = concat!("stitchwork/", env!("CARGO_PKG_VERSION"));

pub const EXTENSIONS_MANIFEST: &str = "extensions.yaml";
pub const EAGER_INIT: bool = false;
