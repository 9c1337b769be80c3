use crate::config::StitchConfig;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::{
    env,
    io,
    net::{SocketAddr, ToSocketAddrs},
    str::FromStr,
};
use tracing::{debug, info};
use tracing_subscriber::filter::EnvFilter;

const RUST_LOG: &str = "RUST_LOG";
const HUMAN_LOGGING: &str = "HUMAN_LOGGING";

/// The variable name referenced by `$FOO` or `${FOO}`, if `value` is such a reference.
///
/// Anything else, including an unterminated `${FOO`, is a literal value.
pub fn opt_env_key(value: &str) -> Option<&str> {
    let key = match value.strip_prefix("${") {
        Some(rest) => rest.strip_suffix('}')?,
        None => value.strip_prefix('$')?,
    };

    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some(key)
}

/// Derive the [`std::net::SocketAddr`] from a given host and port, falling back
/// to a DNS lookup using [`std::net::ToSocketAddrs`] if the host is not a valid IP address.
pub fn derive_socket_addr(host: &str, port: &str) -> io::Result<SocketAddr> {
    let host = format!("{host}:{port}");
    match SocketAddr::from_str(&host) {
        Ok(v) => Ok(v),
        Err(e) => {
            debug!("Failed to parse '{host}': {e}. Retrying...");
            let addr = host.to_socket_addrs()?.next().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("Could not derive SocketAddr from '{host}'"),
                )
            })?;

            info!("Parsed SocketAddr '{addr:?}' from '{host}'");

            Ok(addr)
        }
    }
}

/// Denotes the status of a service for the service health check.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    /// The service is healthy.
    OK,

    /// The service is not healthy.
    NotOk,
}

/// Initialize the logging context for the API server.
pub fn init_logging(config: &StitchConfig) -> Result<()> {
    let level = env::var_os(RUST_LOG)
        .and_then(|x| x.into_string().ok())
        .unwrap_or_else(|| config.log_level.clone());

    // We manually suppress some of the more verbose crate logging.
    if !config.verbose {
        env::set_var(RUST_LOG, format!("{level},hyper=warn,reqwest=warn,h2=warn"));
    }

    let filter = match env::var_os(RUST_LOG) {
        Some(_) => EnvFilter::try_from_default_env()
            .map_err(|e| anyhow!("Invalid `RUST_LOG` provided: {e}"))?,
        None => EnvFilter::new(level),
    };

    let human_logging = match env::var(HUMAN_LOGGING) {
        Ok(s) => bool::from_str(&s).map_err(|_| {
            anyhow!("Expected `true` or `false` to be provided for `HUMAN_LOGGING`")
        })?,
        Err(_) => true,
    };

    let sub = tracing_subscriber::fmt::Subscriber::builder()
        .with_writer(std::io::stderr)
        .with_env_filter(filter);

    if human_logging {
        sub.with_ansi(true)
            .with_level(true)
            .with_line_number(true)
            .init();
    } else {
        sub.with_ansi(false)
            .with_level(true)
            .with_line_number(true)
            .json()
            .init();
    }
    Ok(())
}
