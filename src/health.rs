use crate::logger::{Logger, NoopLogger};
use std::error::Error as _;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;

pub const PROBE_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_PROBE_PATH: &str = "/health";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl ProbeTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            path: DEFAULT_PROBE_PATH.to_string(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    fn bare_host(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("{0} did not resolve to any address")]
    NoAddress(String),
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("health check request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

async fn resolve(target: &ProbeTarget) -> Result<SocketAddr, ProbeError> {
    let host = target.bare_host();
    let mut addrs = tokio::net::lookup_host((host, target.port))
        .await
        .map_err(|source| ProbeError::Resolve {
            host: host.to_string(),
            source,
        })?;
    addrs
        .next()
        .ok_or_else(|| ProbeError::NoAddress(host.to_string()))
}

/// Refused, reset and timed out connections mean "not listening yet".
fn is_transient(err: &reqwest::Error) -> bool {
    if err.is_connect() || err.is_timeout() {
        return true;
    }
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>()
            && matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::UnexpectedEof
            )
        {
            return true;
        }
        source = cause.source();
    }
    false
}

/// Waits until `target` answers an HTTP `HEAD` request, with any status.
///
/// Returns `Ok(false)` if it only gets refused, reset or timed out
/// connections for longer than `timeout`. Each attempt may itself take up to
/// `timeout`, so the total wait can be longer. Other errors, such as a host
/// that does not resolve, are returned immediately.
pub async fn wait_for_http_port_open(
    target: &ProbeTarget,
    timeout: Duration,
    interval: Duration,
    logger: &dyn Logger,
) -> Result<bool, ProbeError> {
    let addr = resolve(target).await?;
    let url = format!("http://{addr}{}", target.path);

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .no_proxy()
        .build()
        .map_err(ProbeError::Client)?;

    let start = Instant::now();
    loop {
        logger.debug(&format!("trying to connect to {url}"));

        match client.head(&url).send().await {
            Ok(resp) => {
                logger.debug(&format!("got HTTP {} from {url}", resp.status()));
                return Ok(true);
            }
            Err(e) if is_transient(&e) => {
                logger.debug(&format!("not ready yet: {e}"));
                if start.elapsed() > timeout {
                    logger.debug(&format!(
                        "timed out after {}ms",
                        start.elapsed().as_millis()
                    ));
                    return Ok(false);
                }
                tokio::time::sleep(interval).await;
            }
            Err(source) => return Err(ProbeError::Request { url, source }),
        }
    }
}

/// [`wait_for_http_port_open`] with the default interval and no logging.
pub async fn wait_for_ready(target: &ProbeTarget, timeout: Duration) -> Result<bool, ProbeError> {
    wait_for_http_port_open(target, timeout, PROBE_INTERVAL, &NoopLogger).await
}
