use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(30);
pub const DEFAULT_RECONNECT_BASE: Duration = Duration::from_millis(3000);
pub const DEFAULT_MAX_RECONNECTS: u32 = 5;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid server url {url}: {detail}")]
    InvalidUrl { url: String, detail: String },
    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub url: Url,
    pub heartbeat_interval: Duration,
    pub reconnect_base: Duration,
    pub max_reconnect_attempts: u32,
}

impl ConnectionConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            heartbeat_interval: DEFAULT_HEARTBEAT,
            reconnect_base: DEFAULT_RECONNECT_BASE,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base of the HTTP command API.
    pub server_url: Url,
    pub connection: ConnectionConfig,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn from_server_url(raw: &str) -> Result<Self, ConfigError> {
        let server_url = parse_url(raw)?;
        let ws_url = derive_ws_url(&server_url)?;
        Ok(Self {
            server_url,
            connection: ConnectionConfig::new(ws_url),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }
}

pub fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw.trim()).map_err(|err| ConfigError::InvalidUrl {
        url: raw.to_string(),
        detail: err.to_string(),
    })
}

/// The feed lives at `/ws` on the same host, over `wss` when the API is
/// served over https.
pub fn derive_ws_url(server: &Url) -> Result<Url, ConfigError> {
    let scheme = match server.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
    };
    let mut url = server.clone();
    url.set_scheme(scheme)
        .map_err(|_| ConfigError::UnsupportedScheme(server.scheme().to_string()))?;
    url.set_path("/ws");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
