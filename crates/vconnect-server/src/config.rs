use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ApiError, ServerError};

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";

/// Server settings. Platform credentials are not part of it: they are
/// read per request through a [`CredentialSource`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Access token lifetime; the platform default applies when unset.
    pub token_ttl_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            token_ttl_secs: None,
        }
    }
}

impl ServerConfig {
    /// Read `VCONNECT_LISTEN_ADDR` and `VCONNECT_TOKEN_TTL_SECS`.
    pub fn from_env() -> Result<Self, ServerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServerError> {
        let mut config = Self::default();
        if let Some(addr) = lookup("VCONNECT_LISTEN_ADDR").filter(|v| !v.trim().is_empty()) {
            config.listen_addr = addr.trim().to_string();
        }
        if let Some(ttl) = lookup("VCONNECT_TOKEN_TTL_SECS").filter(|v| !v.trim().is_empty()) {
            let secs = ttl
                .trim()
                .parse::<u64>()
                .map_err(|e| ServerError::Config(format!("VCONNECT_TOKEN_TTL_SECS: {e}")))?;
            if secs == 0 {
                return Err(ServerError::Config(
                    "VCONNECT_TOKEN_TTL_SECS must be positive".to_string(),
                ));
            }
            config.token_ttl_secs = Some(secs);
        }
        Ok(config)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listen_addr
            .parse()
            .map_err(|e| ServerError::Config(format!("listen address {}: {e}", self.listen_addr)))
    }

    pub fn token_ttl(&self) -> Option<Duration> {
        self.token_ttl_secs.map(Duration::from_secs)
    }
}

/// Video platform credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub url: String,
    pub api_key: String,
    pub api_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("url", &self.url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// `None` unless all three of `LIVEKIT_URL`, `LIVEKIT_API_KEY` and
    /// `LIVEKIT_API_SECRET` are present and non-empty.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Some(Self {
            url: get("LIVEKIT_URL")?,
            api_key: get("LIVEKIT_API_KEY")?,
            api_secret: get("LIVEKIT_API_SECRET")?,
        })
    }

    /// The URL clients connect to: `http(s)` is reported as `ws(s)`.
    pub fn client_url(&self) -> Result<String, ApiError> {
        let raw = self.url.trim();
        let parsed = url::Url::parse(raw)
            .map_err(|e| ApiError::Config(format!("invalid LIVEKIT_URL: {e}")))?;
        let rest = &raw[parsed.scheme().len()..];
        match parsed.scheme() {
            "ws" | "wss" => Ok(raw.to_string()),
            "http" => Ok(format!("ws{rest}")),
            "https" => Ok(format!("wss{rest}")),
            other => Err(ApiError::Config(format!(
                "unsupported LIVEKIT_URL scheme: {other}"
            ))),
        }
    }
}

/// Where the token issuer gets its credentials from.
pub trait CredentialSource: Send + Sync + 'static {
    fn credentials(&self) -> Option<Credentials>;
}

/// Reads the process environment on every call, so rotated secrets take
/// effect without a restart.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn credentials(&self) -> Option<Credentials> {
        Credentials::from_lookup(|key| std::env::var(key).ok())
    }
}

/// Fixed credentials, or none at all.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(pub Option<Credentials>);

impl CredentialSource for StaticCredentials {
    fn credentials(&self) -> Option<Credentials> {
        self.0.clone()
    }
}
