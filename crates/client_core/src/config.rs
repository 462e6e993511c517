use std::{collections::BTreeMap, fmt};

use serde::Deserialize;

pub const DEFAULT_API_BASE_URL: &str = "https://slack.com/api";
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

/// Handshake settings applied to every realtime socket the client opens.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SocketOptions {
    /// Offered `Sec-WebSocket-Protocol` values.
    pub protocols: Vec<String>,
    /// Extra request headers sent with the upgrade.
    pub headers: BTreeMap<String, String>,
    /// Upper bound on TCP connect plus the opening handshake.
    pub handshake_timeout_ms: u64,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            protocols: Vec::new(),
            headers: BTreeMap::new(),
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub token: String,
    /// Display name sent as `username` with every posted or updated message.
    pub name: Option<String>,
    pub cached: bool,
    pub api_base_url: String,
    pub socket: SocketOptions,
    /// When set, `reconnect()` without an explicit URL targets the endpoint the
    /// realtime feed last advertised instead of the login session URL.
    pub prefer_advertised_reconnect_url: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            name: None,
            cached: true,
            api_base_url: DEFAULT_API_BASE_URL.into(),
            socket: SocketOptions::default(),
            prefer_advertised_reconnect_url: false,
        }
    }
}

impl BotConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_api_base_url(mut self, api_base_url: impl Into<String>) -> Self {
        self.api_base_url = api_base_url.into();
        self
    }
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"<redacted>")
            .field("name", &self.name)
            .field("cached", &self.cached)
            .field("api_base_url", &self.api_base_url)
            .field("socket", &self.socket)
            .field(
                "prefer_advertised_reconnect_url",
                &self.prefer_advertised_reconnect_url,
            )
            .finish()
    }
}
