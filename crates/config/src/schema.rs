/// Config schema types (server, session, send, webhook, announce, routing, transport).
use std::{collections::HashMap, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub send: SendConfig,
    pub webhook: WebhookConfig,
    pub announce: AnnounceConfig,
    pub routing: RoutingConfig,
    pub transport: TransportConfig,
}

/// HTTP control plane listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 3000,
        }
    }
}

/// Credential store location and reconnect timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory holding the transport credentials. Must survive restarts.
    pub store_dir: PathBuf,
    /// Delay before reconnecting after an ordinary close.
    pub reconnect_delay_ms: u64,
    /// Delay before retrying when the start sequence itself failed.
    pub start_retry_delay_ms: u64,
    /// Delay before reconnecting after `/logout` or `/reset-session`.
    pub control_reconnect_delay_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("auth"),
            reconnect_delay_ms: 1500,
            start_retry_delay_ms: 2000,
            control_reconnect_delay_ms: 300,
        }
    }
}

impl SessionConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn start_retry_delay(&self) -> Duration {
        Duration::from_millis(self.start_retry_delay_ms)
    }

    pub fn control_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.control_reconnect_delay_ms)
    }
}

/// Outbound send path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SendConfig {
    /// Bearer token required by `/send-private` and `/send-group`.
    /// When unset those endpoints are open.
    pub token: Option<String>,
    pub ready_timeout_secs: u64,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            token: None,
            ready_timeout_secs: 15,
            jitter_min_ms: 300,
            jitter_max_ms: 1200,
        }
    }
}

impl SendConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }
}

/// Where inbound messages are forwarded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub url: Option<String>,
    /// Shared secret sent as `X-Webhook-Token`.
    pub token: Option<String>,
}

/// Boot notification targets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnounceConfig {
    pub private_target: Option<String>,
    pub group_target: Option<String>,
    /// Shown in the notification. Falls back to the host name.
    pub server_name: Option<String>,
}

impl AnnounceConfig {
    pub fn targets(&self) -> Vec<String> {
        [&self.private_target, &self.group_target]
            .into_iter()
            .flatten()
            .filter(|t| !t.trim().is_empty())
            .cloned()
            .collect()
    }

    pub fn resolved_server_name(&self) -> String {
        self.server_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| hostname::get().ok().and_then(|h| h.into_string().ok()))
            .unwrap_or_else(|| "unknown".into())
    }
}

/// Inbound routing policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Admit group messages that mention the bot by number suffix or by
    /// the word "bot" even without an explicit mention.
    pub fallback_text_mention: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            fallback_text_mention: true,
        }
    }
}

/// External transport sidecar process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}
