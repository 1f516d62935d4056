//! Best-effort forwarding of inbound messages to an automation endpoint.

use std::time::Duration;

use {
    secrecy::{ExposeSecret, Secret},
    serde::Serialize,
    tracing::{debug, warn},
};

use crate::router::InboundMessageEvent;

/// Header the receiver uses to authenticate the bridge.
pub const TOKEN_HEADER: &str = "X-Webhook-Token";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// JSON body posted for each qualifying inbound message.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub from: String,
    pub text: String,
    pub push_name: String,
    pub message_id: String,
    /// Milliseconds since the epoch.
    pub timestamp: u64,
    pub is_group: bool,
}

impl WebhookPayload {
    pub fn new(event: &InboundMessageEvent, text: &str) -> Self {
        Self {
            from: event.conversation_id.to_string(),
            text: text.to_string(),
            push_name: event.sender_display_name.clone().unwrap_or_default(),
            message_id: event.message_id.clone(),
            timestamp: event.timestamp_ms,
            is_group: event.is_group,
        }
    }
}

#[derive(Clone)]
pub struct WebhookForwarder {
    client: reqwest::Client,
    url: String,
    token: Option<Secret<String>>,
}

impl WebhookForwarder {
    pub fn new(client: reqwest::Client, url: impl Into<String>, token: Option<Secret<String>>) -> Self {
        Self {
            client,
            url: url.into(),
            token,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Post one payload. A non-2xx answer is an error.
    pub async fn forward(&self, payload: &WebhookPayload) -> anyhow::Result<()> {
        let mut req = self
            .client
            .post(&self.url)
            .timeout(REQUEST_TIMEOUT)
            .json(payload);
        if let Some(token) = &self.token {
            req = req.header(TOKEN_HEADER, token.expose_secret());
        }
        req.send().await?.error_for_status()?;
        debug!(message_id = %payload.message_id, "webhook delivered");
        Ok(())
    }

    /// Fire-and-forget: failures are logged, never retried.
    pub fn spawn_forward(&self, payload: WebhookPayload) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.forward(&payload).await {
                warn!(error = %e, message_id = %payload.message_id, "webhook forward failed");
            }
        })
    }
}
