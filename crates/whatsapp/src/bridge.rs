//! Wiring of the core components from a [`BridgeConfig`].

use std::{sync::Arc, time::Duration};

use {
    anyhow::{Context, Result},
    secrecy::Secret,
    tracing::info,
};

use {
    wabridge_channels::{Jid, TransportProvider},
    wabridge_config::BridgeConfig,
};

use crate::{
    announce::BootAnnouncer,
    credentials::CredentialStore,
    lifecycle::{LifecycleManager, LifecycleOptions},
    router::MessageRouter,
    send::{Jitter, SendGateway},
    state::ConnectionState,
    webhook::WebhookForwarder,
};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Handles shared by the control plane and the binary.
#[derive(Clone)]
pub struct Bridge {
    pub conn: Arc<ConnectionState>,
    pub gateway: SendGateway,
    pub lifecycle: Arc<LifecycleManager>,
}

impl Bridge {
    pub fn new(config: &BridgeConfig, provider: Arc<dyn TransportProvider>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("wabridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        let conn = ConnectionState::new();
        let jitter = Jitter::new(
            Duration::from_millis(config.send.jitter_min_ms),
            Duration::from_millis(config.send.jitter_max_ms),
        );
        let gateway = SendGateway::new(Arc::clone(&conn), config.send.ready_timeout(), jitter);

        let webhook = config
            .webhook
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .map(|url| {
                WebhookForwarder::new(
                    http.clone(),
                    url,
                    config.webhook.token.clone().filter(|t| !t.is_empty()).map(Secret::new),
                )
            });
        if let Some(webhook) = &webhook {
            info!(url = webhook.url(), "forwarding inbound messages to webhook");
        }

        let router = MessageRouter::new(gateway.clone(), Arc::clone(&conn), http)
            .with_webhook(webhook)
            .with_fallback_text_mention(config.routing.fallback_text_mention);

        let targets: Vec<Jid> = config.announce.targets().into_iter().map(Jid::new).collect();
        let announcer = (!targets.is_empty()).then(|| {
            BootAnnouncer::new(
                gateway.clone(),
                targets,
                config.announce.resolved_server_name(),
                config.session.store_dir.clone(),
            )
        });

        let lifecycle = LifecycleManager::new(
            provider,
            Arc::clone(&conn),
            CredentialStore::new(&config.session.store_dir),
            Arc::new(router),
            LifecycleOptions::from(&config.session),
        )
        .with_announcer(announcer);

        Ok(Self {
            conn,
            gateway,
            lifecycle: Arc::new(lifecycle),
        })
    }

    /// Spawn the lifecycle supervisor.
    pub fn spawn(&self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(Arc::clone(&self.lifecycle).run())
    }
}
