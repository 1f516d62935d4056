//! Session lifecycle: bring-up, close classification, reconnect and reset.
//!
//! [`LifecycleManager`] is the only writer of [`ConnectionState`]. Transport
//! events of one session are consumed by a single dispatch task; messages
//! are handed to a per-session worker so a slow reply never holds up
//! connection updates.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    anyhow::{Context, Result, bail},
    tokio::sync::{Mutex, mpsc},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use {
    wabridge_channels::{CloseReason, ConnectionUpdate, InboundMessage, TransportEvent, TransportProvider},
    wabridge_config::SessionConfig,
};

use crate::{
    announce::BootAnnouncer,
    credentials::CredentialStore,
    reconnect::ReconnectTimer,
    router::InboundHandler,
    state::{ConnectionState, SessionState},
};

/// Delays used by the lifecycle manager.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleOptions {
    /// After an ordinary close.
    pub reconnect_delay: Duration,
    /// After the start sequence itself failed.
    pub start_retry_delay: Duration,
    /// After a logout or reset requested over the control plane.
    pub control_reconnect_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for LifecycleOptions {
    fn from(cfg: &SessionConfig) -> Self {
        Self {
            reconnect_delay: cfg.reconnect_delay(),
            start_retry_delay: cfg.start_retry_delay(),
            control_reconnect_delay: cfg.control_reconnect_delay(),
        }
    }
}

pub struct LifecycleManager {
    provider: Arc<dyn TransportProvider>,
    conn: Arc<ConnectionState>,
    store: CredentialStore,
    inbound: Arc<dyn InboundHandler>,
    announcer: Option<Arc<BootAnnouncer>>,
    options: LifecycleOptions,
    timer: ReconnectTimer,
    ticks: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
    starting: AtomicBool,
    announced_boot: AtomicBool,
    /// Bumped whenever a session is abandoned; events tagged with an older
    /// generation are dropped.
    generation: AtomicU64,
    shutdown: CancellationToken,
}

impl LifecycleManager {
    pub fn new(
        provider: Arc<dyn TransportProvider>,
        conn: Arc<ConnectionState>,
        store: CredentialStore,
        inbound: Arc<dyn InboundHandler>,
        options: LifecycleOptions,
    ) -> Self {
        let (timer, ticks) = ReconnectTimer::new();
        Self {
            provider,
            conn,
            store,
            inbound,
            announcer: None,
            options,
            timer,
            ticks: Mutex::new(Some(ticks)),
            starting: AtomicBool::new(false),
            announced_boot: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_announcer(mut self, announcer: Option<BootAnnouncer>) -> Self {
        self.announcer = announcer.map(Arc::new);
        self
    }

    pub fn conn(&self) -> &Arc<ConnectionState> {
        &self.conn
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn provider_id(&self) -> &str {
        self.provider.id()
    }

    /// A start is in flight (connecting, not yet open or closed).
    pub fn is_starting(&self) -> bool {
        self.starting.load(Ordering::SeqCst)
    }

    pub fn boot_announced(&self) -> bool {
        self.announced_boot.load(Ordering::SeqCst)
    }

    /// Supervisor loop: start a session now and again on every reconnect
    /// tick, until [`shutdown`](Self::shutdown).
    pub async fn run(self: Arc<Self>) {
        let Some(mut ticks) = self.ticks.lock().await.take() else {
            warn!("lifecycle supervisor already running");
            return;
        };
        info!(provider = self.provider.id(), "lifecycle supervisor started");
        self.start().await;
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                tick = ticks.recv() => match tick {
                    Some(()) => self.start().await,
                    None => break,
                },
            }
        }
        debug!("lifecycle supervisor stopped");
    }

    /// Open a new session if none is open or opening.
    pub async fn start(self: &Arc<Self>) {
        if self.shutdown.is_cancelled() {
            return;
        }
        if self.conn.current() != SessionState::Disconnected {
            debug!(state = ?self.conn.current(), "start ignored, session not disconnected");
            return;
        }
        if self.starting.swap(true, Ordering::SeqCst) {
            debug!("start ignored, already in flight");
            return;
        }
        if !self.conn.transition(SessionState::Connecting) {
            self.starting.store(false, Ordering::SeqCst);
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Err(e) = self.open_session(generation).await {
            error!(error = %e, "session start failed");
            self.starting.store(false, Ordering::SeqCst);
            self.conn.disconnect();
            self.timer.schedule(self.options.start_retry_delay).await;
        }
    }

    /// Ask the supervisor to start a session right away unless one is
    /// already open or opening.
    pub async fn request_start(&self) {
        if self.conn.current() == SessionState::Disconnected && !self.is_starting() {
            self.timer.fire_now().await;
        }
    }

    async fn open_session(self: &Arc<Self>, generation: u64) -> Result<()> {
        self.store.ensure_dir().await?;
        let credentials = self.store.load().await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let session = self
            .provider
            .connect(credentials, tx)
            .await
            .with_context(|| format!("{} transport failed to connect", self.provider.id()))?;

        if !self.is_current(generation) {
            // Logged out or reset while connecting.
            session.close().await;
            return Ok(());
        }
        self.conn.set_session(Some(session)).await;
        info!(generation, "transport session opening");

        let this = Arc::clone(self);
        tokio::spawn(async move { this.dispatch(generation, rx).await });
        Ok(())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn abandon_session(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    async fn dispatch(self: Arc<Self>, generation: u64, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        let (messages, mut queue) = mpsc::unbounded_channel::<InboundMessage>();
        let inbound = Arc::clone(&self.inbound);
        tokio::spawn(async move {
            while let Some(message) = queue.recv().await {
                inbound.handle(message).await;
            }
        });

        while let Some(event) = events.recv().await {
            if !self.is_current(generation) {
                debug!(generation, "dropping events of an abandoned session");
                break;
            }
            match event {
                TransportEvent::CredentialsUpdated(creds) => {
                    if let Err(e) = self.store.save(&creds).await {
                        warn!(error = %e, "failed to persist credentials");
                    }
                },
                TransportEvent::Connection(update) => self.on_connection_update(update).await,
                TransportEvent::Message(message) => {
                    if messages.send(message).is_err() {
                        debug!(generation, "message worker gone, dropping inbound message");
                    }
                },
            }
        }
        debug!(generation, "event stream ended");
    }

    async fn on_connection_update(&self, update: ConnectionUpdate) {
        match update {
            ConnectionUpdate::PairingChallenge(qr) => {
                if self.conn.current() == SessionState::Connecting {
                    self.conn.set_pending_qr(Some(qr)).await;
                    info!("pairing challenge updated, open /qr to scan");
                } else {
                    debug!(state = ?self.conn.current(), "pairing challenge ignored");
                }
            },
            ConnectionUpdate::Open { own_id } => {
                self.conn.set_pending_qr(None).await;
                self.conn.set_own_id(own_id).await;
                if !self.conn.transition(SessionState::Ready) {
                    return;
                }
                self.starting.store(false, Ordering::SeqCst);
                info!("transport connected");
                self.announce_boot_once();
            },
            ConnectionUpdate::Close(reason) => self.on_close(reason).await,
        }
    }

    fn announce_boot_once(&self) {
        if self.announced_boot.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(announcer) = &self.announcer {
            let announcer = Arc::clone(announcer);
            tokio::spawn(async move { announcer.announce().await });
        }
    }

    async fn on_close(&self, reason: CloseReason) {
        warn!(status = ?reason.status, reason = ?reason.message, "connection closed");
        self.abandon_session();
        self.starting.store(false, Ordering::SeqCst);
        self.conn.set_pending_qr(None).await;
        self.conn.disconnect();
        if let Some(session) = self.conn.take_session().await {
            session.close().await;
        }

        if reason.is_logged_out() {
            warn!("session logged out, resetting credential store");
            if let Err(e) = self.wipe_session().await {
                error!(error = %e, "failed to reset credential store");
            }
        }
        self.timer.schedule(self.options.reconnect_delay).await;
    }

    /// Drop the live session and destroy its credentials, leaving an empty
    /// store and a re-armed boot announcement.
    async fn wipe_session(&self) -> Result<()> {
        self.conn.disconnect();
        if !self.conn.transition(SessionState::Resetting) {
            bail!("session reset already in progress");
        }
        self.abandon_session();
        if let Some(session) = self.conn.take_session().await {
            session.close().await;
        }
        self.conn.set_pending_qr(None).await;
        self.conn.set_own_id(None).await;

        let result = self.store.reset().await;
        self.announced_boot.store(false, Ordering::SeqCst);
        self.starting.store(false, Ordering::SeqCst);
        self.conn.transition(SessionState::Disconnected);
        result
    }

    /// Unlink the session and destroy its credentials; a fresh pairing
    /// starts shortly after.
    pub async fn reset_session(&self) -> Result<()> {
        info!("session reset requested");
        // Abandon first: the close the provider answers with must not start
        // a second reset.
        self.abandon_session();
        self.starting.store(false, Ordering::SeqCst);
        if let Some(session) = self.conn.take_session().await {
            if let Err(e) = session.end_session().await {
                debug!(error = %e, "end session before reset failed");
            }
            session.close().await;
        }
        let result = self.wipe_session().await;
        self.timer.schedule(self.options.control_reconnect_delay).await;
        result
    }

    /// End the session without touching stored credentials and schedule a
    /// reconnect.
    pub async fn logout(&self) {
        info!("logout requested");
        self.abandon_session();
        if let Some(session) = self.conn.take_session().await {
            if let Err(e) = session.end_session().await {
                warn!(error = %e, "graceful session end failed");
            }
            session.close().await;
        }
        self.conn.set_pending_qr(None).await;
        self.starting.store(false, Ordering::SeqCst);
        self.conn.disconnect();
        self.timer.schedule(self.options.control_reconnect_delay).await;
    }

    /// Stop the supervisor and close the live session.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.timer.cancel().await;
        self.abandon_session();
        if let Some(session) = self.conn.take_session().await {
            session.close().await;
        }
        self.conn.disconnect();
        info!("lifecycle shut down");
    }
}
