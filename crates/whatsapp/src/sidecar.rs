//! Stdio sidecar transport: spawn an external provider process and talk to
//! it with newline-delimited JSON over stdin/stdout.
//!
//! Commands written to the child:
//! `{"op":"connect","credentials":…}`, `{"op":"send","id":n,"to":…,"content":…}`,
//! `{"op":"logout"}`.
//!
//! Events read from the child:
//! `creds`, `qr`, `open`, `close`, `message`, and `sent` (the answer to a
//! `send`, correlated by id).

use std::{
    collections::HashMap,
    process::Stdio,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    base64::Engine,
    serde::{Deserialize, Serialize},
    tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        process::{Child, ChildStdin, ChildStdout, Command},
        sync::{Mutex, oneshot},
    },
    tracing::{debug, trace, warn},
};

use {
    wabridge_channels::{
        CloseReason, ConnectionUpdate, EventSender, InboundMessage, Jid, OutboundContent,
        TransportError, TransportEvent, TransportProvider, TransportSession,
    },
    wabridge_config::TransportConfig,
};

const SEND_TIMEOUT: Duration = Duration::from_secs(30);

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum SidecarCommand<'a> {
    Connect {
        credentials: Option<&'a serde_json::Value>,
    },
    Send {
        id: u64,
        to: &'a str,
        content: WireContent,
    },
    Logout,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireContent {
    Text {
        text: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        mentions: Vec<String>,
    },
    Image {
        /// Base64-encoded image bytes.
        data: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
}

impl From<&OutboundContent> for WireContent {
    fn from(content: &OutboundContent) -> Self {
        match content {
            OutboundContent::Text { text, mentions } => Self::Text {
                text: text.clone(),
                mentions: mentions.iter().map(ToString::to_string).collect(),
            },
            OutboundContent::Image { bytes, caption } => Self::Image {
                data: base64::engine::general_purpose::STANDARD.encode(bytes),
                caption: caption.clone(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum SidecarEvent {
    Creds {
        creds: serde_json::Value,
    },
    Qr {
        qr: String,
    },
    Open {
        #[serde(default)]
        me: Option<Jid>,
    },
    Close {
        #[serde(default)]
        status: Option<u16>,
        #[serde(default)]
        reason: Option<String>,
    },
    Message {
        message: Box<InboundMessage>,
    },
    Sent {
        id: u64,
        #[serde(default)]
        error: Option<String>,
    },
}

type PendingSends = Arc<Mutex<HashMap<u64, oneshot::Sender<Option<String>>>>>;

// ── Provider ────────────────────────────────────────────────────────────────

/// Spawns one sidecar process per session.
pub struct SidecarProvider {
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
}

impl SidecarProvider {
    pub fn new(command: impl Into<String>, args: Vec<String>, env: HashMap<String, String>) -> Self {
        Self {
            command: command.into(),
            args,
            env,
        }
    }

    /// `None` when no sidecar command is configured.
    pub fn from_config(cfg: &TransportConfig) -> Option<Self> {
        let command = cfg.command.as_deref().filter(|c| !c.trim().is_empty())?;
        Some(Self::new(command, cfg.args.clone(), cfg.env.clone()))
    }
}

#[async_trait]
impl TransportProvider for SidecarProvider {
    fn id(&self) -> &str {
        "sidecar"
    }

    async fn connect(
        &self,
        credentials: Option<serde_json::Value>,
        events: EventSender,
    ) -> Result<Arc<dyn TransportSession>> {
        let session = SidecarSession::spawn(&self.command, &self.args, &self.env, events).await?;
        session
            .write(&SidecarCommand::Connect {
                credentials: credentials.as_ref(),
            })
            .await
            .context("failed to send connect command to sidecar")?;
        Ok(session as Arc<dyn TransportSession>)
    }
}

// ── Session ─────────────────────────────────────────────────────────────────

pub struct SidecarSession {
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    pending: PendingSends,
    next_id: AtomicU64,
    closed: Arc<AtomicBool>,
    reader: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SidecarSession {
    async fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        events: EventSender,
    ) -> Result<Arc<Self>> {
        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn transport sidecar: {command}"))?;

        let stdin = child.stdin.take().context("failed to capture sidecar stdin")?;
        let stdout = child.stdout.take().context("failed to capture sidecar stdout")?;
        debug!(command, pid = ?child.id(), "transport sidecar spawned");

        let pending: PendingSends = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_events(
            stdout,
            events,
            Arc::clone(&pending),
            Arc::clone(&closed),
        ));

        Ok(Arc::new(Self {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            pending,
            next_id: AtomicU64::new(1),
            closed,
            reader: Mutex::new(Some(reader)),
        }))
    }

    async fn write(&self, command: &SidecarCommand<'_>) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        let mut line = serde_json::to_string(command).map_err(|e| TransportError::Provider(e.to_string()))?;
        line.push('\n');

        let mut stdin = self.stdin.lock().await;
        let written = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        }
        .await;
        written.map_err(|e| {
            debug!(error = %e, "sidecar stdin write failed");
            TransportError::ConnectionClosed
        })
    }
}

#[async_trait]
impl TransportSession for SidecarSession {
    async fn send(&self, to: &Jid, content: &OutboundContent) -> Result<(), TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let command = SidecarCommand::Send {
            id,
            to: to.as_str(),
            content: content.into(),
        };
        trace!(id, to = %to, "bridge -> sidecar send");
        if let Err(e) = self.write(&command).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(SEND_TIMEOUT, rx).await {
            Ok(Ok(None)) => Ok(()),
            Ok(Ok(Some(error))) => Err(TransportError::Provider(error)),
            // Reader task ended: the sidecar is gone.
            Ok(Err(_)) => Err(TransportError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(TransportError::Provider("send timed out".into()))
            },
        }
    }

    async fn end_session(&self) -> Result<(), TransportError> {
        self.write(&SidecarCommand::Logout).await
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(handle) = self.reader.lock().await.take() {
            handle.abort();
        }
        self.pending.lock().await.clear();
        let mut child = self.child.lock().await;
        let _ = child.kill().await;
        debug!("transport sidecar stopped");
    }
}

async fn read_events(stdout: ChildStdout, events: EventSender, pending: PendingSends, closed: Arc<AtomicBool>) {
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();
    let reason = loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break "sidecar exited".to_string(),
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                trace!(raw = %trimmed, "sidecar -> bridge");
                match serde_json::from_str::<SidecarEvent>(trimmed) {
                    Ok(SidecarEvent::Sent { id, error }) => match pending.lock().await.remove(&id) {
                        Some(tx) => {
                            let _ = tx.send(error);
                        },
                        None => warn!(id, "sidecar acknowledged unknown send id"),
                    },
                    Ok(event) => {
                        let Some(event) = into_transport_event(event) else {
                            continue;
                        };
                        if events.send(event).is_err() {
                            debug!("event receiver dropped, stopping sidecar reader");
                            return;
                        }
                    },
                    Err(e) => warn!(error = %e, "unrecognized sidecar output"),
                }
            },
            Err(e) => break format!("sidecar stdout error: {e}"),
        }
    };

    closed.store(true, Ordering::SeqCst);
    pending.lock().await.clear();
    debug!(reason = %reason, "sidecar stream ended");
    let _ = events.send(TransportEvent::Connection(ConnectionUpdate::Close(CloseReason::new(
        None,
        Some(reason),
    ))));
}

/// Map a sidecar event onto the transport contract. Send acknowledgements
/// have no counterpart there.
fn into_transport_event(event: SidecarEvent) -> Option<TransportEvent> {
    let event = match event {
        SidecarEvent::Creds { creds } => TransportEvent::CredentialsUpdated(creds),
        SidecarEvent::Qr { qr } => TransportEvent::Connection(ConnectionUpdate::PairingChallenge(qr)),
        SidecarEvent::Open { me } => TransportEvent::Connection(ConnectionUpdate::Open { own_id: me }),
        SidecarEvent::Close { status, reason } => {
            TransportEvent::Connection(ConnectionUpdate::Close(CloseReason::new(status, reason)))
        },
        SidecarEvent::Message { message } => TransportEvent::Message(*message),
        SidecarEvent::Sent { .. } => return None,
    };
    Some(event)
}
