//! Process-wide connection state.
//!
//! [`ConnectionState`] is shared by every component, but only the lifecycle
//! manager mutates it; everyone else reads through the accessors.

use std::{sync::Arc, time::Duration};

use {
    serde::Serialize,
    tokio::sync::{RwLock, watch},
    tracing::{debug, warn},
};

use wabridge_channels::{Jid, TransportSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Ready,
    Resetting,
}

impl SessionState {
    /// Allowed transitions of the session state machine.
    pub fn can_transition(self, next: Self) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Disconnected | Connecting | Ready, Disconnected)
                | (Disconnected, Connecting)
                | (Connecting, Ready)
                | (Disconnected, Resetting)
                | (Resetting, Disconnected)
        )
    }
}

pub struct ConnectionState {
    state: watch::Sender<SessionState>,
    session: RwLock<Option<Arc<dyn TransportSession>>>,
    own_id: RwLock<Option<Jid>>,
    pending_qr: RwLock<Option<String>>,
}

impl ConnectionState {
    pub fn new() -> Arc<Self> {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Arc::new(Self {
            state,
            session: RwLock::new(None),
            own_id: RwLock::new(None),
            pending_qr: RwLock::new(None),
        })
    }

    pub fn current(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.current() == SessionState::Ready
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Suspend until the state is [`SessionState::Ready`] or `timeout` elapses.
    ///
    /// Returns whether the session is ready.
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        let mut rx = self.state.subscribe();
        let ready = tokio::time::timeout(timeout, rx.wait_for(|s| *s == SessionState::Ready)).await;
        matches!(ready, Ok(Ok(_)))
    }

    /// The live transport handle, if any.
    pub async fn session(&self) -> Option<Arc<dyn TransportSession>> {
        self.session.read().await.clone()
    }

    /// Our own address as reported when the session opened.
    pub async fn own_id(&self) -> Option<Jid> {
        self.own_id.read().await.clone()
    }

    /// The pairing challenge waiting to be scanned.
    pub async fn pending_qr(&self) -> Option<String> {
        self.pending_qr.read().await.clone()
    }

    // ── Lifecycle-only mutators ─────────────────────────────────────────────

    /// Move to `next` if the state machine allows it. Returns whether it moved.
    pub(crate) fn transition(&self, next: SessionState) -> bool {
        let mut moved = false;
        self.state.send_if_modified(|current| {
            if current.can_transition(next) {
                debug!(from = ?*current, to = ?next, "session state transition");
                moved = true;
                let changed = *current != next;
                *current = next;
                changed
            } else {
                warn!(from = ?*current, to = ?next, "refusing invalid session state transition");
                false
            }
        });
        moved
    }

    /// Move to [`SessionState::Disconnected`] unless a reset holds the state;
    /// only the reset itself leaves [`SessionState::Resetting`].
    pub(crate) fn disconnect(&self) -> bool {
        let mut moved = false;
        self.state.send_if_modified(|current| {
            if *current == SessionState::Resetting {
                debug!("disconnect left to the running reset");
                return false;
            }
            moved = true;
            let changed = *current != SessionState::Disconnected;
            *current = SessionState::Disconnected;
            changed
        });
        moved
    }

    pub(crate) async fn set_session(&self, session: Option<Arc<dyn TransportSession>>) {
        *self.session.write().await = session;
    }

    pub(crate) async fn take_session(&self) -> Option<Arc<dyn TransportSession>> {
        self.session.write().await.take()
    }

    pub(crate) async fn set_own_id(&self, own_id: Option<Jid>) {
        *self.own_id.write().await = own_id;
    }

    pub(crate) async fn set_pending_qr(&self, qr: Option<String>) {
        *self.pending_qr.write().await = qr;
    }
}
