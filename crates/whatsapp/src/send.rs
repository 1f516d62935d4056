//! Readiness-gated outbound path.
//!
//! Every outbound message goes through [`SendGateway::send`]: it waits for
//! the session to be ready, pauses for a short human-like delay, then calls
//! the transport. A send that fails because the connection closed is retried
//! exactly once after the session is ready again.

use std::{sync::Arc, time::Duration};

use {
    rand::Rng,
    thiserror::Error,
    tracing::{debug, warn},
};

use wabridge_channels::{Jid, OutboundContent, TransportError};

use crate::state::ConnectionState;

#[derive(Debug, Error)]
pub enum SendError {
    /// The session did not become ready within the wait window.
    #[error("not-ready-timeout")]
    NotReady,

    #[error("send failed: {0}")]
    Transport(#[source] TransportError),
}

impl SendError {
    /// Whether the caller may reasonably try again later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NotReady)
    }
}

/// Random pause before each outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jitter {
    min: Duration,
    max: Duration,
}

impl Jitter {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let ms = rand::rng().random_range(self.min.as_millis()..=self.max.as_millis());
        Duration::from_millis(ms as u64)
    }

    async fn pause(&self) {
        let delay = self.sample();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[derive(Clone)]
pub struct SendGateway {
    conn: Arc<ConnectionState>,
    ready_timeout: Duration,
    jitter: Jitter,
}

impl SendGateway {
    pub fn new(conn: Arc<ConnectionState>, ready_timeout: Duration, jitter: Jitter) -> Self {
        Self {
            conn,
            ready_timeout,
            jitter,
        }
    }

    pub async fn send_text(&self, to: &Jid, text: impl Into<String>) -> Result<(), SendError> {
        self.send(to, OutboundContent::text(text)).await
    }

    pub async fn send(&self, to: &Jid, content: OutboundContent) -> Result<(), SendError> {
        self.wait_ready().await?;
        self.jitter.pause().await;

        match self.attempt(to, &content).await {
            Ok(()) => Ok(()),
            Err(SendError::Transport(e)) if e.is_connection_closed() => {
                warn!(to = %to, "send failed: connection closed, waiting and retrying once");
                self.wait_ready().await?;
                self.attempt(to, &content).await
            },
            Err(e) => Err(e),
        }
    }

    async fn wait_ready(&self) -> Result<(), SendError> {
        if self.conn.wait_ready(self.ready_timeout).await {
            Ok(())
        } else {
            Err(SendError::NotReady)
        }
    }

    async fn attempt(&self, to: &Jid, content: &OutboundContent) -> Result<(), SendError> {
        // The state can flip between the readiness check and here.
        if !self.conn.is_ready() {
            return Err(SendError::Transport(TransportError::ConnectionClosed));
        }
        let Some(session) = self.conn.session().await else {
            return Err(SendError::Transport(TransportError::ConnectionClosed));
        };
        debug!(to = %to, "sending");
        session.send(to, content).await.map_err(SendError::Transport)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::VecDeque,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use {async_trait::async_trait, tokio::sync::Mutex};

    use wabridge_channels::TransportSession;

    use {super::*, crate::state::SessionState};

    /// Transport session double that records sends and replays scripted results.
    #[derive(Default)]
    pub(crate) struct RecordingSession {
        pub sent: Mutex<Vec<(Jid, OutboundContent)>>,
        pub calls: AtomicUsize,
        pub script: Mutex<VecDeque<Result<(), TransportError>>>,
        pub ended: AtomicUsize,
        pub closed: AtomicUsize,
    }

    impl RecordingSession {
        pub(crate) fn scripted(results: Vec<Result<(), TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(results.into()),
                ..Default::default()
            })
        }

        pub(crate) async fn texts(&self) -> Vec<String> {
            self.sent
                .lock()
                .await
                .iter()
                .filter_map(|(_, c)| match c {
                    OutboundContent::Text { text, .. } => Some(text.clone()),
                    OutboundContent::Image { .. } => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl TransportSession for RecordingSession {
        async fn send(&self, to: &Jid, content: &OutboundContent) -> Result<(), TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = self.script.lock().await.pop_front().unwrap_or(Ok(()));
            if result.is_ok() {
                self.sent.lock().await.push((to.clone(), content.clone()));
            }
            result
        }

        async fn end_session(&self) -> Result<(), TransportError> {
            self.ended.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) async fn ready_conn(session: Arc<RecordingSession>) -> Arc<ConnectionState> {
        let conn = ConnectionState::new();
        conn.set_session(Some(session as Arc<dyn TransportSession>))
            .await;
        conn.transition(SessionState::Connecting);
        conn.transition(SessionState::Ready);
        conn
    }

    fn gateway(conn: Arc<ConnectionState>) -> SendGateway {
        SendGateway::new(conn, Duration::from_secs(15), Jitter::none())
    }

    fn to() -> Jid {
        Jid::from("628123456789@s.whatsapp.net")
    }

    #[tokio::test(start_paused = true)]
    async fn sends_once_when_ready() {
        let session = RecordingSession::scripted(vec![]);
        let conn = ready_conn(Arc::clone(&session)).await;

        gateway(conn).send_text(&to(), "halo").await.unwrap();

        assert_eq!(session.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.texts().await, vec!["halo"]);
    }

    #[tokio::test(start_paused = true)]
    async fn never_calls_transport_while_not_ready() {
        let session = RecordingSession::scripted(vec![]);
        let conn = ConnectionState::new();
        conn.set_session(Some(session.clone() as Arc<dyn TransportSession>))
            .await;
        conn.transition(SessionState::Connecting);

        let err = gateway(conn).send_text(&to(), "halo").await.unwrap_err();

        assert!(matches!(err, SendError::NotReady));
        assert!(err.is_transient());
        assert_eq!(session.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_ready_within_window() {
        let session = RecordingSession::scripted(vec![]);
        let conn = ConnectionState::new();
        conn.set_session(Some(session.clone() as Arc<dyn TransportSession>))
            .await;
        conn.transition(SessionState::Connecting);

        let gw = gateway(Arc::clone(&conn));
        let send = tokio::spawn(async move { gw.send_text(&to(), "halo").await });

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(session.calls.load(Ordering::SeqCst), 0);
        conn.transition(SessionState::Ready);

        send.await.unwrap().unwrap();
        assert_eq!(session.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_once_on_connection_closed() {
        let session = RecordingSession::scripted(vec![Err(TransportError::ConnectionClosed)]);
        let conn = ready_conn(Arc::clone(&session)).await;

        gateway(conn).send_text(&to(), "halo").await.unwrap();

        assert_eq!(session.calls.load(Ordering::SeqCst), 2);
        assert_eq!(session.texts().await, vec!["halo"]);
    }

    #[tokio::test(start_paused = true)]
    async fn second_failure_is_permanent() {
        let session = RecordingSession::scripted(vec![
            Err(TransportError::ConnectionClosed),
            Err(TransportError::Provider("Connection Closed".into())),
        ]);
        let conn = ready_conn(Arc::clone(&session)).await;

        let err = gateway(conn).send_text(&to(), "halo").await.unwrap_err();

        assert!(matches!(err, SendError::Transport(_)));
        assert!(!err.is_transient());
        assert_eq!(session.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_are_not_retried() {
        let session =
            RecordingSession::scripted(vec![Err(TransportError::Provider("not-acceptable".into()))]);
        let conn = ready_conn(Arc::clone(&session)).await;

        let err = gateway(conn).send_text(&to(), "halo").await.unwrap_err();

        assert!(matches!(err, SendError::Transport(TransportError::Provider(_))));
        assert_eq!(session.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pauses_for_jitter_before_transport_call() {
        let session = RecordingSession::scripted(vec![]);
        let conn = ready_conn(Arc::clone(&session)).await;
        let jitter = Jitter::new(Duration::from_millis(300), Duration::from_millis(1200));
        let gw = SendGateway::new(conn, Duration::from_secs(15), jitter);

        let started = tokio::time::Instant::now();
        let send = tokio::spawn(async move { gw.send_text(&to(), "halo").await });

        tokio::time::sleep(Duration::from_millis(299)).await;
        assert_eq!(session.calls.load(Ordering::SeqCst), 0);

        send.await.unwrap().unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "sent after {elapsed:?}");
        assert!(elapsed <= Duration::from_millis(1200), "sent after {elapsed:?}");
        assert_eq!(session.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn jitter_stays_in_range() {
        let jitter = Jitter::new(Duration::from_millis(300), Duration::from_millis(1200));
        for _ in 0..200 {
            let d = jitter.sample();
            assert!(d >= Duration::from_millis(300) && d <= Duration::from_millis(1200));
        }
        assert_eq!(Jitter::none().sample(), Duration::ZERO);
    }
}
