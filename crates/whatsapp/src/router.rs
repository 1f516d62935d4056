//! Inbound message pipeline: text extraction, webhook fan-out, group
//! admission and command dispatch.

use std::sync::Arc;

use {
    async_trait::async_trait,
    bytes::{Bytes, BytesMut},
    thiserror::Error,
    tracing::{debug, info, warn},
};

use wabridge_channels::{InboundMessage, Jid, MessagePayload, OutboundContent};

use crate::{
    clock,
    commands::{self, Command, NormalizedCommand},
    extract,
    send::{SendError, SendGateway},
    state::ConnectionState,
    webhook::{WebhookForwarder, WebhookPayload},
};

/// Largest image `foto` will download.
pub const MAX_IMAGE_BYTES: usize = 16 * 1024 * 1024;

/// Receives every message the transport delivers.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle(&self, message: InboundMessage);
}

/// Canonical view of one inbound message.
#[derive(Debug, Clone)]
pub struct InboundMessageEvent {
    /// Author of the message: the participant in groups, the chat otherwise.
    pub sender_id: Jid,
    pub conversation_id: Jid,
    pub is_group: bool,
    pub raw_payload: MessagePayload,
    pub timestamp_ms: u64,
    pub sender_display_name: Option<String>,
    pub message_id: String,
    pub mentions: Vec<Jid>,
}

impl InboundMessageEvent {
    /// Returns `None` for messages we sent ourselves.
    pub fn from_message(msg: InboundMessage) -> Option<Self> {
        if msg.key.from_me {
            return None;
        }
        let conversation_id = msg.key.remote_jid;
        let is_group = conversation_id.is_group();
        let sender_id = match msg.key.participant {
            Some(p) if is_group => p,
            _ => conversation_id.clone(),
        };
        let raw_payload = msg.message.unwrap_or_default();
        let mentions = extract::mentioned_jids(&raw_payload);
        Some(Self {
            sender_id,
            conversation_id,
            is_group,
            raw_payload,
            timestamp_ms: msg.message_timestamp.saturating_mul(1000),
            sender_display_name: msg.push_name.filter(|n| !n.is_empty()),
            message_id: msg.key.id,
            mentions,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    OwnMessage,
    NoText,
    NotAdmitted,
    Unmatched,
    Replied(&'static str),
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("reply to {to} failed: {source}")]
    Reply {
        to: Jid,
        #[source]
        source: SendError,
    },
}

pub struct MessageRouter {
    gateway: SendGateway,
    conn: Arc<ConnectionState>,
    http: reqwest::Client,
    webhook: Option<WebhookForwarder>,
    fallback_text_mention: bool,
    max_image_bytes: usize,
}

impl MessageRouter {
    pub fn new(gateway: SendGateway, conn: Arc<ConnectionState>, http: reqwest::Client) -> Self {
        Self {
            gateway,
            conn,
            http,
            webhook: None,
            fallback_text_mention: true,
            max_image_bytes: MAX_IMAGE_BYTES,
        }
    }

    pub fn with_webhook(mut self, webhook: Option<WebhookForwarder>) -> Self {
        self.webhook = webhook;
        self
    }

    pub fn with_fallback_text_mention(mut self, enabled: bool) -> Self {
        self.fallback_text_mention = enabled;
        self
    }

    pub fn with_max_image_bytes(mut self, max: usize) -> Self {
        self.max_image_bytes = max;
        self
    }

    pub async fn route(&self, msg: InboundMessage) -> Result<RouteOutcome, RouteError> {
        let Some(event) = InboundMessageEvent::from_message(msg) else {
            return Ok(RouteOutcome::OwnMessage);
        };
        let text = extract::extract_text(&event.raw_payload);
        info!(
            from = %event.conversation_id,
            push_name = event.sender_display_name.as_deref().unwrap_or(""),
            text = %text,
            "incoming message"
        );

        if let Some(webhook) = &self.webhook
            && !text.is_empty()
        {
            webhook.spawn_forward(WebhookPayload::new(&event, &text));
        }

        if text.is_empty() {
            return Ok(RouteOutcome::NoText);
        }

        let own_id = self.conn.own_id().await;
        if !admits(&event, &text, own_id.as_ref(), self.fallback_text_mention) {
            debug!(group = %event.conversation_id, "group message without mention dropped");
            return Ok(RouteOutcome::NotAdmitted);
        }

        let normalized = NormalizedCommand::parse(event.conversation_id.clone(), &text);
        let Some(command) = Command::from_normalized(&normalized) else {
            return Ok(RouteOutcome::Unmatched);
        };
        self.execute(&event, &command).await?;
        Ok(RouteOutcome::Replied(command.name()))
    }

    async fn execute(&self, event: &InboundMessageEvent, command: &Command) -> Result<(), RouteError> {
        let to = &event.conversation_id;
        match command {
            Command::Ping => self.reply(to, commands::PONG).await,
            Command::Menu => self.reply(to, commands::MENU_TEXT).await,
            Command::Info => {
                self.reply(to, commands::info_text(event.sender_display_name.as_deref()))
                    .await
            },
            Command::Time => self.reply(to, commands::time_text(&clock::now_wib())).await,
            Command::Id => self.reply(to, commands::id_text(&event.sender_id)).await,
            Command::Echo(text) => self.reply(to, text.as_str()).await,
            Command::Photo(url) => self.send_photo(to, url).await,
        }
    }

    async fn send_photo(&self, to: &Jid, url: &str) -> Result<(), RouteError> {
        if !commands::is_http_url(url) {
            return self.reply(to, commands::INVALID_URL_TEXT).await;
        }
        match self.fetch_image(url).await {
            Ok(bytes) => {
                let content = OutboundContent::Image {
                    bytes,
                    caption: Some(commands::photo_caption(url)),
                };
                self.gateway
                    .send(to, content)
                    .await
                    .map_err(|source| RouteError::Reply { to: to.clone(), source })
            },
            Err(reason) => {
                warn!(url, reason = %reason, "image fetch failed");
                self.reply(to, commands::fetch_failed_text(&reason)).await
            },
        }
    }

    /// Download `url`, describing any failure in a user-facing string.
    async fn fetch_image(&self, url: &str) -> Result<Bytes, String> {
        let mut resp = self.http.get(url).send().await.map_err(|e| e.to_string())?;
        let status = resp.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or_default();
            return Err(format!("{} {reason}", status.as_u16()).trim_end().to_string());
        }
        let too_large = || format!("ukuran melebihi {} byte", self.max_image_bytes);
        if resp
            .content_length()
            .is_some_and(|len| len > self.max_image_bytes as u64)
        {
            return Err(too_large());
        }
        let mut body = BytesMut::new();
        while let Some(chunk) = resp.chunk().await.map_err(|e| e.to_string())? {
            if body.len() + chunk.len() > self.max_image_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }

    async fn reply(&self, to: &Jid, text: impl Into<String>) -> Result<(), RouteError> {
        self.gateway
            .send_text(to, text)
            .await
            .map_err(|source| RouteError::Reply { to: to.clone(), source })
    }
}

#[async_trait]
impl InboundHandler for MessageRouter {
    async fn handle(&self, message: InboundMessage) {
        match self.route(message).await {
            Ok(RouteOutcome::Replied(command)) => debug!(command, "command handled"),
            Ok(outcome) => debug!(?outcome, "message routed"),
            Err(e) => warn!(error = %e, "failed to process inbound message"),
        }
    }
}

// ── Group admission ─────────────────────────────────────────────────────────

/// Private chats always pass. Group messages need an explicit mention of
/// our own address, or (when enabled) a textual hint that addresses the bot.
pub fn admits(event: &InboundMessageEvent, text: &str, own_id: Option<&Jid>, fallback: bool) -> bool {
    if !event.is_group {
        return true;
    }
    let me = own_id.map(Jid::normalized_user);
    if let Some(me) = &me
        && event.mentions.contains(me)
    {
        return true;
    }
    if !fallback {
        return false;
    }
    let suffix_hit = me.as_ref().is_some_and(|me| {
        let user = me.user();
        let start = user.char_indices().rev().nth(6).map_or(0, |(i, _)| i);
        let suffix = &user[start..];
        !suffix.is_empty() && text.contains(suffix)
    });
    suffix_hit || mentions_bot_word(text)
}

/// Case-insensitive whole-word `bot`, `wabot` or `wa-bot`.
fn mentions_bot_word(text: &str) -> bool {
    text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|word| word.eq_ignore_ascii_case("bot") || word.eq_ignore_ascii_case("wabot"))
}

#[cfg(test)]
mod tests {
    use std::{sync::atomic::Ordering, time::Duration};

    use wabridge_channels::MessageKey;

    use {
        super::*,
        crate::send::{
            Jitter,
            tests::{RecordingSession, ready_conn},
        },
    };

    const ME: &str = "6281234567890:3@s.whatsapp.net";
    const GROUP: &str = "120363000000@g.us";
    const ALICE: &str = "628999000111@s.whatsapp.net";

    fn message(from: &str, participant: Option<&str>, payload: serde_json::Value) -> InboundMessage {
        InboundMessage {
            key: MessageKey {
                remote_jid: Jid::from(from),
                from_me: false,
                id: "MSG1".into(),
                participant: participant.map(Jid::from),
            },
            push_name: Some("Alice".into()),
            message_timestamp: 1_700_000_000,
            message: Some(serde_json::from_value(payload).unwrap()),
        }
    }

    fn text(from: &str, body: &str) -> InboundMessage {
        message(from, None, serde_json::json!({"conversation": body}))
    }

    fn group_text(body: &str) -> InboundMessage {
        message(GROUP, Some(ALICE), serde_json::json!({"conversation": body}))
    }

    async fn router(fallback: bool) -> (MessageRouter, Arc<RecordingSession>) {
        router_with_jitter(fallback, Jitter::none()).await
    }

    async fn router_with_jitter(fallback: bool, jitter: Jitter) -> (MessageRouter, Arc<RecordingSession>) {
        let session = Arc::new(RecordingSession::default());
        let conn = ready_conn(Arc::clone(&session)).await;
        conn.set_own_id(Some(Jid::from(ME))).await;
        let gateway = SendGateway::new(Arc::clone(&conn), Duration::from_secs(1), jitter);
        let router = MessageRouter::new(gateway, conn, reqwest::Client::new())
            .with_fallback_text_mention(fallback);
        (router, session)
    }

    #[tokio::test]
    async fn ping_gets_pong() {
        let (router, session) = router(true).await;
        let outcome = router.route(text(ALICE, "ping")).await.unwrap();
        assert_eq!(outcome, RouteOutcome::Replied("ping"));
        assert_eq!(session.texts().await, vec!["pong"]);
        assert_eq!(session.sent.lock().await[0].0, Jid::from(ALICE));
    }

    #[tokio::test(start_paused = true)]
    async fn pong_arrives_within_jitter_window() {
        let jitter = Jitter::new(Duration::from_millis(300), Duration::from_millis(1200));
        let (router, session) = router_with_jitter(false, jitter).await;

        let started = tokio::time::Instant::now();
        router.route(text(ALICE, "ping")).await.unwrap();
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(300), "replied after {elapsed:?}");
        assert!(elapsed <= Duration::from_millis(1200), "replied after {elapsed:?}");
        assert_eq!(session.texts().await, vec!["pong"]);
    }

    #[tokio::test]
    async fn balas_echoes_remainder_verbatim() {
        let (router, session) = router(true).await;
        router.route(text(ALICE, "BALAS hello")).await.unwrap();
        assert_eq!(session.texts().await, vec!["hello"]);
    }

    #[tokio::test]
    async fn own_messages_are_skipped() {
        let (router, session) = router(true).await;
        let mut msg = text(ALICE, "ping");
        msg.key.from_me = true;
        assert_eq!(router.route(msg).await.unwrap(), RouteOutcome::OwnMessage);
        assert_eq!(session.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_text_stops() {
        let (router, _) = router(true).await;
        let msg = message(ALICE, None, serde_json::json!({"stickerMessage": {}}));
        assert_eq!(router.route(msg).await.unwrap(), RouteOutcome::NoText);
    }

    #[tokio::test]
    async fn invalid_photo_url_yields_error_reply() {
        let (router, session) = router(true).await;
        router.route(text(ALICE, "foto not-a-url")).await.unwrap();
        assert_eq!(session.texts().await, vec![commands::INVALID_URL_TEXT]);
    }

    #[tokio::test]
    async fn photo_is_fetched_and_sent() {
        let mut server = mockito::Server::new_async().await;
        let _img = server
            .mock("GET", "/cat.png")
            .with_status(200)
            .with_body([0x89, b'P', b'N', b'G'])
            .create_async()
            .await;
        let url = format!("{}/cat.png", server.url());

        let (router, session) = router(true).await;
        router.route(text(ALICE, &format!("foto {url}"))).await.unwrap();

        let sent = session.sent.lock().await;
        match &sent[0].1 {
            OutboundContent::Image { bytes, caption } => {
                assert_eq!(bytes.as_ref(), &[0x89, b'P', b'N', b'G']);
                assert_eq!(caption.as_deref(), Some(format!("📷 dari URL: {url}").as_str()));
            },
            other => panic!("expected image, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn photo_fetch_failure_names_status() {
        let mut server = mockito::Server::new_async().await;
        let _img = server.mock("GET", "/gone").with_status(404).create_async().await;

        let (router, session) = router(true).await;
        router
            .route(text(ALICE, &format!("foto {}/gone", server.url())))
            .await
            .unwrap();
        assert_eq!(session.texts().await, vec!["❌ Gagal ambil gambar: 404 Not Found"]);
    }

    #[tokio::test]
    async fn oversized_photo_is_refused() {
        let mut server = mockito::Server::new_async().await;
        let _img = server
            .mock("GET", "/big.png")
            .with_status(200)
            .with_body(vec![0u8; 64])
            .create_async()
            .await;

        let (router, session) = router(true).await;
        let router = router.with_max_image_bytes(16);
        router
            .route(text(ALICE, &format!("foto {}/big.png", server.url())))
            .await
            .unwrap();
        assert_eq!(session.texts().await, vec!["❌ Gagal ambil gambar: ukuran melebihi 16 byte"]);
        assert!(
            session
                .sent
                .lock()
                .await
                .iter()
                .all(|(_, c)| matches!(c, OutboundContent::Text { .. }))
        );
    }

    #[tokio::test]
    async fn unknown_command_is_silent_but_forwarded() {
        let mut server = mockito::Server::new_async().await;
        let hook = server
            .mock("POST", "/hook")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "text": "xyzzy",
                "from": ALICE,
                "pushName": "Alice",
                "messageId": "MSG1",
                "timestamp": 1_700_000_000_000u64,
                "isGroup": false
            })))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let (router, session) = router(true).await;
        let router = router.with_webhook(Some(WebhookForwarder::new(
            reqwest::Client::new(),
            format!("{}/hook", server.url()),
            None,
        )));
        let outcome = router.route(text(ALICE, "xyzzy")).await.unwrap();

        assert_eq!(outcome, RouteOutcome::Unmatched);
        assert_eq!(session.calls.load(Ordering::SeqCst), 0);
        // The forward runs on its own task.
        for _ in 0..50 {
            if hook.matched_async().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        hook.assert_async().await;
    }

    #[tokio::test]
    async fn group_without_mention_is_dropped_when_fallback_disabled() {
        let (router, session) = router(false).await;
        for body in ["ping", "bot ping", "4567890 ping"] {
            assert_eq!(router.route(group_text(body)).await.unwrap(), RouteOutcome::NotAdmitted);
        }
        assert_eq!(session.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn group_with_explicit_mention_is_admitted() {
        let (router, session) = router(false).await;
        let msg = message(
            GROUP,
            Some(ALICE),
            serde_json::json!({"extendedTextMessage": {
                "text": "ping",
                "contextInfo": {"mentionedJid": ["6281234567890@s.whatsapp.net"]}
            }}),
        );
        assert_eq!(router.route(msg).await.unwrap(), RouteOutcome::Replied("ping"));
        assert_eq!(session.texts().await, vec!["pong"]);
    }

    #[tokio::test]
    async fn group_fallback_on_number_suffix() {
        let (router, _) = router(true).await;
        let event = InboundMessageEvent::from_message(group_text("@4567890 ping")).unwrap();
        assert!(admits(&event, "@4567890 ping", Some(&Jid::from(ME)), true));
        assert!(!admits(&event, "@4567890 ping", Some(&Jid::from(ME)), false));
        // Anything after the leading mention is not a command.
        assert_eq!(
            router.route(group_text("@4567890 ping")).await.unwrap(),
            RouteOutcome::Unmatched
        );
    }

    #[tokio::test]
    async fn id_in_group_names_the_participant() {
        let (router, session) = router(true).await;
        // "id" alone carries no mention hint.
        assert_eq!(router.route(group_text("id")).await.unwrap(), RouteOutcome::NotAdmitted);
        assert_eq!(session.calls.load(Ordering::SeqCst), 0);

        let msg = message(
            GROUP,
            Some(ALICE),
            serde_json::json!({"extendedTextMessage": {
                "text": "id",
                "contextInfo": {"mentionedJid": ["6281234567890@s.whatsapp.net"]}
            }}),
        );
        router.route(msg).await.unwrap();
        assert_eq!(session.texts().await, vec![format!("🆔 JID kamu: {ALICE}")]);
    }

    #[test]
    fn bot_word_matching() {
        assert!(mentions_bot_word("hai bot"));
        assert!(mentions_bot_word("BOT, ping"));
        assert!(mentions_bot_word("wa-bot tolong"));
        assert!(mentions_bot_word("WaBot!"));
        assert!(!mentions_bot_word("robot"));
        assert!(!mentions_bot_word("bots"));
        assert!(!mentions_bot_word("bot_x"));
    }

    #[test]
    fn event_fields() {
        let event = InboundMessageEvent::from_message(group_text("halo")).unwrap();
        assert!(event.is_group);
        assert_eq!(event.sender_id, Jid::from(ALICE));
        assert_eq!(event.conversation_id, Jid::from(GROUP));
        assert_eq!(event.timestamp_ms, 1_700_000_000_000);
        assert_eq!(event.sender_display_name.as_deref(), Some("Alice"));
    }
}
