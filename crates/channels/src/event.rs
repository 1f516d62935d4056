//! Events reported by a transport session and content sent through it.

use {
    bytes::Bytes,
    serde::{Deserialize, Serialize},
};

use crate::address::Jid;

/// HTTP-style status a provider reports when the server invalidated the session.
pub const LOGGED_OUT_STATUS: u16 = 401;

#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Session credentials changed and should be persisted.
    CredentialsUpdated(serde_json::Value),
    Connection(ConnectionUpdate),
    Message(InboundMessage),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionUpdate {
    /// A new pairing code to be scanned by the phone.
    PairingChallenge(String),
    /// The session is authenticated and usable.
    Open { own_id: Option<Jid> },
    Close(CloseReason),
}

/// Why a session closed, as far as the provider could tell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseReason {
    pub status: Option<u16>,
    pub message: Option<String>,
}

impl CloseReason {
    pub fn new(status: Option<u16>, message: Option<String>) -> Self {
        Self { status, message }
    }

    /// True when the server invalidated the session and the stored
    /// credentials can no longer be used.
    pub fn is_logged_out(&self) -> bool {
        self.status == Some(LOGGED_OUT_STATUS)
            || self
                .message
                .as_deref()
                .is_some_and(|m| m.to_lowercase().contains("logged out"))
    }
}

// ── Outbound ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundContent {
    Text { text: String, mentions: Vec<Jid> },
    Image { bytes: Bytes, caption: Option<String> },
}

impl OutboundContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            mentions: Vec::new(),
        }
    }
}

// ── Inbound ─────────────────────────────────────────────────────────────────

/// A message as delivered by the provider.
///
/// Field names follow the provider's JSON so adapters can forward payloads
/// without reshaping them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub key: MessageKey,
    #[serde(default)]
    pub push_name: Option<String>,
    /// Seconds since the epoch.
    #[serde(default)]
    pub message_timestamp: u64,
    #[serde(default)]
    pub message: Option<MessagePayload>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    pub remote_jid: Jid,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub participant: Option<Jid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MessagePayload {
    pub conversation: Option<String>,
    pub extended_text_message: Option<ExtendedText>,
    pub image_message: Option<MediaMessage>,
    pub video_message: Option<MediaMessage>,
    pub document_message: Option<MediaMessage>,
    pub sticker_message: Option<MediaMessage>,
    pub ephemeral_message: Option<Box<Envelope>>,
    pub view_once_message_v2: Option<Box<Envelope>>,
    pub buttons_response_message: Option<ButtonReply>,
    pub template_button_reply_message: Option<ButtonReply>,
    pub list_response_message: Option<ListResponse>,
    pub interactive_response_message: Option<InteractiveResponse>,
}

/// Wrapper around another message (disappearing / view-once).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Envelope {
    pub message: Option<MessagePayload>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtendedText {
    pub text: Option<String>,
    pub context_info: Option<ContextInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MediaMessage {
    pub caption: Option<String>,
    pub context_info: Option<ContextInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContextInfo {
    pub mentioned_jid: Vec<Jid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ButtonReply {
    pub selected_display_text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListResponse {
    pub single_select_reply: Option<SingleSelectReply>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SingleSelectReply {
    pub selected_row_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InteractiveResponse {
    pub body: Option<InteractiveBody>,
    pub native_flow_response_message: Option<NativeFlowResponse>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractiveBody {
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NativeFlowResponse {
    pub params_json: Option<String>,
}
