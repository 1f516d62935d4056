//! Display text and mention extraction from provider message payloads.

use wabridge_channels::{Jid, MessagePayload};

/// Extract the display text of a message, trimmed. Empty when there is none.
///
/// Envelopes (disappearing, view-once) are unwrapped first. Plain text,
/// extended text and media captions win over interactive replies.
pub fn extract_text(payload: &MessagePayload) -> String {
    let m = unwrap_envelope(payload);
    plain_text(m)
        .or_else(|| interactive_text(m))
        .map(|t| t.trim().to_string())
        .unwrap_or_default()
}

/// Addresses explicitly mentioned in the message, normalized.
pub fn mentioned_jids(payload: &MessagePayload) -> Vec<Jid> {
    let m = unwrap_envelope(payload);
    let context = m
        .extended_text_message
        .as_ref()
        .and_then(|t| t.context_info.as_ref())
        .or_else(|| {
            [
                &m.image_message,
                &m.video_message,
                &m.document_message,
                &m.sticker_message,
            ]
            .into_iter()
            .flatten()
            .find_map(|media| media.context_info.as_ref())
        });

    context
        .map(|ci| ci.mentioned_jid.iter().map(Jid::normalized_user).collect())
        .unwrap_or_default()
}

fn unwrap_envelope(payload: &MessagePayload) -> &MessagePayload {
    [&payload.ephemeral_message, &payload.view_once_message_v2]
        .into_iter()
        .flatten()
        .find_map(|envelope| envelope.message.as_ref())
        .unwrap_or(payload)
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.is_empty())
}

fn plain_text(m: &MessagePayload) -> Option<String> {
    non_empty(&m.conversation)
        .or_else(|| m.extended_text_message.as_ref().and_then(|t| non_empty(&t.text)))
        .or_else(|| m.image_message.as_ref().and_then(|i| non_empty(&i.caption)))
        .or_else(|| m.video_message.as_ref().and_then(|v| non_empty(&v.caption)))
        .map(str::to_string)
}

fn interactive_text(m: &MessagePayload) -> Option<String> {
    let direct = m
        .buttons_response_message
        .as_ref()
        .and_then(|b| non_empty(&b.selected_display_text))
        .or_else(|| {
            m.template_button_reply_message
                .as_ref()
                .and_then(|b| non_empty(&b.selected_display_text))
        })
        .or_else(|| {
            m.list_response_message
                .as_ref()
                .and_then(|l| l.single_select_reply.as_ref())
                .and_then(|r| non_empty(&r.selected_row_id))
        })
        .or_else(|| {
            m.interactive_response_message
                .as_ref()
                .and_then(|i| i.body.as_ref())
                .and_then(|b| non_empty(&b.text))
        });
    if let Some(text) = direct {
        return Some(text.to_string());
    }

    let params = m
        .interactive_response_message
        .as_ref()
        .and_then(|i| i.native_flow_response_message.as_ref())
        .and_then(|n| non_empty(&n.params_json))?;
    Some(reduce_params_json(params))
}

/// Reduce a native-flow parameters blob to its `text`, `id` or `payload`
/// field. Falls back to the JSON itself, or to an empty string when the
/// blob does not parse.
fn reduce_params_json(raw: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<serde_json::Value>(raw) else {
        return String::new();
    };
    ["text", "id", "payload"]
        .iter()
        .filter_map(|key| parsed.get(key))
        .find_map(|v| match v {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
            serde_json::Value::Bool(true) => Some("true".to_string()),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => Some(v.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| parsed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(json: serde_json::Value) -> MessagePayload {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn plain_conversation() {
        let p = payload(serde_json::json!({"conversation": "  ping  "}));
        assert_eq!(extract_text(&p), "ping");
    }

    #[test]
    fn extended_text_and_captions() {
        let p = payload(serde_json::json!({"extendedTextMessage": {"text": "halo"}}));
        assert_eq!(extract_text(&p), "halo");
        let p = payload(serde_json::json!({"imageMessage": {"caption": "foto kucing"}}));
        assert_eq!(extract_text(&p), "foto kucing");
        let p = payload(serde_json::json!({"videoMessage": {"caption": "klip"}}));
        assert_eq!(extract_text(&p), "klip");
    }

    #[test]
    fn envelopes_are_unwrapped() {
        let p = payload(serde_json::json!({
            "ephemeralMessage": {"message": {"conversation": "rahasia"}}
        }));
        assert_eq!(extract_text(&p), "rahasia");
        let p = payload(serde_json::json!({
            "viewOnceMessageV2": {"message": {"imageMessage": {"caption": "sekali"}}}
        }));
        assert_eq!(extract_text(&p), "sekali");
    }

    #[test]
    fn empty_conversation_falls_through() {
        let p = payload(serde_json::json!({
            "conversation": "",
            "extendedTextMessage": {"text": "isi"}
        }));
        assert_eq!(extract_text(&p), "isi");
    }

    #[test]
    fn interactive_replies() {
        let p = payload(serde_json::json!({
            "buttonsResponseMessage": {"selectedDisplayText": "Ya"}
        }));
        assert_eq!(extract_text(&p), "Ya");
        let p = payload(serde_json::json!({
            "templateButtonReplyMessage": {"selectedDisplayText": "Tidak"}
        }));
        assert_eq!(extract_text(&p), "Tidak");
        let p = payload(serde_json::json!({
            "listResponseMessage": {"singleSelectReply": {"selectedRowId": "row-2"}}
        }));
        assert_eq!(extract_text(&p), "row-2");
        let p = payload(serde_json::json!({
            "interactiveResponseMessage": {"body": {"text": "menu"}}
        }));
        assert_eq!(extract_text(&p), "menu");
    }

    #[test]
    fn params_json_is_reduced() {
        let p = payload(serde_json::json!({
            "interactiveResponseMessage": {"nativeFlowResponseMessage": {
                "paramsJson": r#"{"id": "opt-1", "payload": "x"}"#
            }}
        }));
        assert_eq!(extract_text(&p), "opt-1");
    }

    #[test]
    fn params_json_without_known_fields_is_kept() {
        let p = payload(serde_json::json!({
            "interactiveResponseMessage": {"nativeFlowResponseMessage": {
                "paramsJson": r#"{"flow_token": "abc"}"#
            }}
        }));
        assert_eq!(extract_text(&p), r#"{"flow_token":"abc"}"#);
    }

    #[test]
    fn unparseable_params_json_is_empty() {
        let p = payload(serde_json::json!({
            "interactiveResponseMessage": {"nativeFlowResponseMessage": {"paramsJson": "{oops"}}
        }));
        assert_eq!(extract_text(&p), "");
    }

    #[test]
    fn no_text_at_all() {
        let p = payload(serde_json::json!({"stickerMessage": {}}));
        assert_eq!(extract_text(&p), "");
    }

    #[test]
    fn mentions_are_normalized() {
        let p = payload(serde_json::json!({
            "extendedTextMessage": {
                "text": "@628111 tolong",
                "contextInfo": {"mentionedJid": ["628111222333:5@s.whatsapp.net"]}
            }
        }));
        assert_eq!(mentioned_jids(&p), vec![Jid::from("628111222333@s.whatsapp.net")]);
    }

    #[test]
    fn mentions_from_media_context() {
        let p = payload(serde_json::json!({
            "imageMessage": {"caption": "lihat", "contextInfo": {"mentionedJid": ["62899@s.whatsapp.net"]}}
        }));
        assert_eq!(mentioned_jids(&p).len(), 1);
        assert!(mentioned_jids(&payload(serde_json::json!({"conversation": "x"}))).is_empty());
    }
}
