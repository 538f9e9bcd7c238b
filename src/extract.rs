//! Inbound payload text extraction and command normalization.
//!
//! Chat messages arrive in one of many nested shapes. The payload is
//! modelled as a tagged union over the known shapes plus an opaque JSON
//! fallback; extraction checks the known field paths first, recurses into
//! wrapper shapes, and finally falls back to a breadth-first scan of the
//! opaque value graph.

use serde::Deserialize;
use std::collections::VecDeque;

/// Inbound message payload, decoded from the raw webhook JSON.
///
/// Variant order matters: serde tries them top to bottom, so the specific
/// shapes must precede the `Opaque` catch-all.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessagePayload {
    Conversation {
        conversation: String,
    },
    ExtendedText {
        #[serde(rename = "extendedTextMessage")]
        message: ExtendedText,
    },
    ButtonsResponse {
        #[serde(rename = "buttonsResponseMessage")]
        message: ButtonsResponse,
    },
    ListResponse {
        #[serde(rename = "listResponseMessage")]
        message: ListResponse,
    },
    TemplateButtonReply {
        #[serde(rename = "templateButtonReplyMessage")]
        message: TemplateButtonReply,
    },
    ImageCaption {
        #[serde(rename = "imageMessage")]
        message: MediaMessage,
    },
    VideoCaption {
        #[serde(rename = "videoMessage")]
        message: MediaMessage,
    },
    DocumentCaption {
        #[serde(rename = "documentMessage")]
        message: MediaMessage,
    },
    Ephemeral {
        #[serde(rename = "ephemeralMessage")]
        wrapper: WrappedMessage,
    },
    QuotedContext {
        #[serde(rename = "messageContextInfo")]
        context: ContextInfo,
    },
    /// Any shape not enumerated above.
    Opaque(serde_json::Value),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtendedText {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ButtonsResponse {
    #[serde(rename = "selectedButtonId", default)]
    pub selected_button_id: Option<String>,
    #[serde(rename = "selectedDisplayText", default)]
    pub selected_display_text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse {
    #[serde(rename = "singleSelectReply", default)]
    pub single_select_reply: Option<SingleSelectReply>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SingleSelectReply {
    #[serde(rename = "selectedRowId", default)]
    pub selected_row_id: Option<String>,
    #[serde(rename = "selectedDisplayText", default)]
    pub selected_display_text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateButtonReply {
    #[serde(rename = "selectedId", default)]
    pub selected_id: Option<String>,
    #[serde(rename = "selectedDisplayText", default)]
    pub selected_display_text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaMessage {
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WrappedMessage {
    pub message: Box<MessagePayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContextInfo {
    #[serde(rename = "quotedMessage", default)]
    pub quoted_message: Option<Box<MessagePayload>>,
}

impl MessagePayload {
    /// Selection identifier carried by button/list/template replies.
    #[must_use]
    pub fn selection_id(&self) -> Option<&str> {
        match self {
            MessagePayload::ButtonsResponse { message } => {
                non_empty(message.selected_button_id.as_deref())
            }
            MessagePayload::ListResponse { message } => non_empty(
                message
                    .single_select_reply
                    .as_ref()
                    .and_then(|r| r.selected_row_id.as_deref()),
            ),
            MessagePayload::TemplateButtonReply { message } => {
                non_empty(message.selected_id.as_deref())
            }
            MessagePayload::Ephemeral { wrapper } => wrapper.message.selection_id(),
            _ => None,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

/// Extract a best-effort plain-text command from a payload.
///
/// Known field paths are checked first, then wrapper shapes are unwrapped,
/// and finally the opaque fallback scans the value graph breadth-first for
/// the first non-empty string. The fallback keeps the bridge working with
/// payload shapes that were never enumerated, at the cost of being a
/// heuristic: it may return a field that was never meant as message text.
#[must_use]
pub fn extract_text(payload: &MessagePayload) -> Option<String> {
    match payload {
        MessagePayload::Conversation { conversation } => {
            non_empty(Some(conversation)).map(str::to_owned)
        }
        MessagePayload::ExtendedText { message } => {
            non_empty(message.text.as_deref()).map(str::to_owned)
        }
        MessagePayload::ButtonsResponse { message } => {
            non_empty(message.selected_display_text.as_deref()).map(str::to_owned)
        }
        MessagePayload::ListResponse { message } => non_empty(
            message
                .single_select_reply
                .as_ref()
                .and_then(|r| r.selected_display_text.as_deref()),
        )
        .map(str::to_owned),
        MessagePayload::TemplateButtonReply { message } => {
            non_empty(message.selected_display_text.as_deref()).map(str::to_owned)
        }
        MessagePayload::ImageCaption { message }
        | MessagePayload::VideoCaption { message }
        | MessagePayload::DocumentCaption { message } => {
            non_empty(message.caption.as_deref()).map(str::to_owned)
        }
        MessagePayload::Ephemeral { wrapper } => extract_text(&wrapper.message),
        MessagePayload::QuotedContext { context } => context
            .quoted_message
            .as_deref()
            .and_then(extract_text),
        MessagePayload::Opaque(value) => first_string_breadth_first(value),
    }
}

/// Breadth-first scan over a JSON graph for the first non-empty string.
fn first_string_breadth_first(root: &serde_json::Value) -> Option<String> {
    let mut queue: VecDeque<&serde_json::Value> = VecDeque::new();
    queue.push_back(root);
    while let Some(value) = queue.pop_front() {
        match value {
            serde_json::Value::String(s) if !s.trim().is_empty() => return Some(s.clone()),
            serde_json::Value::Object(map) => queue.extend(map.values()),
            serde_json::Value::Array(items) => queue.extend(items.iter()),
            _ => {}
        }
    }
    None
}

/// Characters stripped before keyword matching: ASCII punctuation plus the
/// smart quotes phone keyboards substitute for straight quotes.
fn is_stripped(c: char) -> bool {
    matches!(
        c,
        '\u{201c}' | '\u{201d}' | '\u{201e}' | '\u{201f}' | '\u{ab}' | '\u{bb}' | '\u{2018}'
            | '\u{2019}' | '\'' | '"' | '`' | '~' | '!' | '@' | '#' | '$' | '%' | '^' | '&'
            | '*' | '(' | ')' | '[' | ']' | '{' | '}' | '-' | '_' | '=' | '+' | '\\' | '|'
            | ';' | ':' | ',' | '<' | '.' | '>' | '/' | '?'
    )
}

/// Normalize a command string: strip punctuation to spaces, collapse
/// whitespace, trim, lowercase. Idempotent.
#[must_use]
pub fn normalize_command(input: &str) -> String {
    let stripped: String = input
        .chars()
        .map(|c| if is_stripped(c) { ' ' } else { c })
        .collect();
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn payload(json: serde_json::Value) -> MessagePayload {
        serde_json::from_value(json).expect("payload decodes")
    }

    #[test]
    fn extracts_direct_conversation_text() {
        let p = payload(serde_json::json!({ "conversation": "menu" }));
        assert_eq!(extract_text(&p).as_deref(), Some("menu"));
    }

    #[test]
    fn extracts_extended_text() {
        let p = payload(serde_json::json!({
            "extendedTextMessage": { "text": "lampu1 on" }
        }));
        assert_eq!(extract_text(&p).as_deref(), Some("lampu1 on"));
    }

    #[test]
    fn extracts_button_reply_text_and_id() {
        let p = payload(serde_json::json!({
            "buttonsResponseMessage": {
                "selectedButtonId": "iot_lampu1_on",
                "selectedDisplayText": "Lampu 1 ON"
            }
        }));
        assert_eq!(extract_text(&p).as_deref(), Some("Lampu 1 ON"));
        assert_eq!(p.selection_id(), Some("iot_lampu1_on"));
    }

    #[test]
    fn extracts_list_reply_text() {
        let p = payload(serde_json::json!({
            "listResponseMessage": {
                "singleSelectReply": {
                    "selectedRowId": "id_menu_iot",
                    "selectedDisplayText": "Kontrol IoT"
                }
            }
        }));
        assert_eq!(extract_text(&p).as_deref(), Some("Kontrol IoT"));
        assert_eq!(p.selection_id(), Some("id_menu_iot"));
    }

    #[test]
    fn extracts_template_reply_text() {
        let p = payload(serde_json::json!({
            "templateButtonReplyMessage": { "selectedDisplayText": "Chat Biasa" }
        }));
        assert_eq!(extract_text(&p).as_deref(), Some("Chat Biasa"));
    }

    #[test]
    fn extracts_media_captions() {
        for key in ["imageMessage", "videoMessage", "documentMessage"] {
            let p = payload(serde_json::json!({ key: { "caption": "status" } }));
            assert_eq!(extract_text(&p).as_deref(), Some("status"), "{key}");
        }
    }

    #[test]
    fn recurses_into_ephemeral_wrapper() {
        let p = payload(serde_json::json!({
            "ephemeralMessage": { "message": { "conversation": "keluar" } }
        }));
        assert_eq!(extract_text(&p).as_deref(), Some("keluar"));
    }

    #[test]
    fn recurses_into_quoted_context() {
        let p = payload(serde_json::json!({
            "messageContextInfo": {
                "quotedMessage": { "conversation": "kembali" }
            }
        }));
        assert_eq!(extract_text(&p).as_deref(), Some("kembali"));
    }

    #[test]
    fn falls_back_to_first_string_in_unknown_shapes() {
        let p = payload(serde_json::json!({
            "reactionMessage": { "key": { "id": "abc" }, "text": "👍" }
        }));
        // Breadth-first over an unknown shape returns *a* string, not
        // necessarily a command; the router treats it like any other text.
        assert!(extract_text(&p).is_some());
    }

    #[test]
    fn returns_none_when_no_text_anywhere() {
        let p = payload(serde_json::json!({
            "audioMessage": { "seconds": 4, "ptt": true }
        }));
        assert_eq!(extract_text(&p), None);
    }

    #[test]
    fn empty_strings_do_not_count_as_text() {
        let p = payload(serde_json::json!({
            "extendedTextMessage": { "text": "   " }
        }));
        assert_eq!(extract_text(&p), None);
    }

    #[test]
    fn normalization_strips_punctuation_and_case() {
        assert_eq!(normalize_command("Menu!"), "menu");
        assert_eq!(normalize_command("MENU"), "menu");
        assert_eq!(normalize_command("\u{201c}lampu1  ON\u{201d}"), "lampu1 on");
        assert_eq!(normalize_command("  1234   lampu2, off "), "1234 lampu2 off");
    }

    #[test]
    fn normalization_is_idempotent() {
        for s in [
            "Menu!",
            "\u{2018}Halo\u{2019}",
            "1234 lampu1 on",
            "   spaced    out   ",
            "",
        ] {
            let once = normalize_command(s);
            assert_eq!(normalize_command(&once), once);
        }
    }
}
