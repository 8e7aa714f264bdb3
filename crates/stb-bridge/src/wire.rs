//! Line-delimited JSON frames exchanged with the transport process.

use std::collections::HashSet;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::warn;

use stb_core::{
    domain::{ChatId, ContactId, ImageRef, IncomingMessage, OutgoingReply, PresenceEvent},
    engine::InboundEvent,
};

/// Frames read from the transport (stdin).
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeInbound {
    Ready {
        own_id: String,
    },
    Presence {
        from: String,
        unavailable: bool,
    },
    Message(WireMessage),
    Ack {
        id: u64,
        ok: bool,
        #[serde(default)]
        error: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
pub struct WireMessage {
    pub sender: String,
    pub chat: String,
    /// Defaults to the group suffix rule on `chat`.
    #[serde(default)]
    pub is_group: Option<bool>,
    #[serde(default)]
    pub mentioned: Vec<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub image: Option<WireImage>,
}

/// Image fields are taken as-is and checked on conversion, so a broken image
/// still reaches the router instead of dropping the whole message.
#[derive(Debug, Deserialize)]
pub struct WireImage {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub direct_path: String,
    /// Base64, standard alphabet.
    #[serde(default)]
    pub media_key: String,
    #[serde(default)]
    pub file_length: u64,
}

impl From<WireImage> for ImageRef {
    /// An unusable image (no url, undecodable key) keeps an empty
    /// `remote_url`, which the sticker workflow rejects as malformed.
    fn from(i: WireImage) -> Self {
        let media_key = match STANDARD.decode(i.media_key.as_bytes()) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(error = %e, "image media_key is not valid base64");
                None
            }
        };
        let remote_url = match (i.url, &media_key) {
            (Some(url), Some(_)) => url,
            (None, _) => {
                warn!("image frame has no url");
                String::new()
            }
            (Some(_), None) => String::new(),
        };
        Self {
            remote_url,
            direct_path: i.direct_path,
            media_key: media_key.unwrap_or_default(),
            byte_length: i.file_length,
        }
    }
}

impl From<WireMessage> for IncomingMessage {
    fn from(m: WireMessage) -> Self {
        let chat = ChatId(m.chat);
        let is_group_chat = m.is_group.unwrap_or_else(|| chat.is_group());
        Self {
            sender: ContactId(m.sender),
            chat,
            is_group_chat,
            mentioned_contacts: m.mentioned.into_iter().map(ContactId).collect::<HashSet<_>>(),
            text_body: m.text,
            image_payload: m.image.map(ImageRef::from),
        }
    }
}

impl BridgeInbound {
    /// Core event carried by this frame, if any. Control frames return `None`.
    pub fn into_event(self) -> Option<InboundEvent> {
        match self {
            Self::Presence { from, unavailable } => Some(InboundEvent::Presence(PresenceEvent {
                source: ContactId(from),
                unavailable,
            })),
            Self::Message(m) => Some(InboundEvent::Message(m.into())),
            Self::Ready { .. } | Self::Ack { .. } => None,
        }
    }
}

/// Frames written to the transport (stdout).
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeOutbound<'a> {
    Send {
        id: u64,
        chat: &'a str,
        content: WireContent<'a>,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireContent<'a> {
    Text {
        text: &'a str,
    },
    Sticker {
        url: &'a str,
        direct_path: &'a str,
        #[serde(with = "b64")]
        media_key: &'a [u8],
        mime_type: &'a str,
        file_length: u64,
        #[serde(with = "b64")]
        thumbnail: &'a [u8],
    },
}

impl<'a> From<&'a OutgoingReply> for WireContent<'a> {
    fn from(reply: &'a OutgoingReply) -> Self {
        match reply {
            OutgoingReply::Text(text) => Self::Text { text },
            OutgoingReply::Sticker(s) => Self::Sticker {
                url: &s.url,
                direct_path: &s.direct_path,
                media_key: &s.media_key,
                mime_type: &s.mime_type,
                file_length: s.byte_length,
                thumbnail: &s.thumbnail,
            },
        }
    }
}

/// Base64 (standard alphabet) for outbound byte fields.
mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stb_core::domain::StickerPayload;

    #[test]
    fn parses_message_with_image_and_defaults_group_flag() {
        let line = r#"{"type":"message","sender":"a@s.whatsapp.net","chat":"grp@g.us","mentioned":["bot@s.whatsapp.net"],"image":{"url":"https://mmg.example/x","direct_path":"/v/x","media_key":"AQID","file_length":3}}"#;
        let frame: BridgeInbound = serde_json::from_str(line).unwrap();
        let Some(InboundEvent::Message(msg)) = frame.into_event() else {
            panic!("expected message event");
        };

        assert!(msg.is_group_chat);
        assert!(msg.mentions(&ContactId::new("bot@s.whatsapp.net")));
        assert_eq!(msg.text_body, None);
        let img = msg.image_payload.unwrap();
        assert_eq!(img.media_key, vec![1, 2, 3]);
        assert_eq!(img.byte_length, 3);
    }

    #[test]
    fn explicit_group_flag_wins() {
        let line = r#"{"type":"message","sender":"a","chat":"a@s.whatsapp.net","is_group":true,"text":"hi"}"#;
        let frame: BridgeInbound = serde_json::from_str(line).unwrap();
        let Some(InboundEvent::Message(msg)) = frame.into_event() else {
            panic!("expected message event");
        };
        assert!(msg.is_group_chat);
        assert_eq!(msg.text_body.as_deref(), Some("hi"));
    }

    #[test]
    fn control_frames_carry_no_event() {
        let ready: BridgeInbound =
            serde_json::from_str(r#"{"type":"ready","own_id":"bot@s.whatsapp.net"}"#).unwrap();
        assert!(ready.into_event().is_none());

        let ack: BridgeInbound = serde_json::from_str(r#"{"type":"ack","id":4,"ok":true}"#).unwrap();
        assert!(matches!(ack, BridgeInbound::Ack { id: 4, ok: true, error: None }));
    }

    #[test]
    fn unusable_image_still_yields_a_message() {
        for image in [
            r#"{"url":"https://mmg.example/x","media_key":"***","file_length":3}"#,
            r#"{"media_key":"AQID","file_length":3}"#,
        ] {
            let line = format!(
                r#"{{"type":"message","sender":"a@s.whatsapp.net","chat":"a@s.whatsapp.net","image":{image}}}"#
            );
            let frame: BridgeInbound = serde_json::from_str(&line).unwrap();
            let Some(InboundEvent::Message(msg)) = frame.into_event() else {
                panic!("expected message event for {image}");
            };
            let img = msg.image_payload.unwrap();
            assert_eq!(img.remote_url, "", "{image}");
            assert_eq!(img.byte_length, 3);
        }
    }

    #[test]
    fn sticker_frame_encodes_bytes_as_base64() {
        let reply = OutgoingReply::Sticker(StickerPayload {
            url: "https://mmg.example/x".to_string(),
            direct_path: "/v/x".to_string(),
            media_key: vec![1, 2, 3],
            byte_length: 3,
            mime_type: "image/webp".to_string(),
            thumbnail: vec![255],
        });
        let frame = BridgeOutbound::Send {
            id: 9,
            chat: "a@s.whatsapp.net",
            content: (&reply).into(),
        };
        let v = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            v,
            json!({
                "type": "send",
                "id": 9,
                "chat": "a@s.whatsapp.net",
                "content": {
                    "kind": "sticker",
                    "url": "https://mmg.example/x",
                    "direct_path": "/v/x",
                    "media_key": "AQID",
                    "mime_type": "image/webp",
                    "file_length": 3,
                    "thumbnail": "/w=="
                }
            })
        );
    }
}
