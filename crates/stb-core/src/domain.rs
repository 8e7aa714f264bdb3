use std::{collections::HashSet, fmt};

/// Suffix the transport uses for group chat identifiers.
pub const GROUP_SUFFIX: &str = "@g.us";

/// Messaging account identifier (JID string). Equality is exact string match.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContactId(pub String);

impl ContactId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Conversation target (direct or group chat).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub String);

impl ChatId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_group(&self) -> bool {
        self.0.ends_with(GROUP_SUFFIX)
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to a received image: enough to fetch the bytes and to re-describe
/// the media inside a sticker without re-encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRef {
    pub remote_url: String,
    pub direct_path: String,
    pub media_key: Vec<u8>,
    pub byte_length: u64,
}

#[derive(Clone, Debug)]
pub struct IncomingMessage {
    pub sender: ContactId,
    pub chat: ChatId,
    pub is_group_chat: bool,
    pub mentioned_contacts: HashSet<ContactId>,
    pub text_body: Option<String>,
    pub image_payload: Option<ImageRef>,
}

impl IncomingMessage {
    /// Plain text message; group-ness follows the chat id suffix.
    pub fn text(sender: ContactId, chat: ChatId, body: impl Into<String>) -> Self {
        let is_group_chat = chat.is_group();
        Self {
            sender,
            chat,
            is_group_chat,
            mentioned_contacts: HashSet::new(),
            text_body: Some(body.into()),
            image_payload: None,
        }
    }

    pub fn image(sender: ContactId, chat: ChatId, image: ImageRef) -> Self {
        let is_group_chat = chat.is_group();
        Self {
            sender,
            chat,
            is_group_chat,
            mentioned_contacts: HashSet::new(),
            text_body: None,
            image_payload: Some(image),
        }
    }

    pub fn with_mention(mut self, contact: ContactId) -> Self {
        self.mentioned_contacts.insert(contact);
        self
    }

    pub fn mentions(&self, contact: &ContactId) -> bool {
        self.mentioned_contacts.contains(contact)
    }
}

/// Presence signal for some contact, as pushed by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PresenceEvent {
    pub source: ContactId,
    pub unavailable: bool,
}

pub const STICKER_MIME: &str = "image/webp";

/// Outgoing sticker. Media fields are copied from the received [`ImageRef`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StickerPayload {
    pub url: String,
    pub direct_path: String,
    pub media_key: Vec<u8>,
    pub byte_length: u64,
    pub mime_type: String,
    pub thumbnail: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutgoingReply {
    Text(String),
    Sticker(StickerPayload),
}

impl OutgoingReply {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Sticker(_) => None,
        }
    }
}
