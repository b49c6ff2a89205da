use std::fmt;

use serde::Serialize;

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric, always >= 1 once resolved).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MessageId(pub i32);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Address of a source conversation.
///
/// Private channels/supergroups are addressed by their internal numeric id;
/// public ones by their `@handle`, which only the remote service can resolve.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum ConversationId {
    Numeric(i64),
    Handle(String),
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(id) => write!(f, "{id}"),
            Self::Handle(h) => write!(f, "@{h}"),
        }
    }
}

/// A resolved message link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentLocator {
    pub conversation: ConversationId,
    pub message_id: MessageId,
}

/// Kind of a media payload. Upload dispatch matches on this exhaustively.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Document,
    Photo,
    Audio,
    /// Anything the destination cannot receive as-is (voice notes, stickers,
    /// animations, video notes...). Carries a label for reporting.
    Other(String),
}

impl MediaKind {
    pub fn label(&self) -> &str {
        match self {
            Self::Video => "video",
            Self::Document => "document",
            Self::Photo => "photo",
            Self::Audio => "audio",
            Self::Other(label) => label,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaPayload {
    pub kind: MediaKind,
    pub caption: Option<String>,
    /// Remote-owned handle the client uses to fetch the bytes (Telegram `file_id`).
    pub file_ref: String,
    pub file_name: Option<String>,
}

/// What a source message carries. Exactly one variant applies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    Media(MediaPayload),
    Empty,
}

impl MessageBody {
    /// Classify the raw parts of a remote message.
    ///
    /// Media wins over text: a captioned video is relayed as a video with its
    /// caption. A caption that arrives without any media payload is relayed as
    /// plain text.
    pub fn classify(
        text: Option<String>,
        media: Option<(MediaKind, String, Option<String>)>,
        caption: Option<String>,
    ) -> Self {
        let caption = caption.filter(|c| !c.trim().is_empty());
        if let Some((kind, file_ref, file_name)) = media {
            return Self::Media(MediaPayload {
                kind,
                caption,
                file_ref,
                file_name,
            });
        }
        match text.filter(|t| !t.trim().is_empty()).or(caption) {
            Some(t) => Self::Text(t),
            None => Self::Empty,
        }
    }
}

/// Read-only view of a message returned by the remote client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceMessage {
    pub conversation: ConversationId,
    pub message_id: MessageId,
    pub body: MessageBody,
}
