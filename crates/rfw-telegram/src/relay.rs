use std::path::{Path, PathBuf};

use async_trait::async_trait;

use teloxide::{
    net::Download,
    prelude::*,
    types::{InputFile, Message, Recipient},
    ApiError, RequestError,
};

use tokio::io::AsyncWriteExt;
use tracing::warn;

use rfw_core::{
    domain::{ChatId, ConversationId, MediaKind, MessageBody, MessageId, SourceMessage},
    remote::{RemoteChat, RemoteError, RemoteResult},
};

use crate::tg_chat;

/// `RemoteChat` over the Bot API.
///
/// Bots cannot read arbitrary history, so a source message is materialized by
/// forwarding it into a scratch chat the bot owns, reading that copy, and
/// deleting it again. The bot must be a member of the source conversation.
#[derive(Clone)]
pub struct TelegramRelayClient {
    bot: Bot,
    scratch_chat: ChatId,
}

impl TelegramRelayClient {
    pub fn new(bot: Bot, scratch_chat: ChatId) -> Self {
        Self { bot, scratch_chat }
    }
}

fn recipient(conversation: &ConversationId) -> Recipient {
    match conversation {
        ConversationId::Numeric(id) => Recipient::Id(teloxide::types::ChatId(*id)),
        ConversationId::Handle(handle) => Recipient::ChannelUsername(format!("@{handle}")),
    }
}

fn map_err(e: RequestError) -> RemoteError {
    match e {
        // Sub-second waits round up to one second.
        RequestError::RetryAfter(d) => RemoteError::throttled(d.as_secs().max(1)),
        other if is_protected(&other) => RemoteError::Protected,
        other => RemoteError::Other(other.to_string()),
    }
}

/// Sources with "restrict saving content" refuse bot forwards with a plain
/// 400 ("message can't be forwarded"); teloxide has no dedicated variant.
fn is_protected(e: &RequestError) -> bool {
    let RequestError::Api(api) = e else {
        return false;
    };
    let text = api.to_string().to_lowercase();
    text.contains("can't be forwarded")
        || text.contains("cannot be forwarded")
        || text.contains("protected")
}

/// Errors meaning "this id does not resolve to a readable message".
fn is_not_found(e: &RequestError) -> bool {
    matches!(
        e,
        RequestError::Api(
            ApiError::MessageToForwardNotFound | ApiError::MessageIdInvalid | ApiError::ChatNotFound
        )
    )
}

fn media_of(msg: &Message) -> Option<(MediaKind, String, Option<String>)> {
    if let Some(v) = msg.video() {
        return Some((MediaKind::Video, v.file.id.clone(), v.file_name.clone()));
    }
    // Animations also carry a document; check them first.
    if let Some(a) = msg.animation() {
        return Some((MediaKind::Other("animation".into()), a.file.id.clone(), None));
    }
    if let Some(d) = msg.document() {
        return Some((MediaKind::Document, d.file.id.clone(), d.file_name.clone()));
    }
    if let Some(best) = msg.photo().and_then(|sizes| sizes.last()) {
        return Some((MediaKind::Photo, best.file.id.clone(), None));
    }
    if let Some(a) = msg.audio() {
        return Some((MediaKind::Audio, a.file.id.clone(), a.file_name.clone()));
    }
    if let Some(v) = msg.voice() {
        return Some((MediaKind::Other("voice note".into()), v.file.id.clone(), None));
    }
    if let Some(v) = msg.video_note() {
        return Some((MediaKind::Other("video note".into()), v.file.id.clone(), None));
    }
    if let Some(s) = msg.sticker() {
        return Some((MediaKind::Other("sticker".into()), s.file.id.clone(), None));
    }
    None
}

fn body_of(msg: &Message) -> MessageBody {
    MessageBody::classify(
        msg.text().map(str::to_string),
        media_of(msg),
        msg.caption().map(str::to_string),
    )
}

/// Keep only the final path component and characters safe on any filesystem.
fn safe_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').to_string();
    (!cleaned.is_empty()).then_some(cleaned)
}

fn default_file_name(kind: &MediaKind, id: MessageId) -> String {
    let ext = match kind {
        MediaKind::Video => "mp4",
        MediaKind::Photo => "jpg",
        MediaKind::Audio => "mp3",
        MediaKind::Document | MediaKind::Other(_) => "bin",
    };
    format!("{}_{}.{ext}", kind.label().replace(' ', "_"), id.0)
}

fn io_err(e: std::io::Error) -> RemoteError {
    RemoteError::Other(format!("local file error: {e}"))
}

#[async_trait]
impl RemoteChat for TelegramRelayClient {
    async fn get_message(
        &self,
        conversation: &ConversationId,
        message_id: MessageId,
    ) -> RemoteResult<Option<SourceMessage>> {
        let copy = match self
            .bot
            .forward_message(
                tg_chat(self.scratch_chat),
                recipient(conversation),
                teloxide::types::MessageId(message_id.0),
            )
            .disable_notification(true)
            .await
        {
            Ok(m) => m,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => return Err(map_err(e)),
        };

        let body = body_of(&copy);

        if let Err(e) = self.bot.delete_message(copy.chat.id, copy.id).await {
            warn!(
                chat_id = copy.chat.id.0,
                message_id = copy.id.0,
                error = %e,
                "failed to delete scratch copy; it stays in the scratch chat"
            );
        }

        Ok(Some(SourceMessage {
            conversation: conversation.clone(),
            message_id,
            body,
        }))
    }

    async fn download_media(
        &self,
        message: &SourceMessage,
        dir: &Path,
    ) -> RemoteResult<Option<PathBuf>> {
        let MessageBody::Media(payload) = &message.body else {
            return Ok(None);
        };

        let file = self
            .bot
            .get_file(payload.file_ref.clone())
            .await
            .map_err(map_err)?;

        let file_name = payload
            .file_name
            .as_deref()
            .and_then(safe_file_name)
            .unwrap_or_else(|| default_file_name(&payload.kind, message.message_id));
        let path = dir.join(file_name);

        let mut dst = tokio::fs::File::create(&path).await.map_err(io_err)?;
        self.bot
            .download_file(&file.path, &mut dst)
            .await
            .map_err(|e| RemoteError::Other(format!("download error: {e}")))?;
        dst.flush().await.map_err(io_err)?;

        Ok(Some(path))
    }

    async fn send_text(&self, dest: ChatId, text: &str) -> RemoteResult<()> {
        self.bot
            .send_message(tg_chat(dest), text.to_string())
            .await
            .map(|_| ())
            .map_err(map_err)
    }

    async fn send_video(
        &self,
        dest: ChatId,
        path: &Path,
        caption: Option<&str>,
    ) -> RemoteResult<()> {
        let mut req = self
            .bot
            .send_video(tg_chat(dest), InputFile::file(path))
            .supports_streaming(true);
        if let Some(c) = caption {
            req = req.caption(c.to_string());
        }
        req.await.map(|_| ()).map_err(map_err)
    }

    async fn send_document(
        &self,
        dest: ChatId,
        path: &Path,
        caption: Option<&str>,
    ) -> RemoteResult<()> {
        let mut req = self.bot.send_document(tg_chat(dest), InputFile::file(path));
        if let Some(c) = caption {
            req = req.caption(c.to_string());
        }
        req.await.map(|_| ()).map_err(map_err)
    }

    async fn send_photo(
        &self,
        dest: ChatId,
        path: &Path,
        caption: Option<&str>,
    ) -> RemoteResult<()> {
        let mut req = self.bot.send_photo(tg_chat(dest), InputFile::file(path));
        if let Some(c) = caption {
            req = req.caption(c.to_string());
        }
        req.await.map(|_| ()).map_err(map_err)
    }

    async fn send_audio(
        &self,
        dest: ChatId,
        path: &Path,
        caption: Option<&str>,
    ) -> RemoteResult<()> {
        let mut req = self.bot.send_audio(tg_chat(dest), InputFile::file(path));
        if let Some(c) = caption {
            req = req.caption(c.to_string());
        }
        req.await.map(|_| ()).map_err(map_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn handles_become_channel_usernames() {
        assert_eq!(
            recipient(&ConversationId::Handle("durov".into())),
            Recipient::ChannelUsername("@durov".into())
        );
        assert_eq!(
            recipient(&ConversationId::Numeric(-1001234)),
            Recipient::Id(teloxide::types::ChatId(-1001234))
        );
    }

    #[test]
    fn retry_after_maps_to_throttle() {
        match map_err(RequestError::RetryAfter(Duration::from_secs(42))) {
            RemoteError::Throttled(signal) => assert_eq!(signal.wait_seconds, 42),
            other => panic!("unexpected {other:?}"),
        }
        match map_err(RequestError::RetryAfter(Duration::from_millis(200))) {
            RemoteError::Throttled(signal) => assert_eq!(signal.wait_seconds, 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_messages_are_not_errors() {
        assert!(is_not_found(&RequestError::Api(
            ApiError::MessageToForwardNotFound
        )));
        assert!(is_not_found(&RequestError::Api(ApiError::ChatNotFound)));
        assert!(!is_not_found(&RequestError::Api(ApiError::BotBlocked)));
        assert!(matches!(
            map_err(RequestError::Api(ApiError::BotBlocked)),
            RemoteError::Other(_)
        ));
    }

    #[test]
    fn protected_sources_are_classified() {
        let refused = RequestError::Api(ApiError::Unknown(
            "Bad Request: message can't be forwarded".to_string(),
        ));
        assert!(is_protected(&refused));
        assert!(matches!(map_err(refused), RemoteError::Protected));

        assert!(!is_protected(&RequestError::Api(ApiError::BotBlocked)));
        assert!(!is_protected(&RequestError::RetryAfter(Duration::from_secs(3))));
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(safe_file_name("clip.mp4").as_deref(), Some("clip.mp4"));
        assert_eq!(
            safe_file_name("../../etc/passwd").as_deref(),
            Some("passwd")
        );
        assert_eq!(safe_file_name("a:b?.pdf").as_deref(), Some("a_b_.pdf"));
        assert_eq!(safe_file_name("..."), None);
        assert_eq!(safe_file_name(""), None);
    }

    #[test]
    fn unnamed_media_gets_a_kind_based_name() {
        assert_eq!(default_file_name(&MediaKind::Video, MessageId(7)), "video_7.mp4");
        assert_eq!(default_file_name(&MediaKind::Photo, MessageId(8)), "photo_8.jpg");
        assert_eq!(
            default_file_name(&MediaKind::Other("voice note".into()), MessageId(9)),
            "voice_note_9.bin"
        );
    }
}
