use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use tracing::{debug, info, warn};

use crate::{
    domain::{ChatId, ConversationId, MediaKind, MediaPayload, MessageBody, MessageId, SourceMessage},
    governor::RateGovernor,
    remote::RemoteChat,
    utils::truncate_text,
};

const MAX_DETAIL_LEN: usize = 100;

/// Why a single message could not be relayed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransferFailure {
    #[error("not found")]
    NotFound,

    #[error("download failed")]
    DownloadFailed,

    #[error("unsupported media ({0})")]
    UnsupportedMedia(String),

    #[error("no content")]
    NoContent,

    #[error("protected content (the source forbids forwarding)")]
    ProtectedContent,

    #[error("remote error: {0}")]
    Remote(String),

    #[error("rate limited (retry after {wait_seconds}s)")]
    RateLimited { wait_seconds: u64 },

    #[error("interrupted by shutdown")]
    Interrupted,
}

impl TransferFailure {
    pub fn remote(msg: &str) -> Self {
        Self::Remote(truncate_text(msg, MAX_DETAIL_LEN))
    }
}

/// What got relayed on success.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivered {
    Text,
    Media(MediaKind),
}

/// Result of one transfer attempt. Immutable once produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferOutcome {
    pub message_id: MessageId,
    pub result: Result<Delivered, TransferFailure>,
}

impl TransferOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    pub fn detail(&self) -> String {
        match &self.result {
            Ok(Delivered::Text) => "text relayed".to_string(),
            Ok(Delivered::Media(kind)) => format!("{} relayed", kind.label()),
            Err(e) => e.to_string(),
        }
    }
}

/// Scratch directory for one transfer attempt; removed on drop.
///
/// Downloads land inside it, so partial files written by a failed download are
/// removed together with complete ones.
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed scratch dir"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove scratch dir"),
        }
    }
}

/// Fetches one message and relays it into the destination chat.
pub struct TransferEngine {
    remote: Arc<dyn RemoteChat>,
    governor: RateGovernor,
    destination: ChatId,
    temp_dir: PathBuf,
    counter: AtomicU64,
}

impl TransferEngine {
    pub fn new(
        remote: Arc<dyn RemoteChat>,
        governor: RateGovernor,
        destination: ChatId,
        temp_dir: PathBuf,
    ) -> Self {
        Self {
            remote,
            governor,
            destination,
            temp_dir,
            counter: AtomicU64::new(1),
        }
    }

    pub fn governor(&self) -> &RateGovernor {
        &self.governor
    }

    pub async fn transfer(
        &self,
        conversation: &ConversationId,
        message_id: MessageId,
    ) -> TransferOutcome {
        let result = self.relay(conversation, message_id).await;
        match &result {
            Ok(delivered) => info!(%conversation, %message_id, ?delivered, "message relayed"),
            Err(e) => info!(%conversation, %message_id, reason = %e, "message not relayed"),
        }
        TransferOutcome { message_id, result }
    }

    async fn relay(
        &self,
        conversation: &ConversationId,
        message_id: MessageId,
    ) -> Result<Delivered, TransferFailure> {
        let message = self
            .governor
            .call("get_message", || self.remote.get_message(conversation, message_id))
            .await?
            .ok_or(TransferFailure::NotFound)?;

        match &message.body {
            MessageBody::Text(text) => {
                self.governor
                    .call("send_text", || self.remote.send_text(self.destination, text))
                    .await?;
                Ok(Delivered::Text)
            }
            MessageBody::Media(payload) => self.relay_media(&message, payload).await,
            MessageBody::Empty => Err(TransferFailure::NoContent),
        }
    }

    async fn relay_media(
        &self,
        message: &SourceMessage,
        payload: &MediaPayload,
    ) -> Result<Delivered, TransferFailure> {
        if let MediaKind::Other(label) = &payload.kind {
            return Err(TransferFailure::UnsupportedMedia(label.clone()));
        }

        let scratch = self.scratch_dir(message).await?;
        let file = self.download(message, scratch.path()).await?;
        let caption = payload.caption.as_deref();
        let dest = self.destination;
        let path = file.as_path();

        match &payload.kind {
            MediaKind::Video => {
                self.governor
                    .call("send_video", || self.remote.send_video(dest, path, caption))
                    .await?
            }
            MediaKind::Document => {
                self.governor
                    .call("send_document", || {
                        self.remote.send_document(dest, path, caption)
                    })
                    .await?
            }
            MediaKind::Photo => {
                self.governor
                    .call("send_photo", || self.remote.send_photo(dest, path, caption))
                    .await?
            }
            MediaKind::Audio => {
                self.governor
                    .call("send_audio", || self.remote.send_audio(dest, path, caption))
                    .await?
            }
            MediaKind::Other(label) => {
                return Err(TransferFailure::UnsupportedMedia(label.clone()));
            }
        }

        Ok(Delivered::Media(payload.kind.clone()))
    }

    async fn scratch_dir(&self, message: &SourceMessage) -> Result<ScratchDir, TransferFailure> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let name = format!(
            "msg_{}_{}_{n}",
            message.conversation.to_string().trim_start_matches('@'),
            message.message_id
        );
        let path = self.temp_dir.join(name);
        if let Err(e) = tokio::fs::create_dir_all(&path).await {
            warn!(path = %path.display(), error = %e, "failed to create scratch dir");
            return Err(TransferFailure::DownloadFailed);
        }
        Ok(ScratchDir { path })
    }

    async fn download(
        &self,
        message: &SourceMessage,
        dir: &Path,
    ) -> Result<PathBuf, TransferFailure> {
        let downloaded = self
            .governor
            .call("download_media", || self.remote.download_media(message, dir))
            .await;

        match downloaded {
            Ok(Some(path)) if path.is_file() => Ok(path),
            Ok(Some(path)) => {
                warn!(path = %path.display(), "download reported a file that does not exist");
                Err(TransferFailure::DownloadFailed)
            }
            Ok(None) => Err(TransferFailure::DownloadFailed),
            Err(TransferFailure::Remote(e)) => {
                warn!(message_id = %message.message_id, error = %e, "download failed");
                Err(TransferFailure::DownloadFailed)
            }
            Err(other) => Err(other),
        }
    }
}
