use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;

use crate::domain::{ChatId, ConversationId, MessageId, SourceMessage};

/// Remote-imposed cooldown ("FloodWait" / HTTP 429 `retry_after`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThrottleSignal {
    pub wait_seconds: u64,
}

impl ThrottleSignal {
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_seconds)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("throttled for {}s", .0.wait_seconds)]
    Throttled(ThrottleSignal),

    /// The source forbids forwarding and saving ("protected content").
    #[error("content is protected")]
    Protected,

    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    pub fn throttled(wait_seconds: u64) -> Self {
        Self::Throttled(ThrottleSignal { wait_seconds })
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Hexagonal port for the remote chat service.
///
/// Retrieval, download and the per-kind uploads are separate calls so the
/// rate governor can retry each one on its own.
#[async_trait]
pub trait RemoteChat: Send + Sync {
    /// `Ok(None)` when the message does not exist or is not accessible.
    async fn get_message(
        &self,
        conversation: &ConversationId,
        message_id: MessageId,
    ) -> RemoteResult<Option<SourceMessage>>;

    /// Download the message's media into `dir`. `Ok(None)` when the remote
    /// returned no file.
    async fn download_media(
        &self,
        message: &SourceMessage,
        dir: &Path,
    ) -> RemoteResult<Option<PathBuf>>;

    async fn send_text(&self, dest: ChatId, text: &str) -> RemoteResult<()>;
    async fn send_video(&self, dest: ChatId, path: &Path, caption: Option<&str>)
        -> RemoteResult<()>;
    async fn send_document(
        &self,
        dest: ChatId,
        path: &Path,
        caption: Option<&str>,
    ) -> RemoteResult<()>;
    async fn send_photo(&self, dest: ChatId, path: &Path, caption: Option<&str>)
        -> RemoteResult<()>;
    async fn send_audio(&self, dest: ChatId, path: &Path, caption: Option<&str>)
        -> RemoteResult<()>;
}
