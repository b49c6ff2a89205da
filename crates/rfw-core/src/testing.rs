//! In-memory fakes for the ports, shared by the unit tests.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, ConversationId, MediaKind, MessageBody, MessageId, MessageRef, SourceMessage},
    messaging::{port::MessagingPort, types::MessagingCapabilities},
    remote::{RemoteChat, RemoteError, RemoteResult},
    Result,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DownloadMode {
    #[default]
    Ok,
    Missing,
    PartialThenError,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sent {
    Text {
        dest: ChatId,
        text: String,
    },
    Media {
        kind: &'static str,
        caption: Option<String>,
        file_existed: bool,
    },
}

#[derive(Default)]
pub struct FakeRemote {
    messages: HashMap<i32, MessageBody>,
    download_mode: DownloadMode,
    upload_error: Option<String>,
    throttle_get: Mutex<HashMap<i32, u64>>,
    throttle_every_get: Option<u64>,
    protected: HashSet<i32>,
    throttle_upload: Mutex<Option<u64>>,
    get_calls: Mutex<Vec<i32>>,
    downloads: Mutex<Vec<PathBuf>>,
    upload_attempts: Mutex<usize>,
    sent: Mutex<Vec<Sent>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, id: i32, body: MessageBody) -> Self {
        self.messages.insert(id, body);
        self
    }

    pub fn with_text(self, id: i32, text: &str) -> Self {
        self.with_body(id, MessageBody::Text(text.to_string()))
    }

    pub fn with_media(self, id: i32, kind: MediaKind, caption: Option<&str>) -> Self {
        let body = MessageBody::classify(
            None,
            Some((kind, format!("file{id}"), None)),
            caption.map(|c| c.to_string()),
        );
        self.with_body(id, body)
    }

    pub fn with_texts(mut self, ids: impl IntoIterator<Item = i32>) -> Self {
        for id in ids {
            self = self.with_text(id, &format!("message {id}"));
        }
        self
    }

    pub fn with_download_mode(mut self, mode: DownloadMode) -> Self {
        self.download_mode = mode;
        self
    }

    pub fn with_upload_error(mut self, msg: &str) -> Self {
        self.upload_error = Some(msg.to_string());
        self
    }

    /// Throttle the first `get_message` for `id`.
    pub fn with_get_throttle(self, id: i32, wait_seconds: u64) -> Self {
        self.throttle_get.lock().unwrap().insert(id, wait_seconds);
        self
    }

    /// Throttle every `get_message`, as a remote stuck in a long flood window.
    pub fn with_persistent_throttle(mut self, wait_seconds: u64) -> Self {
        self.throttle_every_get = Some(wait_seconds);
        self
    }

    /// Refuse `id` the way a protected-content source does.
    pub fn with_protected(mut self, id: i32) -> Self {
        self.protected.insert(id);
        self
    }

    /// Throttle the first upload of any kind.
    pub fn with_upload_throttle(self, wait_seconds: u64) -> Self {
        *self.throttle_upload.lock().unwrap() = Some(wait_seconds);
        self
    }

    pub fn get_calls(&self) -> Vec<i32> {
        self.get_calls.lock().unwrap().clone()
    }

    pub fn downloads(&self) -> Vec<PathBuf> {
        self.downloads.lock().unwrap().clone()
    }

    pub fn upload_attempts(&self) -> usize {
        *self.upload_attempts.lock().unwrap()
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn upload(&self, kind: &'static str, path: &Path, caption: Option<&str>) -> RemoteResult<()> {
        *self.upload_attempts.lock().unwrap() += 1;
        if let Some(wait) = self.throttle_upload.lock().unwrap().take() {
            return Err(RemoteError::throttled(wait));
        }
        if let Some(e) = &self.upload_error {
            return Err(RemoteError::Other(e.clone()));
        }
        self.sent.lock().unwrap().push(Sent::Media {
            kind,
            caption: caption.map(|c| c.to_string()),
            file_existed: path.is_file(),
        });
        Ok(())
    }
}

#[async_trait]
impl RemoteChat for FakeRemote {
    async fn get_message(
        &self,
        conversation: &ConversationId,
        message_id: MessageId,
    ) -> RemoteResult<Option<SourceMessage>> {
        self.get_calls.lock().unwrap().push(message_id.0);
        if let Some(wait) = self.throttle_get.lock().unwrap().remove(&message_id.0) {
            return Err(RemoteError::throttled(wait));
        }
        if let Some(wait) = self.throttle_every_get {
            return Err(RemoteError::throttled(wait));
        }
        if self.protected.contains(&message_id.0) {
            return Err(RemoteError::Protected);
        }
        Ok(self.messages.get(&message_id.0).map(|body| SourceMessage {
            conversation: conversation.clone(),
            message_id,
            body: body.clone(),
        }))
    }

    async fn download_media(
        &self,
        message: &SourceMessage,
        dir: &Path,
    ) -> RemoteResult<Option<PathBuf>> {
        let path = dir.join(format!("media_{}.bin", message.message_id));
        match self.download_mode {
            DownloadMode::Missing => Ok(None),
            DownloadMode::PartialThenError => {
                std::fs::write(&path, b"partial").map_err(|e| RemoteError::Other(e.to_string()))?;
                self.downloads.lock().unwrap().push(path);
                Err(RemoteError::Other("connection reset".to_string()))
            }
            DownloadMode::Ok => {
                std::fs::write(&path, b"media").map_err(|e| RemoteError::Other(e.to_string()))?;
                self.downloads.lock().unwrap().push(path.clone());
                Ok(Some(path))
            }
        }
    }

    async fn send_text(&self, dest: ChatId, text: &str) -> RemoteResult<()> {
        self.sent.lock().unwrap().push(Sent::Text {
            dest,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_video(&self, _dest: ChatId, path: &Path, caption: Option<&str>) -> RemoteResult<()> {
        self.upload("video", path, caption)
    }

    async fn send_document(
        &self,
        _dest: ChatId,
        path: &Path,
        caption: Option<&str>,
    ) -> RemoteResult<()> {
        self.upload("document", path, caption)
    }

    async fn send_photo(&self, _dest: ChatId, path: &Path, caption: Option<&str>) -> RemoteResult<()> {
        self.upload("photo", path, caption)
    }

    async fn send_audio(&self, _dest: ChatId, path: &Path, caption: Option<&str>) -> RemoteResult<()> {
        self.upload("audio", path, caption)
    }
}

/// Records operator replies.
#[derive(Default)]
pub struct FakeMessenger {
    next_id: Mutex<i32>,
    pub sends: Mutex<Vec<(ChatId, String)>>,
}

impl FakeMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sends
            .lock()
            .unwrap()
            .iter()
            .map(|(_, t)| t.clone())
            .collect()
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: 4096,
        }
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        self.sends.lock().unwrap().push((chat_id, text.to_string()));
        let mut guard = self.next_id.lock().unwrap();
        *guard += 1;
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(*guard),
        })
    }
}
