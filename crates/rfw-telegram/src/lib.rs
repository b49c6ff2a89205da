//! Telegram adapter (teloxide).
//!
//! This crate implements the `rfw-core` ports over the Telegram Bot API:
//! `MessagingPort` for operator replies and `RemoteChat` for the relay itself.

use async_trait::async_trait;

use teloxide::{prelude::*, RequestError};
use tokio_util::sync::CancellationToken;

pub mod handlers;
pub mod relay;
pub mod router;

pub use relay::TelegramRelayClient;
pub use teloxide::Bot;

use rfw_core::{
    config::Config,
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{port::MessagingPort, types::MessagingCapabilities},
    utils::sleep_or_shutdown,
    Result,
};

/// One bot handle shared by the messenger, the relay client and the dispatcher.
pub fn connect(cfg: &Config) -> Bot {
    Bot::new(cfg.telegram_bot_token.clone())
}

pub(crate) fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
    teloxide::types::ChatId(chat_id.0)
}

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
    max_message_len: usize,
    shutdown: CancellationToken,
}

impl TelegramMessenger {
    pub fn new(bot: Bot, max_message_len: usize, shutdown: CancellationToken) -> Self {
        Self {
            bot,
            max_message_len,
            shutdown,
        }
    }
}

fn map_err(e: RequestError) -> Error {
    Error::External(format!("telegram error: {e}"))
}

/// Run `op`, sitting out one flood wait if Telegram asks for it. The wait
/// ends early when `shutdown` fires.
async fn with_retry<T, Fut>(shutdown: &CancellationToken, mut op: impl FnMut() -> Fut) -> Result<T>
where
    Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
    Fut::IntoFuture: Send,
{
    const MAX_RETRIES: usize = 1;
    let mut attempts = 0usize;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                attempts += 1;
                if !sleep_or_shutdown(shutdown, d).await {
                    return Err(Error::External(
                        "telegram flood wait interrupted by shutdown".to_string(),
                    ));
                }
            }
            Err(other) => return Err(map_err(other)),
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: self.max_message_len,
        }
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        let msg = with_retry(&self.shutdown, || {
            self.bot.send_message(tg_chat(chat_id), text.to_string())
        })
        .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicU32, Ordering},
        time::Duration,
    };

    use super::*;

    fn flood(secs: u64) -> RequestError {
        RequestError::RetryAfter(Duration::from_secs(secs))
    }

    #[tokio::test(start_paused = true)]
    async fn waits_out_one_flood_wait() {
        let calls = AtomicU32::new(0);
        let token = CancellationToken::new();
        let started = tokio::time::Instant::now();

        let out = with_retry(&token, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { if n == 0 { Err(flood(30)) } else { Ok(n) } }
        })
        .await
        .unwrap();

        assert_eq!(out, 1);
        assert!(started.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn second_flood_wait_is_an_error() {
        let calls = AtomicU32::new(0);
        let token = CancellationToken::new();

        let err = with_retry(&token, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(flood(5)) }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, Error::External(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cuts_the_wait_short() {
        let calls = AtomicU32::new(0);
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });
        let started = tokio::time::Instant::now();

        let err = with_retry(&token, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(flood(3600)) }
        })
        .await
        .unwrap_err();

        assert!(err.to_string().contains("shutdown"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(60));
    }
}
