use crate::domain::ConversationId;

/// Core error type for the forwarder.
///
/// Only command-level failures live here: anything that goes wrong while
/// relaying a single message is contained as a `TransferFailure` instead, so a
/// bad message never aborts a batch.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid link: {locator}: {reason}")]
    InvalidLocator { locator: String, reason: String },

    #[error("both links must be from the same chat ({start} vs {end})")]
    CrossConversationBatch {
        start: ConversationId,
        end: ConversationId,
    },

    #[error("{0}")]
    Usage(String),

    #[error("another forward is already running; try again when it finishes")]
    Busy,

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn invalid_locator(locator: &str, reason: impl Into<String>) -> Self {
        Self::InvalidLocator {
            locator: locator.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
