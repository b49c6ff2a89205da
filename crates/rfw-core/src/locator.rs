//! Message link parsing.
//!
//! Accepted shapes:
//! - `https://t.me/c/<channel>/<message>` (private channel / supergroup)
//! - `https://t.me/c/<channel>/<topic>/<message>` (forum topic)
//! - `https://t.me/<handle>/<message>` (public channel)
//!
//! The scheme is optional and query strings (`?single`, `?comment=...`) are ignored.

use std::sync::OnceLock;

use regex::Regex;
use reqwest::Url;

use crate::{
    domain::{ContentLocator, ConversationId, MessageId},
    errors::Error,
    Result,
};

pub const LINK_EXAMPLE: &str = "https://t.me/c/1234567890/123";

/// Private channels/supergroups are addressed as `-100<channel>` by the API.
const PRIVATE_CHANNEL_PREFIX: &str = "-100";

fn handle_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]{3,31}$").expect("valid regex"))
}

/// Resolve a message link into a conversation + message id. Pure; no network access.
pub fn resolve(locator: &str) -> Result<ContentLocator> {
    let raw = locator.trim();
    if raw.is_empty() {
        return Err(Error::invalid_locator(locator, "empty link"));
    }

    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    let url = Url::parse(&with_scheme)
        .map_err(|e| Error::invalid_locator(locator, format!("not a link ({e})")))?;

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();

    match segments.as_slice() {
        ["c", channel, message] => private_channel(locator, channel, message),
        ["c", channel, topic, message] => {
            if !is_digits(topic) {
                return Err(Error::invalid_locator(locator, "topic id must be numeric"));
            }
            private_channel(locator, channel, message)
        }
        [handle, message] if *handle != "c" => public_channel(locator, handle, message),
        _ => Err(Error::invalid_locator(
            locator,
            format!("unrecognized link format, use {LINK_EXAMPLE}"),
        )),
    }
}

fn private_channel(locator: &str, channel: &str, message: &str) -> Result<ContentLocator> {
    if !is_digits(channel) {
        return Err(Error::invalid_locator(locator, "channel id must be numeric"));
    }
    let conversation = format!("{PRIVATE_CHANNEL_PREFIX}{channel}")
        .parse::<i64>()
        .map_err(|_| Error::invalid_locator(locator, "channel id is out of range"))?;

    Ok(ContentLocator {
        conversation: ConversationId::Numeric(conversation),
        message_id: parse_message_id(locator, message)?,
    })
}

fn public_channel(locator: &str, handle: &str, message: &str) -> Result<ContentLocator> {
    if !handle_re().is_match(handle) {
        return Err(Error::invalid_locator(
            locator,
            format!("'{handle}' is not a valid channel username"),
        ));
    }
    Ok(ContentLocator {
        conversation: ConversationId::Handle(handle.to_string()),
        message_id: parse_message_id(locator, message)?,
    })
}

fn parse_message_id(locator: &str, raw: &str) -> Result<MessageId> {
    if !is_digits(raw) {
        return Err(Error::invalid_locator(locator, "message id must be numeric"));
    }
    match raw.parse::<i32>() {
        Ok(id) if id >= 1 => Ok(MessageId(id)),
        Ok(_) => Err(Error::invalid_locator(locator, "message id must be >= 1")),
        Err(_) => Err(Error::invalid_locator(locator, "message id is out of range")),
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
