//! Telegram update handlers.
//!
//! Every update is checked against the allow-list and handed to the
//! `rfw-core` command surface. Forwards run detached so the dispatcher stays
//! free to answer `/status` while a batch is in flight.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::{debug, warn};

use rfw_core::domain::{ChatId, UserId};
use rfw_core::security::is_authorized;

use crate::router::AppState;

/// What to do with an incoming message before it reaches the command surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Operator,
    /// Unknown sender in a private chat: tell them once, do nothing else.
    Refuse,
    /// Unknown sender in a group or channel: stay silent.
    Ignore,
}

fn access(user: Option<UserId>, allowed: &[i64], private_chat: bool) -> Access {
    if is_authorized(user, allowed) {
        Access::Operator
    } else if private_chat {
        Access::Refuse
    } else {
        Access::Ignore
    }
}

/// Outside private chats only slash commands are meant for the bot.
fn addressed_to_bot(text: &str, private_chat: bool) -> bool {
    private_chat || text.trim_start().starts_with('/')
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let user_id = msg.from().map(|u| UserId(u.id.0 as i64));
    let private_chat = msg.chat.is_private();

    match access(user_id, &state.cfg.telegram_allowed_users, private_chat) {
        Access::Operator => {}
        Access::Refuse => {
            warn!(
                chat_id = msg.chat.id.0,
                user_id = user_id.map(|u| u.0),
                "rejected message from unauthorized user"
            );
            let _ = bot
                .send_message(
                    msg.chat.id,
                    "Unauthorized. Contact the bot owner for access.",
                )
                .await;
            return Ok(());
        }
        Access::Ignore => {
            debug!(
                chat_id = msg.chat.id.0,
                user_id = user_id.map(|u| u.0),
                "ignoring group message from non-operator"
            );
            return Ok(());
        }
    }

    let Some(text) = msg.text() else {
        debug!(chat_id = msg.chat.id.0, "ignoring non-text message");
        return Ok(());
    };
    if !addressed_to_bot(text, private_chat) {
        return Ok(());
    }

    // The returned handle is dropped on purpose; the task keeps running.
    let _ = state.surface.handle(ChatId(msg.chat.id.0), text).await;
    Ok(())
}
