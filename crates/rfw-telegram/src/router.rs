use std::{sync::Arc, time::Duration};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use rfw_core::{commands::CommandSurface, config::Config, status::ServiceStatus};

use crate::handlers;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub surface: Arc<CommandSurface>,
    pub status: Arc<ServiceStatus>,
}

/// Long-poll Telegram until `shutdown` fires.
pub async fn run_polling(
    bot: Bot,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    match bot.get_me().await {
        Ok(me) => {
            info!(username = %me.username(), "rfw started");
            state.surface.set_bot_username(me.username());
            state.status.set_connected(true);
        }
        Err(e) => warn!(error = %e, "get_me failed; polling anyway"),
    }
    info!(
        allowed_users = state.cfg.telegram_allowed_users.len(),
        destination = state.cfg.destination_chat_id,
        scratch = state.cfg.scratch_chat_id,
        "relay configured"
    );

    let handler = Update::filter_message().endpoint(handlers::handle_message);

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state.clone()])
        .build();

    let token = dispatcher.shutdown_token();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        // The dispatcher may not be running yet; retry until it accepts the request.
        loop {
            match token.shutdown() {
                Ok(done) => {
                    done.await;
                    break;
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(100)).await,
            }
        }
    });

    dispatcher.dispatch().await;
    state.status.set_connected(false);
    info!("polling stopped");

    Ok(())
}
