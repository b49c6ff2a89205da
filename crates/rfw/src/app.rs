use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use rfw_core::{
    commands::CommandSurface,
    config::Config,
    domain::ChatId,
    governor::RateGovernor,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    remote::RemoteChat,
    sequencer::BatchSequencer,
    status::ServiceStatus,
    tracker::RunTracker,
    transfer::TransferEngine,
};
use rfw_telegram::{
    router::{self, AppState},
    Bot, TelegramMessenger, TelegramRelayClient,
};

use crate::health::{HealthServer, HealthState};

/// How long an in-flight forward gets to wind down after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(15);

/// Everything the process shares, wired once at startup.
pub struct AppContext {
    cfg: Arc<Config>,
    bot: Bot,
    status: Arc<ServiceStatus>,
    tracker: Arc<RunTracker>,
    surface: Arc<CommandSurface>,
    shutdown: CancellationToken,
}

impl AppContext {
    pub fn build(cfg: Config) -> Self {
        let cfg = Arc::new(cfg);
        let bot = rfw_telegram::connect(&cfg);
        let shutdown = CancellationToken::new();
        let status = Arc::new(ServiceStatus::new());
        let tracker = Arc::new(RunTracker::new());

        let remote: Arc<dyn RemoteChat> = Arc::new(TelegramRelayClient::new(
            bot.clone(),
            ChatId(cfg.scratch_chat_id),
        ));
        let engine = Arc::new(TransferEngine::new(
            remote,
            RateGovernor::new(cfg.governor(), shutdown.clone()),
            ChatId(cfg.destination_chat_id),
            cfg.temp_dir.clone(),
        ));
        let sequencer = Arc::new(BatchSequencer::new(engine, cfg.pacing()));

        // Operator replies share the bot's flood budget with the relay; space them out.
        let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(
            bot.clone(),
            cfg.telegram_message_limit,
            shutdown.clone(),
        ));
        let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
            raw_messenger,
            ThrottleConfig::default(),
        ));

        let surface = Arc::new(CommandSurface::new(
            sequencer,
            tracker.clone(),
            status.clone(),
            messenger,
            cfg.max_batch_size,
        ));

        Self {
            cfg,
            bot,
            status,
            tracker,
            surface,
            shutdown,
        }
    }

    /// Run until SIGINT/SIGTERM, then stop polling, let the active forward
    /// observe the shutdown, and close the health endpoint.
    pub async fn run(self) -> anyhow::Result<()> {
        let health = match self.cfg.health_port {
            Some(port) => {
                let addr = SocketAddr::new(self.cfg.health_bind, port);
                let server = HealthServer::bind(addr).await?;
                Some(server.spawn(
                    HealthState {
                        status: self.status.clone(),
                        tracker: self.tracker.clone(),
                    },
                    self.shutdown.clone(),
                ))
            }
            None => {
                info!("health endpoint disabled");
                None
            }
        };

        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            info!("shutdown requested");
            shutdown.cancel();
        });

        let state = Arc::new(AppState {
            cfg: self.cfg.clone(),
            surface: self.surface.clone(),
            status: self.status.clone(),
        });
        let polled = router::run_polling(self.bot.clone(), state, self.shutdown.clone()).await;

        // Polling can only end through shutdown, but make sure everyone sees it.
        self.shutdown.cancel();
        if let Some(handle) = health {
            let _ = handle.await;
        }
        let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
        while self.tracker.is_busy() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        if self.tracker.is_busy() {
            warn!("exiting with a forward still in flight");
        }

        polled
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable; listening for Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
