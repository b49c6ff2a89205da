use std::{future::Future, time::Duration};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    remote::{RemoteError, RemoteResult},
    transfer::TransferFailure,
    utils::sleep_or_shutdown,
};

#[derive(Clone, Copy, Debug)]
pub struct GovernorConfig {
    /// How many times one remote call may be retried after a throttle signal.
    pub max_retries: u32,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
        }
    }
}

/// Honors remote throttle signals and paces batch runs.
///
/// Each wrapped call is retried in a bounded loop: on `Throttled` the caller is
/// suspended for the full remote-specified wait and the *same* call is issued
/// again. Every wait is cut short by process shutdown.
#[derive(Clone, Debug)]
pub struct RateGovernor {
    cfg: GovernorConfig,
    shutdown: CancellationToken,
}

impl RateGovernor {
    pub fn new(cfg: GovernorConfig, shutdown: CancellationToken) -> Self {
        Self { cfg, shutdown }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub async fn call<T, F, Fut>(
        &self,
        operation: &'static str,
        mut op: F,
    ) -> Result<T, TransferFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        let mut retries = 0u32;
        loop {
            let signal = match op().await {
                Ok(v) => return Ok(v),
                Err(RemoteError::Other(msg)) => return Err(TransferFailure::remote(&msg)),
                Err(RemoteError::Protected) => return Err(TransferFailure::ProtectedContent),
                Err(RemoteError::Throttled(signal)) => signal,
            };

            if retries >= self.cfg.max_retries {
                warn!(
                    operation,
                    retries,
                    max_retries = self.cfg.max_retries,
                    wait_secs = signal.wait_seconds,
                    "remote throttling persisted, giving up"
                );
                return Err(TransferFailure::RateLimited {
                    wait_seconds: signal.wait_seconds,
                });
            }

            retries += 1;
            warn!(
                operation,
                retries,
                wait_secs = signal.wait_seconds,
                "remote throttled, waiting before retry"
            );
            let started = Instant::now();
            if !sleep_or_shutdown(&self.shutdown, signal.wait()).await {
                return Err(TransferFailure::Interrupted);
            }
            debug!(
                operation,
                waited_ms = started.elapsed().as_millis() as u64,
                "throttle wait finished"
            );
        }
    }

    /// Flat spacing between batch attempts. Returns `false` on shutdown.
    pub async fn pace(&self, delay: Duration) -> bool {
        sleep_or_shutdown(&self.shutdown, delay).await
    }
}
