use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    domain::{ConversationId, MessageId},
    transfer::{TransferEngine, TransferFailure, TransferOutcome},
};

/// Failed ids kept for the final report; the count is always exact.
const MAX_FAILURES_KEPT: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailedMessage {
    pub message_id: MessageId,
    pub detail: String,
}

/// State of one sweep over `start..=end`. Lives only as long as the run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BatchRun {
    pub conversation: ConversationId,
    pub start: MessageId,
    pub end: MessageId,
    pub processed: u32,
    pub succeeded: u32,
    pub failures: Vec<FailedMessage>,
    pub interrupted: bool,
}

impl BatchRun {
    /// Reversed bounds are swapped so `start <= end`.
    pub fn new(conversation: ConversationId, a: MessageId, b: MessageId) -> Self {
        let (start, end) = if a <= b { (a, b) } else { (b, a) };
        Self {
            conversation,
            start,
            end,
            processed: 0,
            succeeded: 0,
            failures: Vec::new(),
            interrupted: false,
        }
    }

    pub fn total(&self) -> u32 {
        (self.end.0 - self.start.0) as u32 + 1
    }

    pub fn failed(&self) -> u32 {
        self.processed - self.succeeded
    }

    pub fn percent(&self) -> u32 {
        // total() is at least 1.
        (u64::from(self.processed) * 100 / u64::from(self.total())) as u32
    }

    pub(crate) fn record(&mut self, outcome: &TransferOutcome) {
        self.processed += 1;
        if outcome.succeeded() {
            self.succeeded += 1;
        } else if self.failures.len() < MAX_FAILURES_KEPT {
            self.failures.push(FailedMessage {
                message_id: outcome.message_id,
                detail: outcome.detail(),
            });
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BatchPacing {
    /// Spacing after every attempt.
    pub delay: Duration,
    /// Longer spacing after every `long_every`-th attempt.
    pub long_delay: Duration,
    pub long_every: u32,
    /// Emit a progress report every N processed messages (0 disables).
    pub progress_every: u32,
}

impl Default for BatchPacing {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(800),
            long_delay: Duration::from_millis(1500),
            long_every: 5,
            progress_every: 10,
        }
    }
}

impl BatchPacing {
    fn delay_after(&self, processed: u32) -> Duration {
        if self.long_every > 0 && processed % self.long_every == 0 {
            self.long_delay
        } else {
            self.delay
        }
    }
}

/// Receives batch progress. Reporting only; nothing here is a checkpoint.
#[async_trait]
pub trait BatchObserver: Send + Sync {
    /// Called after every attempt.
    fn on_attempt(&self, _run: &BatchRun, _outcome: &TransferOutcome) {}

    /// Called at the configured cadence while the run is still going.
    async fn on_progress(&self, run: &BatchRun);
}

/// Drives the transfer engine over a contiguous id range, one message at a time.
pub struct BatchSequencer {
    engine: Arc<TransferEngine>,
    pacing: BatchPacing,
}

impl BatchSequencer {
    pub fn new(engine: Arc<TransferEngine>, pacing: BatchPacing) -> Self {
        Self { engine, pacing }
    }

    pub fn engine(&self) -> &Arc<TransferEngine> {
        &self.engine
    }

    pub async fn run_batch(
        &self,
        conversation: ConversationId,
        start: MessageId,
        end: MessageId,
        observer: &dyn BatchObserver,
    ) -> BatchRun {
        let mut run = BatchRun::new(conversation, start, end);
        let total = run.total();
        info!(
            conversation = %run.conversation,
            start = %run.start,
            end = %run.end,
            total,
            "batch started"
        );

        for id in run.start.0..=run.end.0 {
            if self.engine.governor().is_shutting_down() {
                run.interrupted = true;
                break;
            }

            let outcome = self.engine.transfer(&run.conversation, MessageId(id)).await;
            if outcome.result == Err(TransferFailure::Interrupted) {
                run.interrupted = true;
                break;
            }

            run.record(&outcome);
            observer.on_attempt(&run, &outcome);

            if run.processed == total {
                break;
            }
            if self.pacing.progress_every > 0 && run.processed % self.pacing.progress_every == 0
            {
                observer.on_progress(&run).await;
            }
            if !self
                .engine
                .governor()
                .pace(self.pacing.delay_after(run.processed))
                .await
            {
                run.interrupted = true;
                break;
            }
        }

        if run.interrupted {
            warn!(
                conversation = %run.conversation,
                processed = run.processed,
                total,
                "batch interrupted by shutdown"
            );
        } else {
            info!(
                conversation = %run.conversation,
                processed = run.processed,
                succeeded = run.succeeded,
                total,
                "batch finished"
            );
        }
        run
    }
}
