use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Instant,
};

use serde::Serialize;
use tokio::sync::OwnedMutexGuard;

use crate::{errors::Error, sequencer::BatchRun, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Single,
    Batch,
}

#[derive(Clone, Debug, Serialize)]
pub struct RunSnapshot {
    pub kind: RunKind,
    pub run: BatchRun,
    pub elapsed_secs: u64,
}

#[derive(Debug)]
struct ActiveRun {
    kind: RunKind,
    run: BatchRun,
    started: Instant,
}

/// Enforces the single-stream rule: at most one forward (single or batch) is
/// in flight. Also exposes the active run's progress to `/status` and the
/// liveness endpoint.
#[derive(Debug, Default)]
pub struct RunTracker {
    gate: Arc<tokio::sync::Mutex<()>>,
    current: Arc<Mutex<Option<ActiveRun>>>,
}

impl RunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the pipeline. Fails with `Error::Busy` while another run holds it.
    pub fn try_begin(&self, kind: RunKind, run: BatchRun) -> Result<RunTicket> {
        let guard = self.gate.clone().try_lock_owned().map_err(|_| Error::Busy)?;
        *lock(&self.current) = Some(ActiveRun {
            kind,
            run,
            started: Instant::now(),
        });
        Ok(RunTicket {
            _guard: guard,
            current: self.current.clone(),
        })
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.current).is_some()
    }

    pub fn snapshot(&self) -> Option<RunSnapshot> {
        lock(&self.current).as_ref().map(|a| RunSnapshot {
            kind: a.kind,
            run: a.run.clone(),
            elapsed_secs: a.started.elapsed().as_secs(),
        })
    }
}

/// Held for the lifetime of a run. Dropping it frees the pipeline.
#[derive(Debug)]
pub struct RunTicket {
    _guard: OwnedMutexGuard<()>,
    current: Arc<Mutex<Option<ActiveRun>>>,
}

impl RunTicket {
    pub fn record(&self, run: &BatchRun) {
        if let Some(active) = lock(&self.current).as_mut() {
            active.run = run.clone();
        }
    }
}

impl Drop for RunTicket {
    fn drop(&mut self) {
        *lock(&self.current) = None;
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
