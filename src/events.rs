//! Post-commit notifications and the background tasks driven by them.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use crate::db::Store;
use crate::engine::LifecycleEngine;
use crate::entities::{Appointment, Case, Payment};

/// One committed entity, broadcast after the commit is visible to readers.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EngineEvent {
    Appointment(Arc<Appointment>),
    Case(Arc<Case>),
    Payment(Arc<Payment>),
}

impl EngineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::Appointment(_) => "appointment",
            EngineEvent::Case(_) => "case",
            EngineEvent::Payment(_) => "payment",
        }
    }
}

/// Everything one engine operation changed. Persisted as a unit.
#[derive(Clone, Debug)]
pub struct CommitBatch {
    pub op: &'static str,
    pub at: DateTime<Utc>,
    pub changes: Vec<EngineEvent>,
}

/// Runs the expiry sweep every `interval`. The engine never schedules itself.
pub fn spawn_expiry_sweep(engine: Arc<LifecycleEngine>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            engine.sweep_expired();
        }
    })
}

const WRITE_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(50);
const BACKOFF_MAX: Duration = Duration::from_secs(5);

fn backoff(attempt: u32) -> Duration {
    BACKOFF_BASE.saturating_mul(1 << attempt.min(16)).min(BACKOFF_MAX)
}

/// Drains commit batches into the store, in commit order.
///
/// Subscribes before spawning so no commit made after this call is missed.
/// A batch that keeps failing, or a gap left by falling behind the bus, is
/// repaired by re-persisting the whole current snapshot. The writer does not
/// move on until that succeeds.
pub fn spawn_commit_writer(
    engine: Arc<LifecycleEngine>,
    store: Arc<dyn Store>,
) -> tokio::task::JoinHandle<()> {
    let mut rx = engine.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(batch) => {
                    if !write_batch(store.as_ref(), &batch).await {
                        resync(&engine, store.as_ref()).await;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "commit writer lagged; re-persisting snapshot");
                    resync(&engine, store.as_ref()).await;
                }
                Err(RecvError::Closed) => {
                    info!("engine bus closed; commit writer stopping");
                    break;
                }
            }
        }
    })
}

async fn write_batch(store: &dyn Store, batch: &CommitBatch) -> bool {
    for attempt in 0..WRITE_ATTEMPTS {
        match store.commit(&batch.changes).await {
            Ok(()) => return true,
            Err(e) => {
                warn!(op = batch.op, attempt, error = %e, "failed to persist commit");
                if attempt + 1 < WRITE_ATTEMPTS {
                    tokio::time::sleep(backoff(attempt)).await;
                }
            }
        }
    }
    error!(op = batch.op, at = %batch.at, "giving up on commit; falling back to snapshot");
    false
}

/// Writes the latest snapshot as a single batch, retrying until it lands.
async fn resync(engine: &LifecycleEngine, store: &dyn Store) {
    let mut attempt = 0;
    loop {
        let snapshot = engine.snapshot();
        let changes: Vec<EngineEvent> = snapshot
            .appointments
            .values()
            .map(|a| EngineEvent::Appointment(Arc::clone(a)))
            .chain(snapshot.cases.values().map(|c| EngineEvent::Case(Arc::clone(c))))
            .chain(snapshot.payments.values().map(|p| EngineEvent::Payment(Arc::clone(p))))
            .collect();

        match store.commit(&changes).await {
            Ok(()) => {
                info!(rows = changes.len(), "snapshot re-persisted");
                return;
            }
            Err(e) => {
                error!(attempt, error = %e, "snapshot re-persist failed");
                tokio::time::sleep(backoff(attempt)).await;
                attempt = attempt.saturating_add(1);
            }
        }
    }
}
