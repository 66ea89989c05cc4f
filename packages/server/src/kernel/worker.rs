//! Event worker: a long-running claim → process → sleep loop.
//!
//! Each worker is sequential within itself; running several workers against
//! the same store is safe because claiming relies on the skip-locked row
//! lock, not on in-process coordination.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::claim::{claim_next, ClaimedEvent};
use super::engine::EventProcessor;

/// Configuration for the event worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How long to wait after an empty poll.
    pub poll_interval: Duration,
    /// Wall-clock budget for one pass over one event.
    pub processing_timeout: Duration,
    /// Worker ID for this instance
    pub worker_id: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            processing_timeout: Duration::from_secs(60),
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }
    }
}

/// A worker that drains pending events through the rule engine.
pub struct EventWorker {
    pool: PgPool,
    processor: Arc<EventProcessor>,
    config: WorkerConfig,
}

impl EventWorker {
    pub fn new(pool: PgPool, processor: Arc<EventProcessor>) -> Self {
        Self {
            pool,
            processor,
            config: WorkerConfig::default(),
        }
    }

    pub fn with_config(pool: PgPool, processor: Arc<EventProcessor>, config: WorkerConfig) -> Self {
        Self {
            pool,
            processor,
            config,
        }
    }

    /// Run until the shutdown token fires. The loop exits only between
    /// events, so an in-flight finalization always completes.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        info!(worker_id = %self.config.worker_id, "event worker starting");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let claimed = match claim_next(&self.pool).await {
                Ok(claimed) => claimed,
                Err(e) => {
                    error!(worker_id = %self.config.worker_id, error = %e, "failed to claim event");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                    continue;
                }
            };

            match claimed {
                Some(claimed) => self.process_claimed(claimed).await,
                None => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
            }
        }

        info!(worker_id = %self.config.worker_id, "event worker stopped");
        Ok(())
    }

    async fn process_claimed(&self, claimed: ClaimedEvent) {
        let ClaimedEvent { event, attempt_id } = claimed;

        debug!(
            worker_id = %self.config.worker_id,
            event_id = event.id,
            attempt_id,
            "claimed event"
        );

        let pass = self.processor.process(&event, attempt_id);
        match tokio::time::timeout(self.config.processing_timeout, pass).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(event_id = event.id, attempt_id, error = %e, "event processing failed");
                if let Err(e2) = self.processor.finalize_fault(&event, attempt_id, &e).await {
                    error!(event_id = event.id, attempt_id, error = %e2, "failed to finalize faulted attempt");
                }
            }
            Err(_elapsed) => {
                if let Err(e) = self.processor.abort_timed_out(&event, attempt_id).await {
                    error!(event_id = event.id, attempt_id, error = %e, "failed to abort timed-out attempt");
                }
            }
        }
    }
}
