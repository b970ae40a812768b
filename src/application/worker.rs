//! Background drain of the retry outbox.
//!
//! Claiming is a conditional update on the queue (pending, or in flight with
//! an expired lease), and completion only lands if the worker still holds the
//! lease. Two workers polling the same queue therefore never run one job
//! concurrently, and a worker that dies mid-job hands it back on lease expiry.

use super::config::WorkerConfig;
use super::engine::ReconciliationEngine;
use crate::domain::ports::RetryQueueRef;
use crate::error::Result;
use std::sync::Arc;
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Counters accumulated by a worker.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkerStats {
    pub polls: usize,
    pub claimed: usize,
    pub completed: usize,
    pub failed: usize,
    /// Jobs whose lease expired before the result could be recorded.
    pub lease_lost: usize,
    /// Jobs whose result the queue failed to store; they come back once
    /// their lease expires.
    pub unrecorded: usize,
}

impl WorkerStats {
    fn absorb(&mut self, other: &WorkerStats) {
        self.polls += other.polls;
        self.claimed += other.claimed;
        self.completed += other.completed;
        self.failed += other.failed;
        self.lease_lost += other.lease_lost;
        self.unrecorded += other.unrecorded;
    }
}

pub struct RetryWorker {
    engine: Arc<ReconciliationEngine>,
    queue: RetryQueueRef,
    config: WorkerConfig,
}

impl RetryWorker {
    pub fn new(engine: Arc<ReconciliationEngine>, queue: RetryQueueRef, config: WorkerConfig) -> Self {
        Self {
            engine,
            queue,
            config,
        }
    }

    /// Claims one batch of due jobs and runs them.
    pub async fn drain_once(&self) -> Result<WorkerStats> {
        let mut stats = WorkerStats {
            polls: 1,
            ..WorkerStats::default()
        };
        let jobs = self
            .queue
            .claim_due(
                &self.config.worker_id,
                SystemTime::now(),
                self.config.lease,
                self.config.batch_size,
            )
            .await?;
        stats.claimed = jobs.len();

        for job in jobs {
            let worker_id = self.config.worker_id.as_str();
            let recorded = match self.engine.run_retry(&job).await {
                Ok(()) => {
                    info!(job_id = %job.id, kind = %job.kind, order_id = %job.order_id, "Retry succeeded");
                    stats.completed += 1;
                    self.queue.complete(job.id, worker_id).await
                }
                Err(e) => {
                    stats.failed += 1;
                    if job.attempts + 1 >= self.config.max_attempts {
                        error!(
                            job_id = %job.id,
                            kind = %job.kind,
                            order_id = %job.order_id,
                            error = %e,
                            "Retry attempts exhausted, giving up"
                        );
                    } else {
                        warn!(
                            job_id = %job.id,
                            kind = %job.kind,
                            order_id = %job.order_id,
                            attempt = job.attempts + 1,
                            error = %e,
                            "Retry failed"
                        );
                    }
                    self.queue
                        .release(job.id, worker_id, &e.to_string(), self.config.max_attempts)
                        .await
                }
            };
            match recorded {
                Ok(true) => {}
                Ok(false) => {
                    warn!(job_id = %job.id, "Lease lost before result was recorded");
                    stats.lease_lost += 1;
                }
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "Could not record retry result");
                    stats.unrecorded += 1;
                }
            }
        }
        Ok(stats)
    }

    /// Drains until a poll claims nothing. Failing jobs are retried until
    /// they run out of attempts, so this terminates.
    pub async fn drain_until_idle(&self) -> Result<WorkerStats> {
        let mut total = WorkerStats::default();
        loop {
            let stats = self.drain_once().await?;
            total.absorb(&stats);
            if stats.claimed == 0 {
                return Ok(total);
            }
        }
    }

    /// Polls on `config.interval` until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) -> WorkerStats {
        let mut total = WorkerStats::default();
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(worker_id = %self.config.worker_id, "Retry worker started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.drain_once().await {
                        Ok(stats) => {
                            if stats.claimed > 0 {
                                debug!(claimed = stats.claimed, completed = stats.completed, "Retry batch done");
                            }
                            total.absorb(&stats);
                        }
                        Err(e) => error!(error = %e, "Error draining retry queue"),
                    }
                }
                _ = shutdown.cancelled() => {
                    info!(worker_id = %self.config.worker_id, "Retry worker received shutdown signal");
                    return total;
                }
            }
        }
    }
}
