//! TaskSupervisor: owns the engine's named background jobs.
//!
//! Each periodic job is its own failure domain. A tick runs in a separate
//! task so an error or a panic only costs that tick; the job carries on at
//! its next cadence. Shutdown cancels the shared token, lets in-flight
//! ticks finish and waits at most `shutdown_grace`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use numguard_core::types::Timestamp;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::{ConfigHandle, EngineConfig};
use crate::error::JobError;

/// A job run on a fixed cadence.
#[async_trait]
pub trait PeriodicJob: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Re-read after every tick, so a reload can change it.
    fn cadence(&self, config: &EngineConfig) -> Duration;

    /// One iteration against one configuration snapshot.
    async fn tick(&self, config: Arc<EngineConfig>, now: Timestamp) -> Result<(), JobError>;
}

pub struct TaskSupervisor {
    config: ConfigHandle,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl TaskSupervisor {
    pub fn new(config: ConfigHandle) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Token observed by every job; cancelled by [`shutdown`](Self::shutdown).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Number of jobs still running.
    pub fn running(&self) -> usize {
        self.tracker.len()
    }

    pub fn spawn_periodic(&self, job: Arc<dyn PeriodicJob>) {
        let config = self.config.clone();
        let cancel = self.cancel.clone();
        self.tracker.spawn(run_periodic(job, config, cancel));
    }

    /// Spawn a long-running task that watches [`cancel_token`](Self::cancel_token)
    /// itself.
    pub fn spawn_task<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(async move {
            tracing::info!(job = name, "Task started");
            task.await;
            tracing::info!(job = name, "Task stopped");
        });
    }

    /// Stop all jobs. Returns `false` if some were still running when the
    /// grace period ran out.
    pub async fn shutdown(self) -> bool {
        let grace = self.config.snapshot().shutdown_grace;
        tracing::info!(grace_secs = grace.as_secs(), "Engine shutting down");

        self.cancel.cancel();
        self.tracker.close();

        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => {
                tracing::info!("All engine jobs stopped");
                true
            }
            Err(_) => {
                tracing::error!(
                    still_running = self.tracker.len(),
                    "Engine jobs did not stop within the grace period"
                );
                false
            }
        }
    }
}

async fn run_periodic(job: Arc<dyn PeriodicJob>, config: ConfigHandle, cancel: CancellationToken) {
    let name = job.name();
    let mut period = job.cadence(&config.snapshot());
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(job = name, interval_secs = period.as_secs(), "Job started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(job = name, "Job stopping");
                break;
            }
            _ = interval.tick() => {
                let snapshot = config.snapshot();
                let version = snapshot.version;
                let started = Instant::now();

                let tick_job = Arc::clone(&job);
                let outcome = tokio::spawn(async move { tick_job.tick(snapshot, Utc::now()).await }).await;

                let elapsed_ms = started.elapsed().as_millis() as u64;
                match outcome {
                    Ok(Ok(())) => {
                        tracing::debug!(job = name, config_version = version, elapsed_ms, "Tick finished");
                    }
                    Ok(Err(e)) => {
                        tracing::error!(job = name, config_version = version, error = %e, "Tick failed");
                    }
                    Err(e) if e.is_panic() => {
                        tracing::error!(job = name, config_version = version, "Tick panicked");
                    }
                    Err(e) => {
                        tracing::warn!(job = name, error = %e, "Tick aborted");
                    }
                }

                let next = job.cadence(&config.snapshot());
                if next != period {
                    tracing::info!(job = name, interval_secs = next.as_secs(), "Job cadence changed");
                    period = next;
                    interval = tokio::time::interval_at(Instant::now() + period, period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                }
            }
        }
    }
}
