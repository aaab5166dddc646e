//! Operator actions queued into the engine.
//!
//! The control plane only enqueues; the `manual_actions` task applies each
//! action with the same managers the periodic jobs use.

use std::sync::Arc;

use chrono::Utc;
use numguard_core::types::DbId;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::ConfigHandle;
use crate::error::JobError;
use crate::lifecycle::NumberLifecycleManager;
use crate::rotation::PoolRotationScheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ManualAction {
    ForceRecheck { number_id: DbId },
    ActivateSubPool { sub_pool_id: DbId },
    DeactivatePool { pool_id: DbId },
    RotatePool { pool_id: DbId },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("Manual action queue is full")]
    Full,

    #[error("Engine is not accepting manual actions")]
    Closed,
}

/// Cloneable producer side of the manual action queue.
#[derive(Clone)]
pub struct ManualActionSender {
    tx: mpsc::Sender<ManualAction>,
}

impl ManualActionSender {
    /// Enqueue without waiting.
    pub fn try_enqueue(&self, action: ManualAction) -> Result<(), EnqueueError> {
        self.tx.try_send(action).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }
}

/// Bounded manual action queue.
pub fn channel(capacity: usize) -> (ManualActionSender, mpsc::Receiver<ManualAction>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ManualActionSender { tx }, rx)
}

pub struct ManualActionConsumer {
    config: ConfigHandle,
    manager: Arc<NumberLifecycleManager>,
    scheduler: Arc<PoolRotationScheduler>,
}

impl ManualActionConsumer {
    pub fn new(
        config: ConfigHandle,
        manager: Arc<NumberLifecycleManager>,
        scheduler: Arc<PoolRotationScheduler>,
    ) -> Self {
        Self {
            config,
            manager,
            scheduler,
        }
    }

    /// Apply one action against the current configuration snapshot.
    pub async fn handle(&self, action: ManualAction) -> Result<(), JobError> {
        let cfg = self.config.snapshot();
        let now = Utc::now();
        match action {
            ManualAction::ForceRecheck { number_id } => {
                let outcome = self.manager.force_recheck(&cfg, number_id, now).await?;
                tracing::info!(number_id, ?outcome, "Forced recheck applied");
            }
            ManualAction::ActivateSubPool { sub_pool_id } => {
                if !self.scheduler.activate_sub_pool(sub_pool_id, now).await? {
                    tracing::warn!(sub_pool_id, "Sub-pool activation lost a concurrent update");
                }
            }
            ManualAction::DeactivatePool { pool_id } => {
                if !self.scheduler.deactivate_pool(pool_id, now).await? {
                    tracing::warn!(pool_id, "Pool deactivation lost a concurrent update");
                }
            }
            ManualAction::RotatePool { pool_id } => {
                let outcome = self.scheduler.rotate_pool(&cfg, pool_id, true, now).await?;
                tracing::info!(pool_id, ?outcome, "Manual rotation applied");
            }
        }
        Ok(())
    }

    /// Consume until cancelled or until every sender is dropped.
    pub async fn run(self, mut rx: mpsc::Receiver<ManualAction>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = rx.recv() => {
                    let Some(action) = next else { break };
                    if let Err(e) = self.handle(action).await {
                        tracing::warn!(?action, error = %e, "Manual action failed");
                    }
                }
            }
        }
    }
}
