use numguard_core::types::DbId;

use crate::stats::StatError;
use crate::store::StoreError;
use crate::vendor::VendorError;

/// Failure of one unit of engine work (a number, a pool, a tick).
///
/// None of these abort a job: the supervisor logs them and the job runs
/// again on its next tick.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Stat(#[from] StatError),

    #[error(transparent)]
    Vendor(#[from] VendorError),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    /// A row references something that does not exist or does not match.
    #[error("Inconsistent data: {0}")]
    Inconsistent(String),

    /// A team's blocking configuration is unusable.
    #[error("Configuration error: {0}")]
    Config(String),
}
