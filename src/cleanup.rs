//! Scheduled purge of expired refresh token records.
//!
//! Nothing here runs on its own; integrators that want eager purging start
//! the scheduler themselves.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::store::RefreshTokenStore;

/// Default interval between purge runs.
pub const PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Shortest interval the scheduler accepts. Shorter ones are raised to it.
pub const MIN_PURGE_INTERVAL: Duration = Duration::from_secs(1);

/// Purge expired refresh tokens once. Returns the number removed, 0 on
/// failure.
pub async fn run_purge(store: &dyn RefreshTokenStore) -> u64 {
    match store.purge_expired().await {
        Ok(count) => {
            if count > 0 {
                info!("Purged {} expired refresh tokens", count);
            }
            count
        }
        Err(e) => {
            error!(error = %e, "Failed to purge expired refresh tokens");
            0
        }
    }
}

/// Spawn a background task that purges periodically.
/// Returns a handle that can be used to abort the task.
///
/// `interval` is raised to [`MIN_PURGE_INTERVAL`] if shorter.
pub fn spawn_purge_scheduler(
    store: Arc<dyn RefreshTokenStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    let period = interval.max(MIN_PURGE_INTERVAL);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);

        loop {
            interval.tick().await;
            run_purge(store.as_ref()).await;
        }
    })
}
