//! Scheduled cleanup of expired session data.

use crate::db::Database;
use std::time::Duration;
use tracing::{error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once. Returns the number of rows removed.
pub async fn run_cleanup(db: &Database) -> u64 {
    // Expired refresh sessions and consumed-token records
    match db.sessions().delete_expired().await {
        Ok(count) => {
            if count > 0 {
                info!("Cleaned up {} expired session rows", count);
            }
            count
        }
        Err(e) => {
            error!("Failed to clean up expired sessions: {}", e);
            0
        }
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(db: Database) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&db).await;
        }
    })
}
