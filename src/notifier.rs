//! Outbound user notifications (verification and reset mail).

use async_trait::async_trait;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notifier rejected message: {0}")]
    Rejected(String),
    #[error("notifier unavailable: {0}")]
    Unavailable(String),
}

/// Delivers a message to a recipient address.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Notifier that writes messages to the log instead of delivering them.
///
/// The body carries a live token, so it only appears at debug level.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        info!(to = %to, subject = %subject, "Notification queued");
        debug!(to = %to, body = %body, "Notification body");
        Ok(())
    }
}
