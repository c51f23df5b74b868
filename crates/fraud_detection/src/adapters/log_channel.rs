// Rust guideline compliant 2026-10-19

//! Demo adapter for the `NotificationChannel` port.
//!
//! Writes the plain body of each notice to the log and always succeeds.

use domain::{ChannelError, NotificationChannel, RenderedMessage};

/// `NotificationChannel` adapter that emits a log line per notice.
#[derive(Debug, Default)]
pub struct LogChannel;

impl LogChannel {
    /// Create a new log channel.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, message: &RenderedMessage) -> Result<(), ChannelError> {
        tracing::warn!(
            kind = ?message.kind,
            transaction_id = %message.transaction_id,
            body = %message.plain,
            "log_channel.notice"
        );
        Ok(())
    }
}
