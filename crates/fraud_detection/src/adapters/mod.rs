// Rust guideline compliant 2026-10-19

//! Adapters (secondary ports) for the risk pipeline binary.
//!
//! Each sub-module implements one or more hexagonal port traits defined in the
//! `domain` crate.

pub mod demo_scorer;
pub mod fast2sms_channel;
pub mod in_memory_audit;
pub mod log_channel;
pub mod sqlite_audit;
pub mod telegram_channel;

#[cfg(test)]
pub(crate) mod test_support;

use domain::{ChannelError, NotificationChannel, RenderedMessage};
use fast2sms_channel::Fast2SmsChannel;
use log_channel::LogChannel;
use telegram_channel::TelegramChannel;

/// The notification channels this binary can fan out to.
///
/// The dispatcher holds one channel type, so the configured mix of
/// transports is expressed as an enum rather than trait objects.
#[derive(Debug)]
pub enum Channel {
    Log(LogChannel),
    Telegram(TelegramChannel),
    Sms(Fast2SmsChannel),
}

impl NotificationChannel for Channel {
    fn name(&self) -> &str {
        match self {
            Self::Log(c) => c.name(),
            Self::Telegram(c) => c.name(),
            Self::Sms(c) => c.name(),
        }
    }

    async fn send(&self, message: &RenderedMessage) -> Result<(), ChannelError> {
        match self {
            Self::Log(c) => c.send(message).await,
            Self::Telegram(c) => c.send(message).await,
            Self::Sms(c) => c.send(message).await,
        }
    }
}
