// Rust guideline compliant 2026-10-19

//! Notification dispatcher for challenge and block notices.
//!
//! [`NotificationDispatcher`] renders a message once and sends it to every
//! configured [`NotificationChannel`] concurrently. Each channel attempt is
//! bounded by [`NotifierConfig::channel_timeout`], and a failing channel never
//! affects the others. The `notify_*` entry points run delivery on a
//! [`TaskTracker`] so the caller's decision path never waits on a remote
//! service; [`NotificationDispatcher::drain`] waits for in-flight deliveries
//! during shutdown.

mod render;

pub use render::{MessageRenderer, format_amount};

use chrono::Local;
use domain::{ChannelError, NotificationChannel, RenderedMessage, RiskAssessment, Transaction};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;

// ---------------------------------------------------------------------------
// NotifierError
// ---------------------------------------------------------------------------

/// Errors raised while configuring the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifierError {
    /// The supplied configuration is invalid.
    #[error("invalid notifier configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// NotifierConfig + builder
// ---------------------------------------------------------------------------

/// Runtime configuration for a [`NotificationDispatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierConfig {
    /// Upper bound for one channel attempt.
    pub channel_timeout: Duration,
    /// Prefix for rendered amounts.
    pub currency_symbol: String,
    /// Product name shown in message headers.
    pub brand: String,
}

/// Builder for [`NotifierConfig`].
#[derive(Debug)]
pub struct NotifierConfigBuilder {
    channel_timeout: Duration,
    currency_symbol: String,
    brand: String,
}

impl NotifierConfig {
    /// Create a builder.
    ///
    /// Default values: `channel_timeout = 10 s`, `currency_symbol = "₹"`,
    /// `brand = "Sentinel"`.
    #[must_use]
    pub fn builder() -> NotifierConfigBuilder {
        let defaults = Self::default();
        NotifierConfigBuilder {
            channel_timeout: defaults.channel_timeout,
            currency_symbol: defaults.currency_symbol,
            brand: defaults.brand,
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            channel_timeout: Duration::from_secs(10),
            currency_symbol: "₹".to_owned(),
            brand: "Sentinel".to_owned(),
        }
    }
}

impl NotifierConfigBuilder {
    /// Override the per-channel timeout.
    #[must_use]
    pub fn channel_timeout(mut self, timeout: Duration) -> Self {
        self.channel_timeout = timeout;
        self
    }

    /// Override the currency prefix.
    #[must_use]
    pub fn currency_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.currency_symbol = symbol.into();
        self
    }

    /// Override the brand name.
    #[must_use]
    pub fn brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = brand.into();
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`NotifierError::InvalidConfig`] when the timeout is zero or
    /// the brand is blank.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<NotifierConfig, NotifierError> {
        if self.channel_timeout.is_zero() {
            return Err(NotifierError::InvalidConfig {
                reason: "channel_timeout must be > 0".to_owned(),
            });
        }
        if self.brand.trim().is_empty() {
            return Err(NotifierError::InvalidConfig { reason: "brand must not be blank".to_owned() });
        }
        Ok(NotifierConfig {
            channel_timeout: self.channel_timeout,
            currency_symbol: self.currency_symbol,
            brand: self.brand,
        })
    }
}

// ---------------------------------------------------------------------------
// DispatchReport
// ---------------------------------------------------------------------------

/// Per-message delivery outcome across all channels.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DispatchReport {
    /// Number of channels tried.
    pub attempted: usize,
    /// Number of channels that accepted the message.
    pub delivered: usize,
    /// Channel name and error for every failed attempt.
    pub failures: Vec<(String, ChannelError)>,
}

impl DispatchReport {
    /// `true` when at least one channel accepted the message.
    #[must_use]
    pub fn any_delivered(&self) -> bool {
        self.delivered > 0
    }
}

// ---------------------------------------------------------------------------
// NotificationDispatcher
// ---------------------------------------------------------------------------

/// Fans rendered notices out to all configured channels.
#[derive(Debug)]
pub struct NotificationDispatcher<C> {
    channels: Vec<C>,
    renderer: MessageRenderer,
    timeout: Duration,
    tracker: TaskTracker,
}

impl<C> NotificationDispatcher<C>
where
    C: NotificationChannel + 'static,
{
    /// Create a dispatcher over `channels`. An empty list disables delivery.
    #[must_use]
    pub fn new(channels: Vec<C>, config: NotifierConfig) -> Self {
        Self {
            channels,
            renderer: MessageRenderer::new(config.brand, config.currency_symbol),
            timeout: config.channel_timeout,
            tracker: TaskTracker::new(),
        }
    }

    /// Number of configured channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Renderer used for all notices.
    #[must_use]
    pub fn renderer(&self) -> &MessageRenderer {
        &self.renderer
    }

    /// Send `message` to every channel concurrently and wait for all attempts.
    pub async fn deliver(&self, message: &RenderedMessage) -> DispatchReport {
        let attempts: Vec<_> = self.channels.iter().map(|channel| self.attempt(channel, message)).collect();

        let mut report = DispatchReport { attempted: self.channels.len(), ..DispatchReport::default() };
        for (name, outcome) in join_all(attempts).await {
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        channel = %name,
                        transaction_id = %message.transaction_id,
                        error = %e,
                        "notifier.channel_failed"
                    );
                    report.failures.push((name, e));
                }
            }
        }

        tracing::debug!(
            transaction_id = %message.transaction_id,
            kind = ?message.kind,
            attempted = report.attempted,
            delivered = report.delivered,
            "notifier.dispatched"
        );
        report
    }

    /// Render an OTP challenge and deliver it in the background.
    pub fn notify_challenge(
        self: &Arc<Self>,
        tx: &Transaction,
        assessment: &RiskAssessment,
        code: &str,
        validity: Duration,
    ) {
        if self.channels.is_empty() {
            return;
        }
        let message = self.renderer.challenge(tx, assessment, code, validity);
        self.spawn_delivery(message);
    }

    /// Render a block notice and deliver it in the background.
    pub fn notify_block(self: &Arc<Self>, tx: &Transaction, assessment: &RiskAssessment) {
        if self.channels.is_empty() {
            return;
        }
        let message = self.renderer.block(tx, assessment, Local::now().naive_local());
        self.spawn_delivery(message);
    }

    /// Deliveries started by `notify_*` that have not finished yet.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting background deliveries and wait for the running ones.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("notifier.drained");
    }

    async fn attempt(&self, channel: &C, message: &RenderedMessage) -> (String, Result<(), ChannelError>) {
        let outcome = match tokio::time::timeout(self.timeout, channel.send(message)).await {
            Ok(outcome) => outcome,
            Err(_elapsed) => Err(ChannelError::Timeout { millis: self.timeout.as_millis() }),
        };
        (channel.name().to_owned(), outcome)
    }

    fn spawn_delivery(self: &Arc<Self>, message: RenderedMessage) {
        if self.tracker.is_closed() {
            tracing::warn!(transaction_id = %message.transaction_id, "notifier.closed");
            return;
        }
        let this = Arc::clone(self);
        self.tracker.spawn(async move {
            let report = this.deliver(&message).await;
            if report.attempted > 0 && !report.any_delivered() {
                tracing::error!(
                    transaction_id = %message.transaction_id,
                    attempted = report.attempted,
                    "notifier.undelivered"
                );
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
