// Rust guideline compliant 2026-10-19

//! Cancellable repeating task that feeds the pipeline on a timer.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Errors raised while configuring the stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The supplied configuration is invalid.
    #[error("invalid stream configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
}

/// Tick settings for a [`StreamDriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Pause between the end of one tick and the start of the next.
    pub interval: Duration,
    /// Every generated transaction follows the high-risk profile.
    pub force_high_risk: bool,
}

/// Builder for [`StreamConfig`].
#[derive(Debug)]
pub struct StreamConfigBuilder {
    interval: Duration,
    force_high_risk: bool,
}

impl StreamConfig {
    /// Create a builder.
    ///
    /// Default values: `interval = 3 s`, `force_high_risk = false`.
    #[must_use]
    pub fn builder() -> StreamConfigBuilder {
        StreamConfigBuilder { interval: Duration::from_secs(3), force_high_risk: false }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(3), force_high_risk: false }
    }
}

impl StreamConfigBuilder {
    /// Override the tick interval.
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Force the high-risk profile on every tick.
    #[must_use]
    pub fn force_high_risk(mut self, force: bool) -> Self {
        self.force_high_risk = force;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidConfig`] when `interval` is zero.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<StreamConfig, StreamError> {
        if self.interval.is_zero() {
            return Err(StreamError::InvalidConfig { reason: "interval must be > 0".to_owned() });
        }
        Ok(StreamConfig { interval: self.interval, force_high_risk: self.force_high_risk })
    }
}

/// Result of a start or stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamControl {
    /// The stream was idle and is now running.
    Started {
        /// Active tick interval.
        interval: Duration,
    },
    /// The stream was running and will start no further ticks.
    Stopped,
    /// The request matched the current state.
    NoChange,
}

#[derive(Debug)]
struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Running {
    fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }
}

/// Owns at most one background tick loop.
///
/// `start` and `stop` are idempotent. After `stop` returns, no new tick
/// begins; a tick already in progress runs to completion. Every loop ever
/// started is tracked, so `shutdown` also waits for a stopped loop whose
/// last tick outlived a restart.
#[derive(Debug, Default)]
pub struct StreamDriver {
    running: Mutex<Option<Running>>,
    loops: TaskTracker,
}

impl StreamDriver {
    /// Create an idle driver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` while a tick loop is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .is_ok_and(|slot| slot.as_ref().is_some_and(Running::is_active))
    }

    /// Spawn a loop calling `tick` then sleeping `interval`, until stopped.
    ///
    /// Returns [`StreamControl::NoChange`] when a loop is already running.
    pub fn start<F, Fut>(&self, interval: Duration, tick: F) -> StreamControl
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let Ok(mut slot) = self.running.lock() else {
            tracing::error!("stream.lock_poisoned");
            return StreamControl::NoChange;
        };
        if slot.as_ref().is_some_and(Running::is_active) {
            return StreamControl::NoChange;
        }

        let cancel = CancellationToken::new();
        let handle = self.loops.spawn(drive(interval, cancel.clone(), tick));
        // A stopped loop replaced here stays in `loops` until it exits.
        *slot = Some(Running { cancel, handle });
        tracing::info!(interval_ms = interval.as_millis(), "stream.started");
        StreamControl::Started { interval }
    }

    /// Request the loop to stop before its next tick.
    ///
    /// Returns [`StreamControl::NoChange`] when no loop is running.
    pub fn stop(&self) -> StreamControl {
        let Ok(slot) = self.running.lock() else {
            tracing::error!("stream.lock_poisoned");
            return StreamControl::NoChange;
        };
        match slot.as_ref() {
            Some(running) if running.is_active() => {
                // The handle stays in the slot so `shutdown` can still join it.
                running.cancel.cancel();
                tracing::info!("stream.stopped");
                StreamControl::Stopped
            }
            _ => StreamControl::NoChange,
        }
    }

    /// Stop the loop and wait for every in-flight tick to finish, including
    /// ticks of loops stopped earlier.
    pub async fn shutdown(&self) {
        let running = match self.running.lock() {
            Ok(mut slot) => slot.take(),
            Err(_poisoned) => None,
        };
        if let Some(running) = running {
            running.cancel.cancel();
            if let Err(e) = running.handle.await {
                tracing::warn!(error = %e, "stream.join_failed");
            }
        }
        self.loops.close();
        self.loops.wait().await;
        // The driver can be started again after a shutdown.
        self.loops.reopen();
    }
}

async fn drive<F, Fut>(interval: Duration, cancel: CancellationToken, tick: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticks = 0u64;
    loop {
        if cancel.is_cancelled() {
            break;
        }
        tick().await;
        ticks += 1;
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }
    tracing::debug!(ticks, "stream.loop_exited");
}
