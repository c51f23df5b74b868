// Rust guideline compliant 2026-10-19

//! Risk decision pipeline entry point.
//!
//! Wires the pipeline to the demo scorer, an audit store, the configured
//! notification channels and the synthetic transaction source, then streams
//! synthetic transactions until CTRL+C.
//!
//! # Usage
//!
//! ```text
//! # In-memory audit store, log channel only -- press CTRL+C to stop
//! RUST_LOG=info cargo run
//!
//! # SQLite audit store, Telegram alerts, one transaction per second
//! AUDIT_DB_URL=sqlite:risk_audit.db TELEGRAM_TOKEN=... TELEGRAM_CHAT_ID=... \
//! STREAM_INTERVAL_MS=1000 RUST_LOG=info cargo run
//!
//! # SMS alerts through Fast2SMS
//! FAST2SMS_API_KEY=... ALERT_PHONE_NUMBER=9876543210 RUST_LOG=info cargo run
//! ```

mod adapters;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use adapters::Channel;
use adapters::demo_scorer::DemoScorer;
use adapters::fast2sms_channel::Fast2SmsChannel;
use adapters::in_memory_audit::InMemoryAudit;
use adapters::log_channel::LogChannel;
use adapters::sqlite_audit::SqliteAudit;
use adapters::telegram_channel::TelegramChannel;
use anyhow::Context as _;
use assessor::{Assessor, RiskPolicy};
use audit::{AuditConfig, AuditRecorder};
use broadcast::{BroadcastHub, ChannelSubscriber, HubConfig};
use challenge::{OtpConfig, OtpStore};
use domain::{AuditReader, AuditSink, Scorer as _};
use notifier::{NotificationDispatcher, NotifierConfig};
use pipeline::{Pipeline, RiskService, StreamConfig};
use producer::{SourceConfig, SyntheticSource};

/// Row limit of the in-memory audit store.
const IN_MEMORY_CAPACITY: usize = 100_000;
/// How often expired OTP challenges are purged.
const OTP_SWEEP_EVERY: Duration = Duration::from_secs(60);
/// Buffered events for the log observer before it is evicted.
const OBSERVER_BUFFER: usize = 64;

/// Settings read from the environment.
#[derive(Debug)]
struct Settings {
    audit_db_url: Option<String>,
    telegram: Option<(String, String)>,
    sms: Option<(String, String)>,
    stream_interval: Duration,
}

impl Settings {
    fn from_env() -> anyhow::Result<Self> {
        let stream_interval = match env::var("STREAM_INTERVAL_MS") {
            Ok(raw) => Duration::from_millis(
                raw.trim()
                    .parse()
                    .with_context(|| format!("STREAM_INTERVAL_MS is not a number: {raw:?}"))?,
            ),
            Err(_unset) => StreamConfig::default().interval,
        };
        Ok(Self {
            audit_db_url: env::var("AUDIT_DB_URL").ok().filter(|url| !url.is_empty()),
            telegram: pair("TELEGRAM_TOKEN", "TELEGRAM_CHAT_ID"),
            sms: pair("FAST2SMS_API_KEY", "ALERT_PHONE_NUMBER"),
            stream_interval,
        })
    }

    fn channels(&self) -> Vec<Channel> {
        let mut channels = vec![Channel::Log(LogChannel::new())];
        match &self.telegram {
            Some((token, chat)) => channels.push(Channel::Telegram(TelegramChannel::new(token, chat.as_str()))),
            None => tracing::info!("main.telegram_disabled"),
        }
        match &self.sms {
            Some((api_key, phone)) => channels.push(Channel::Sms(Fast2SmsChannel::new(api_key, phone))),
            None => tracing::info!("main.sms_disabled"),
        }
        channels
    }
}

/// Both variables set and non-blank, trimmed.
fn pair(first: &str, second: &str) -> Option<(String, String)> {
    let read = |name: &str| env::var(name).ok().map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
    Some((read(first)?, read(second)?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize the tracing subscriber before any async work.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = Settings::from_env()?;

    // Explicit lifecycle: nothing is scored before the model is loaded.
    let scorer = DemoScorer::new();
    scorer.load().await.context("failed to load scorer")?;

    match settings.audit_db_url.as_deref() {
        Some(url) => {
            let store = SqliteAudit::new(url).await.context("failed to open SQLite audit store")?;
            tracing::info!(url, "main.audit_sqlite");
            run(scorer, Arc::new(store), &settings).await
        }
        None => {
            tracing::info!(capacity = IN_MEMORY_CAPACITY, "main.audit_in_memory");
            run(scorer, Arc::new(InMemoryAudit::new(IN_MEMORY_CAPACITY)), &settings).await
        }
    }
}

async fn run<A>(scorer: DemoScorer, store: Arc<A>, settings: &Settings) -> anyhow::Result<()>
where
    A: AuditSink + AuditReader + 'static,
{
    let pipeline = Pipeline::new(
        Assessor::new(scorer, RiskPolicy::default()),
        OtpStore::new(OtpConfig::default()),
        NotificationDispatcher::new(settings.channels(), NotifierConfig::default()),
        AuditRecorder::new(Arc::clone(&store), AuditConfig::default()),
        BroadcastHub::new(HubConfig::default()),
    );
    let source_config = SourceConfig::builder().build().context("failed to build source config")?;
    let source = SyntheticSource::new(source_config).context("failed to build transaction source")?;
    let service = RiskService::new(pipeline, store, source);

    // Stand-in for a live dashboard: one observer that logs each decision.
    let (observer, mut events) = ChannelSubscriber::channel(OBSERVER_BUFFER);
    let observer_id = service.subscribe(observer).context("failed to register observer")?;
    let observer_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            tracing::info!(
                transaction_id = %event.transaction.id,
                score = event.assessment.score,
                action = event.assessment.action.as_str(),
                challenge_issued = event.challenge_issued,
                "observer.event"
            );
        }
    });

    service.spawn_otp_sweeper(OTP_SWEEP_EVERY);
    let stream_config = StreamConfig::builder()
        .interval(settings.stream_interval)
        .build()
        .context("failed to build stream config")?;
    service.start_stream(stream_config);

    tokio::signal::ctrl_c().await.context("failed to listen for CTRL+C")?;
    tracing::info!("main.shutdown");

    service.shutdown().await;
    // Dropping the hub's sender ends the observer loop.
    service.unsubscribe(observer_id);
    observer_task.await.context("observer task panicked")?;

    let dashboard = service.dashboard().await.context("failed to read final stats")?;
    tracing::info!(
        total = dashboard.stats.total,
        blocked = dashboard.stats.blocked,
        challenged = dashboard.stats.challenged,
        fraud_rate = dashboard.stats.fraud_rate,
        "main.summary"
    );
    Ok(())
}
