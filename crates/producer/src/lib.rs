// Rust guideline compliant 2026-10-19

//! Synthetic payment generator implementing the [`TransactionSource`] port.
//!
//! Models a fixed pool of account holders, each with a home city, a usual
//! device, a typical spend and a card age. Legitimate transactions stay close
//! to that profile; a configurable share (and every forced draw) follows a
//! fraud profile: extreme amounts, foreign city, unknown device, bursty
//! activity.
//!
//! Entry points: [`SyntheticSource::generate`], and [`TransactionSource::next`]
//! which stamps the current local time. Configuration via
//! [`SourceConfig::builder`].

use chrono::{Local, NaiveDateTime};
use domain::{CalendarFlags, GeoPoint, SourceError, Transaction, TransactionSource, round2};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution as _, LogNormal, Normal};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

// ---------------------------------------------------------------------------
// ProducerError
// ---------------------------------------------------------------------------

/// Errors that can occur while building a source.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProducerError {
    /// The supplied configuration is invalid.
    #[error("invalid producer configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// SourceConfig + builder
// ---------------------------------------------------------------------------

/// Runtime configuration for a [`SyntheticSource`].
///
/// Construct via [`SourceConfig::builder`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceConfig {
    /// Number of simulated account holders (range: `>= 1`).
    pub user_count: u32,
    /// Probability that an unforced draw follows the fraud profile (range: `[0, 1]`).
    pub fraud_rate: f64,
    /// Sequence number preceding the first generated id.
    pub first_sequence: u64,
    /// Optional RNG seed for reproducible output. `None` seeds from the OS.
    pub seed: Option<u64>,
}

/// Builder for [`SourceConfig`].
#[derive(Debug)]
pub struct SourceConfigBuilder {
    user_count: u32,
    fraud_rate: f64,
    first_sequence: u64,
    seed: Option<u64>,
}

impl SourceConfig {
    /// Create a builder.
    ///
    /// Default values: `user_count = 500`, `fraud_rate = 0.06`,
    /// `first_sequence = 50_001`, `seed = None`.
    #[must_use]
    pub fn builder() -> SourceConfigBuilder {
        SourceConfigBuilder { user_count: 500, fraud_rate: 0.06, first_sequence: 50_001, seed: None }
    }
}

impl SourceConfigBuilder {
    /// Override the size of the account holder pool.
    #[must_use]
    pub fn user_count(mut self, users: u32) -> Self {
        self.user_count = users;
        self
    }

    /// Override the share of unforced fraud-profile draws.
    #[must_use]
    pub fn fraud_rate(mut self, rate: f64) -> Self {
        self.fraud_rate = rate;
        self
    }

    /// Override the id sequence origin.
    #[must_use]
    pub fn first_sequence(mut self, sequence: u64) -> Self {
        self.first_sequence = sequence;
        self
    }

    /// Fix the RNG seed for deterministic output (useful in tests).
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProducerError::InvalidConfig`] when `user_count` is zero or
    /// `fraud_rate` is outside `[0, 1]`.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<SourceConfig, ProducerError> {
        if self.user_count == 0 {
            return Err(ProducerError::InvalidConfig { reason: "user_count must be >= 1".to_owned() });
        }
        if !(0.0..=1.0).contains(&self.fraud_rate) {
            return Err(ProducerError::InvalidConfig {
                reason: format!("fraud_rate must be in [0, 1], got {}", self.fraud_rate),
            });
        }
        Ok(SourceConfig {
            user_count: self.user_count,
            fraud_rate: self.fraud_rate,
            first_sequence: self.first_sequence,
            seed: self.seed,
        })
    }
}

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct City {
    name: &'static str,
    lat: f64,
    lon: f64,
}

static CITIES: &[City] = &[
    City { name: "Mumbai", lat: 19.0760, lon: 72.8777 },
    City { name: "Delhi", lat: 28.6139, lon: 77.2090 },
    City { name: "Bangalore", lat: 12.9716, lon: 77.5946 },
    City { name: "Hyderabad", lat: 17.3850, lon: 78.4867 },
    City { name: "Chennai", lat: 13.0827, lon: 80.2707 },
    City { name: "Kolkata", lat: 22.5726, lon: 88.3639 },
    City { name: "Pune", lat: 18.5204, lon: 73.8567 },
    City { name: "Ahmedabad", lat: 23.0225, lon: 72.5714 },
    City { name: "Jaipur", lat: 26.9124, lon: 75.7873 },
    City { name: "Lucknow", lat: 26.8467, lon: 80.9462 },
];

const PAYMENT_TYPES: &[&str] = &["UPI", "Card", "NetBanking", "Wallet", "NEFT"];
const FRAUD_PAYMENT_TYPES: &[&str] = &["UPI", "Card", "Wallet"];
const DEVICE_TYPES: &[&str] = &["Mobile", "Desktop", "Tablet"];
const MERCHANT_CATEGORIES: &[&str] = &[
    "Grocery", "Electronics", "Travel", "Food", "Fashion", "Fuel", "Healthcare", "Entertainment",
    "Utility", "Jewellery",
];
const FRAUD_MERCHANT_CATEGORIES: &[&str] = &["Jewellery", "Electronics", "Travel"];

const EARTH_RADIUS_KM: f64 = 6371.0;
/// Standard deviation of the point-of-sale offset from the city centre, in degrees.
const LOCATION_JITTER_DEG: f64 = 0.04;

/// Great-circle distance between two coordinates, in km.
#[must_use]
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    EARTH_RADIUS_KM * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

fn pick<'a>(rng: &mut StdRng, items: &[&'a str]) -> &'a str {
    items[rng.random_range(0..items.len())]
}

#[derive(Debug)]
struct UserProfile {
    user_id: u32,
    home: &'static City,
    avg_spend: f64,
    card_age_days: u32,
    device: &'static str,
}

// ---------------------------------------------------------------------------
// SyntheticSource
// ---------------------------------------------------------------------------

/// Generates realistic payment transactions from a simulated user pool.
///
/// Safe to share across tasks; draws are serialized on an internal RNG lock.
#[derive(Debug)]
pub struct SyntheticSource {
    config: SourceConfig,
    users: Vec<UserProfile>,
    rng: Mutex<StdRng>,
    jitter: Normal<f64>,
    sequence: AtomicU64,
}

impl SyntheticSource {
    /// Create a source and its user pool from `config`.
    ///
    /// Seeds the RNG from `config.seed` if set, otherwise from the OS.
    ///
    /// # Errors
    ///
    /// Returns [`ProducerError::InvalidConfig`] if a sampling distribution
    /// cannot be built.
    pub fn new(config: SourceConfig) -> Result<Self, ProducerError> {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let jitter = Normal::new(0.0, LOCATION_JITTER_DEG)
            .map_err(|e| ProducerError::InvalidConfig { reason: e.to_string() })?;

        let users = (1..=config.user_count)
            .map(|user_id| UserProfile {
                user_id,
                home: &CITIES[rng.random_range(0..CITIES.len())],
                avg_spend: rng.random_range(300.0..12_000.0),
                card_age_days: rng.random_range(30..=1825),
                device: pick(&mut rng, DEVICE_TYPES),
            })
            .collect();

        tracing::info!(users = config.user_count, fraud_rate = config.fraud_rate, "producer.ready");
        Ok(Self {
            config,
            users,
            rng: Mutex::new(rng),
            jitter,
            sequence: AtomicU64::new(config.first_sequence),
        })
    }

    /// Generate one transaction stamped with `now`.
    ///
    /// `force_high_risk` always selects the fraud profile.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::GenerationFailed`] if the RNG lock is poisoned
    /// or the amount distribution cannot be built.
    pub fn generate(&self, force_high_risk: bool, now: NaiveDateTime) -> Result<Transaction, SourceError> {
        let mut rng = self.rng.lock().map_err(|e| SourceError::GenerationFailed {
            reason: format!("rng lock poisoned: {e}"),
        })?;
        let rng = &mut *rng;

        let is_fraud = force_high_risk || rng.random_bool(self.config.fraud_rate);
        let user = &self.users[rng.random_range(0..self.users.len())];

        let amount = if is_fraud {
            if rng.random_bool(0.5) {
                round2(rng.random_range(50_000.0..180_000.0))
            } else {
                round2(rng.random_range(1.0..9.0))
            }
        } else {
            let spend = LogNormal::new(user.avg_spend.max(1.0).ln(), 0.7)
                .map_err(|e| SourceError::GenerationFailed { reason: e.to_string() })?;
            round2(spend.sample(rng)).clamp(10.0, 75_000.0)
        };

        let city = if is_fraud && rng.random_bool(0.6) {
            let elsewhere: Vec<&City> = CITIES.iter().filter(|c| c.name != user.home.name).collect();
            elsewhere[rng.random_range(0..elsewhere.len())]
        } else {
            user.home
        };
        let lat = city.lat + self.jitter.sample(rng);
        let lon = city.lon + self.jitter.sample(rng);
        let distance = round2(haversine_km(user.home.lat, user.home.lon, lat, lon));

        let device = if is_fraud && rng.random_bool(0.5) {
            let others: Vec<&str> = DEVICE_TYPES.iter().copied().filter(|d| *d != user.device).collect();
            pick(rng, &others)
        } else {
            user.device
        };

        let avg_amount_7d = round2(user.avg_spend * rng.random_range(0.7..1.3));
        let ratio = ((amount / (avg_amount_7d + 1.0)) * 10_000.0).round() / 10_000.0;
        let daily_txn_count = if is_fraud { rng.random_range(1..=15) } else { rng.random_range(1..=5) };
        let payment_type = pick(rng, if is_fraud { FRAUD_PAYMENT_TYPES } else { PAYMENT_TYPES });
        let merchant_category = if is_fraud && rng.random_bool(0.5) {
            pick(rng, FRAUD_MERCHANT_CATEGORIES)
        } else {
            pick(rng, MERCHANT_CATEGORIES)
        };

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let tx = Transaction {
            id: format!("TXN{sequence:06}"),
            user_id: user.user_id,
            amount,
            payment_type: payment_type.to_owned(),
            merchant_category: merchant_category.to_owned(),
            city: city.name.to_owned(),
            home_city: user.home.name.to_owned(),
            distance_from_home_km: distance,
            location: Some(GeoPoint { lat, lon }),
            home_location: Some(GeoPoint { lat: user.home.lat, lon: user.home.lon }),
            device_type: device.to_owned(),
            home_device: user.device.to_owned(),
            device_mismatch: device != user.device,
            card_age_days: user.card_age_days,
            timestamp: now,
            calendar: CalendarFlags::from_timestamp(now),
            daily_txn_count,
            avg_amount_7d,
            amount_vs_avg_ratio: ratio,
        };
        tracing::debug!(transaction_id = %tx.id, is_fraud, "producer.generated");
        Ok(tx)
    }
}

impl TransactionSource for SyntheticSource {
    async fn next(&self, force_high_risk: bool) -> Result<Transaction, SourceError> {
        self.generate(force_high_risk, Local::now().naive_local())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
