// Rust guideline compliant 2026-10-19

//! Risk assessment component: signal fusion and decision policy.
//!
//! [`RiskPolicy`] turns the raw signals of a `domain::Scorer` into a bounded
//! risk score, a tier, an action and a rationale. [`Assessor`] pairs a policy
//! with an injected scorer; it owns no model logic.
//!
//! The weights and thresholds are policy, not physics: they are configuration
//! values with the design defaults, built via [`RiskPolicy::builder`].

use domain::{
    Action, Attribution, Direction, Impact, RiskAssessment, RiskTier, RuleCheck, ScoredSignals,
    Scorer, ScorerAttribution, ScorerError, SignalBreakdown, Transaction, round2,
};

/// Rationale used when the scorer returns no attributions.
const FALLBACK_RATIONALE: &str = "unusual pattern";

// ---------------------------------------------------------------------------
// AssessorError
// ---------------------------------------------------------------------------

/// Errors raised while building a policy or assessing a transaction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AssessorError {
    /// The supplied policy configuration is invalid.
    #[error("invalid risk policy: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
    /// The scorer failed or returned values outside its contract.
    #[error("scorer unavailable: {0}")]
    Scorer(#[from] ScorerError),
}

// ---------------------------------------------------------------------------
// RiskPolicy + builder
// ---------------------------------------------------------------------------

/// Points awarded by each rule check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RulePoints {
    pub night_time: f64,
    pub device_mismatch: f64,
    pub far_from_home: f64,
    pub amount_spike: f64,
}

impl Default for RulePoints {
    fn default() -> Self {
        Self { night_time: 4.0, device_mismatch: 4.0, far_from_home: 4.0, amount_spike: 3.0 }
    }
}

/// Rule-check inputs extracted from a transaction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleFlags {
    pub night_time: bool,
    pub device_mismatch: bool,
    pub distance_from_home_km: f64,
    pub amount_vs_avg_ratio: f64,
}

impl From<&Transaction> for RuleFlags {
    fn from(tx: &Transaction) -> Self {
        Self {
            night_time: tx.calendar.is_night,
            device_mismatch: tx.device_mismatch,
            distance_from_home_km: tx.distance_from_home_km,
            amount_vs_avg_ratio: tx.amount_vs_avg_ratio,
        }
    }
}

/// Weighted components of a fused score.
#[derive(Debug, Clone, PartialEq)]
pub struct Fusion {
    /// Final score in `[0, 100]`, 2 decimals.
    pub score: f64,
    pub classifier_component: f64,
    pub anomaly_component: f64,
    pub rule_component: f64,
    pub rules: Vec<RuleCheck>,
}

/// Fusion weights, tier thresholds and explanation settings.
///
/// Construct via [`RiskPolicy::builder`] or [`RiskPolicy::default`].
#[derive(Debug, Clone, PartialEq)]
pub struct RiskPolicy {
    classifier_weight: f64,
    anomaly_weight: f64,
    anomaly_saturation: f64,
    rule_cap: f64,
    rule_points: RulePoints,
    distance_limit_km: f64,
    ratio_limit: f64,
    medium_threshold: f64,
    high_threshold: f64,
    attribution_limit: usize,
    high_impact: f64,
    medium_impact: f64,
}

/// Builder for [`RiskPolicy`].
///
/// Obtain via [`RiskPolicy::builder`]; finalize with [`build`](Self::build).
#[derive(Debug)]
pub struct RiskPolicyBuilder {
    policy: RiskPolicy,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            classifier_weight: 60.0,
            anomaly_weight: 25.0,
            anomaly_saturation: 3.0,
            rule_cap: 15.0,
            rule_points: RulePoints::default(),
            distance_limit_km: 500.0,
            ratio_limit: 5.0,
            medium_threshold: 40.0,
            high_threshold: 70.0,
            attribution_limit: 4,
            high_impact: 0.3,
            medium_impact: 0.1,
        }
    }
}

impl RiskPolicy {
    /// Create a builder pre-filled with the design defaults.
    #[must_use]
    pub fn builder() -> RiskPolicyBuilder {
        RiskPolicyBuilder { policy: Self::default() }
    }

    /// Lowest score routed to MEDIUM.
    #[must_use]
    pub fn medium_threshold(&self) -> f64 {
        self.medium_threshold
    }

    /// Lowest score routed to HIGH.
    #[must_use]
    pub fn high_threshold(&self) -> f64 {
        self.high_threshold
    }

    /// Combine the three signal families into one bounded score.
    ///
    /// `classifier_prob * w_c + min(anomaly / (k * threshold), 1) * w_a +
    /// min(rule points, cap)`, clamped to `[0, 100]` and rounded to 2 decimals.
    /// Pure: identical inputs give identical output.
    #[must_use]
    pub fn fuse(
        &self,
        classifier_prob: f64,
        anomaly_score: f64,
        anomaly_threshold: f64,
        flags: &RuleFlags,
    ) -> Fusion {
        let classifier_component = classifier_prob * self.classifier_weight;

        let normalized = (anomaly_score / (self.anomaly_saturation * anomaly_threshold)).min(1.0);
        let anomaly_component = normalized * self.anomaly_weight;

        let mut rules = Vec::with_capacity(4);
        let mut points = 0.0;
        if flags.night_time {
            rules.push(RuleCheck::NightTime);
            points += self.rule_points.night_time;
        }
        if flags.device_mismatch {
            rules.push(RuleCheck::DeviceMismatch);
            points += self.rule_points.device_mismatch;
        }
        if flags.distance_from_home_km > self.distance_limit_km {
            rules.push(RuleCheck::FarFromHome);
            points += self.rule_points.far_from_home;
        }
        if flags.amount_vs_avg_ratio > self.ratio_limit {
            rules.push(RuleCheck::AmountSpike);
            points += self.rule_points.amount_spike;
        }
        let rule_component = f64::min(points, self.rule_cap);

        let raw = classifier_component + anomaly_component + rule_component;
        Fusion {
            score: round2(raw.clamp(0.0, 100.0)),
            classifier_component,
            anomaly_component,
            rule_component,
            rules,
        }
    }

    /// Map a score to its tier and action.
    ///
    /// Bands are inclusive-low / exclusive-high; the top band is closed, so a
    /// score exactly on a threshold takes the higher-risk branch.
    #[must_use]
    pub fn decide(&self, score: f64) -> (RiskTier, Action) {
        if score < self.medium_threshold {
            (RiskTier::Low, Action::Allow)
        } else if score < self.high_threshold {
            (RiskTier::Medium, Action::Otp)
        } else {
            (RiskTier::High, Action::Block)
        }
    }

    /// Truncate and tag the scorer's ranking; pick the rationale label.
    ///
    /// Order is passed through unchanged. The rationale is the label with the
    /// largest absolute contribution, the earliest one on ties.
    #[must_use]
    pub fn explain(&self, ranked: &[ScorerAttribution]) -> (Vec<Attribution>, String) {
        let kept = &ranked[..ranked.len().min(self.attribution_limit)];

        let rationale = kept
            .iter()
            .fold(None::<&ScorerAttribution>, |best, a| match best {
                Some(b) if b.contribution.abs() >= a.contribution.abs() => Some(b),
                _ => Some(a),
            })
            .map_or_else(|| FALLBACK_RATIONALE.to_owned(), |a| a.label.clone());

        let attributions = kept
            .iter()
            .map(|a| Attribution {
                feature: a.feature.clone(),
                label: a.label.clone(),
                contribution: (a.contribution * 10_000.0).round() / 10_000.0,
                direction: if a.contribution > 0.0 { Direction::Increases } else { Direction::Decreases },
                impact: self.impact(a.contribution),
            })
            .collect();

        (attributions, rationale)
    }

    fn impact(&self, contribution: f64) -> Impact {
        let magnitude = contribution.abs();
        if magnitude > self.high_impact {
            Impact::High
        } else if magnitude > self.medium_impact {
            Impact::Medium
        } else {
            Impact::Low
        }
    }

    /// Build the full assessment for `tx` from the scorer's raw signals.
    ///
    /// # Errors
    ///
    /// Returns [`AssessorError::Scorer`] with `ScorerError::InvalidOutput` when
    /// the probability is outside `[0, 1]`, the anomaly score is negative or
    /// not finite, or the threshold is not strictly positive.
    pub fn assess(&self, tx: &Transaction, signals: &ScoredSignals) -> Result<RiskAssessment, AssessorError> {
        validate(signals)?;

        let fusion = self.fuse(
            signals.classifier_prob,
            signals.anomaly_score,
            signals.anomaly_threshold,
            &RuleFlags::from(tx),
        );
        let (tier, action) = self.decide(fusion.score);
        let (attributions, rationale) = self.explain(&signals.attributions);

        Ok(RiskAssessment {
            score: fusion.score,
            tier,
            action,
            signals: SignalBreakdown {
                classifier_prob: signals.classifier_prob,
                anomaly_score: signals.anomaly_score,
                anomaly_threshold: signals.anomaly_threshold,
                is_anomaly: signals.anomaly_score > signals.anomaly_threshold,
                classifier_component: fusion.classifier_component,
                anomaly_component: fusion.anomaly_component,
                rule_component: fusion.rule_component,
                rules: fusion.rules,
            },
            attributions,
            rationale,
            model_version: signals.model_version.clone(),
        })
    }
}

fn validate(signals: &ScoredSignals) -> Result<(), ScorerError> {
    let reason = if !(0.0..=1.0).contains(&signals.classifier_prob) {
        format!("classifier probability {} outside [0, 1]", signals.classifier_prob)
    } else if !signals.anomaly_score.is_finite() || signals.anomaly_score < 0.0 {
        format!("anomaly score {} is not a finite non-negative value", signals.anomaly_score)
    } else if !signals.anomaly_threshold.is_finite() || signals.anomaly_threshold <= 0.0 {
        format!("anomaly threshold {} is not strictly positive", signals.anomaly_threshold)
    } else {
        return Ok(());
    };
    Err(ScorerError::InvalidOutput { reason })
}

impl RiskPolicyBuilder {
    /// Override the classifier and anomaly weights.
    #[must_use]
    pub fn weights(mut self, classifier: f64, anomaly: f64) -> Self {
        self.policy.classifier_weight = classifier;
        self.policy.anomaly_weight = anomaly;
        self
    }

    /// Multiple of the anomaly threshold at which the anomaly component saturates.
    #[must_use]
    pub fn anomaly_saturation(mut self, multiple: f64) -> Self {
        self.policy.anomaly_saturation = multiple;
        self
    }

    /// Upper bound on the rule component.
    #[must_use]
    pub fn rule_cap(mut self, cap: f64) -> Self {
        self.policy.rule_cap = cap;
        self
    }

    /// Override the points awarded per rule check.
    #[must_use]
    pub fn rule_points(mut self, points: RulePoints) -> Self {
        self.policy.rule_points = points;
        self
    }

    /// Distance beyond which the far-from-home rule fires.
    #[must_use]
    pub fn distance_limit_km(mut self, km: f64) -> Self {
        self.policy.distance_limit_km = km;
        self
    }

    /// Amount-to-average ratio beyond which the spike rule fires.
    #[must_use]
    pub fn ratio_limit(mut self, ratio: f64) -> Self {
        self.policy.ratio_limit = ratio;
        self
    }

    /// Lowest scores of the MEDIUM and HIGH bands.
    #[must_use]
    pub fn tier_thresholds(mut self, medium: f64, high: f64) -> Self {
        self.policy.medium_threshold = medium;
        self.policy.high_threshold = high;
        self
    }

    /// Number of attributions kept on an assessment.
    #[must_use]
    pub fn attribution_limit(mut self, limit: usize) -> Self {
        self.policy.attribution_limit = limit;
        self
    }

    /// Magnitudes above which an attribution is tagged HIGH and MEDIUM.
    #[must_use]
    pub fn impact_thresholds(mut self, high: f64, medium: f64) -> Self {
        self.policy.high_impact = high;
        self.policy.medium_impact = medium;
        self
    }

    /// Validate and build the policy.
    ///
    /// # Errors
    ///
    /// Returns [`AssessorError::InvalidConfig`] for non-finite or negative
    /// weights, points or limits, tier thresholds outside `(0, 100]` or not
    /// strictly increasing, a zero attribution limit, or `high < medium`
    /// impact thresholds.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<RiskPolicy, AssessorError> {
        let p = &self.policy;
        let non_negative = [
            ("classifier weight", p.classifier_weight),
            ("anomaly weight", p.anomaly_weight),
            ("rule cap", p.rule_cap),
            ("night-time points", p.rule_points.night_time),
            ("device-mismatch points", p.rule_points.device_mismatch),
            ("far-from-home points", p.rule_points.far_from_home),
            ("amount-spike points", p.rule_points.amount_spike),
            ("distance limit", p.distance_limit_km),
            ("ratio limit", p.ratio_limit),
            ("impact threshold", p.medium_impact),
        ];
        if let Some((name, value)) = non_negative.iter().find(|(_, v)| !v.is_finite() || *v < 0.0) {
            return Err(invalid(format!("{name} must be finite and >= 0, got {value}")));
        }
        if !p.anomaly_saturation.is_finite() || p.anomaly_saturation <= 0.0 {
            return Err(invalid(format!(
                "anomaly saturation must be > 0, got {}",
                p.anomaly_saturation
            )));
        }
        let in_range = |t: f64| t > 0.0 && t <= 100.0;
        if !in_range(p.medium_threshold) || !in_range(p.high_threshold) || p.medium_threshold >= p.high_threshold {
            return Err(invalid(format!(
                "tier thresholds must satisfy 0 < medium < high <= 100, got {} / {}",
                p.medium_threshold, p.high_threshold
            )));
        }
        if p.attribution_limit == 0 {
            return Err(invalid("attribution limit must be >= 1".to_owned()));
        }
        if !p.high_impact.is_finite() || p.high_impact < p.medium_impact {
            return Err(invalid(format!(
                "impact thresholds must satisfy medium <= high, got {} / {}",
                p.medium_impact, p.high_impact
            )));
        }
        Ok(self.policy)
    }
}

fn invalid(reason: String) -> AssessorError {
    AssessorError::InvalidConfig { reason }
}

// ---------------------------------------------------------------------------
// Assessor
// ---------------------------------------------------------------------------

/// Pipeline component that scores a transaction and applies a [`RiskPolicy`].
///
/// Generic over any `Scorer` adapter; carries no model-specific logic.
#[derive(Debug)]
pub struct Assessor<S> {
    scorer: S,
    policy: RiskPolicy,
}

impl<S: Scorer> Assessor<S> {
    /// Create an assessor wrapping `scorer`.
    #[must_use]
    pub fn new(scorer: S, policy: RiskPolicy) -> Self {
        Self { scorer, policy }
    }

    /// The active policy.
    #[must_use]
    pub fn policy(&self) -> &RiskPolicy {
        &self.policy
    }

    /// The injected scorer.
    #[must_use]
    pub fn scorer(&self) -> &S {
        &self.scorer
    }

    /// Score `tx` and decide on it.
    ///
    /// There is no default score: any scorer failure is returned as an error
    /// so an unscored transaction can never be allowed implicitly.
    ///
    /// # Errors
    ///
    /// Returns [`AssessorError::Scorer`] when the scorer fails or its output
    /// is outside contract.
    pub async fn assess(&self, tx: &Transaction) -> Result<RiskAssessment, AssessorError> {
        let signals = self.scorer.evaluate(tx).await.inspect_err(|e| {
            tracing::error!(transaction_id = %tx.id, error = %e, "assessor.scorer.failed");
        })?;
        let assessment = self.policy.assess(tx, &signals)?;
        tracing::debug!(
            transaction_id = %tx.id,
            score = assessment.score,
            action = assessment.action.as_str(),
            "assessor.assessed"
        );
        Ok(assessment)
    }
}
