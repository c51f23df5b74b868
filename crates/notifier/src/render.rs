// Rust guideline compliant 2026-10-19

//! Message bodies for challenge and block notifications.

use chrono::NaiveDateTime;
use domain::{NoticeKind, RenderedMessage, RiskAssessment, RuleCheck, Transaction};
use std::time::Duration;

const RULE_LINE: &str = "─────────────────────────";

/// Renders notification bodies with a fixed brand and currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRenderer {
    brand: String,
    currency_symbol: String,
}

impl MessageRenderer {
    /// Create a renderer.
    #[must_use]
    pub fn new(brand: impl Into<String>, currency_symbol: impl Into<String>) -> Self {
        Self { brand: brand.into(), currency_symbol: currency_symbol.into() }
    }

    /// Step-up challenge carrying the one-time code.
    #[must_use]
    pub fn challenge(
        &self,
        tx: &Transaction,
        assessment: &RiskAssessment,
        code: &str,
        validity: Duration,
    ) -> RenderedMessage {
        let minutes = validity.as_secs().div_ceil(60);
        let amount = self.amount(tx.amount, 2);

        let rich = format!(
            "<b>{brand} Security Alert</b>\n\n\
             <b>Suspicious Transaction Detected [{tier}]</b>\n\
             {RULE_LINE}\n\
             Transaction : <code>{id}</code>\n\
             Amount      : {amount}\n\
             Location    : {city}\n\
             Risk Score  : {score:.0}/100\n\
             Reason      : {reason}\n\
             {RULE_LINE}\n\
             <b>Your OTP: <code>{code}</code></b>\n\n\
             Reply <b>YES</b> to approve or <b>NO</b> to block.\n\
             Valid for {minutes} minutes.",
            brand = escape_html(&self.brand),
            tier = assessment.tier.as_str(),
            id = escape_html(&tx.id),
            amount = escape_html(&amount),
            city = escape_html(&tx.city),
            score = assessment.score,
            reason = escape_html(&assessment.rationale),
        );

        let plain = format!(
            "{}: Your OTP is {code}. Transaction {}. Valid for {minutes} mins.",
            self.brand, tx.id
        );

        RenderedMessage { kind: NoticeKind::Challenge, transaction_id: tx.id.clone(), rich, plain }
    }

    /// Notice that a transaction was blocked, listing the rule checks that
    /// fired and stamped with the local time the notice is sent.
    #[must_use]
    pub fn block(&self, tx: &Transaction, assessment: &RiskAssessment, sent_at: NaiveDateTime) -> RenderedMessage {
        let signals: Vec<String> = assessment
            .signals
            .rules
            .iter()
            .map(|rule| match rule {
                RuleCheck::NightTime => "Night-time transaction".to_owned(),
                RuleCheck::DeviceMismatch => "Unknown device".to_owned(),
                RuleCheck::FarFromHome => format!("{:.0}km from home", tx.distance_from_home_km),
                RuleCheck::AmountSpike => "Amount far above average".to_owned(),
            })
            .collect();
        let signal_text = if signals.is_empty() {
            "Multiple risk signals".to_owned()
        } else {
            signals.join("\n")
        };

        let rich = format!(
            "<b>{brand} - Transaction BLOCKED</b>\n\n\
             High-risk transaction automatically blocked.\n\
             {RULE_LINE}\n\
             Transaction : <code>{id}</code>\n\
             Amount      : {amount}\n\
             Location    : {city}\n\
             Risk Score  : {score:.0}/100\n\n\
             <b>Risk Signals:</b>\n\
             {signals}\n\
             {RULE_LINE}\n\
             If this was you, contact support immediately.\n\
             Sent        : {sent}",
            brand = escape_html(&self.brand),
            id = escape_html(&tx.id),
            amount = escape_html(&self.amount(tx.amount, 2)),
            city = escape_html(&tx.city),
            score = assessment.score,
            signals = escape_html(&signal_text),
            sent = sent_at.format("%d %b %Y, %I:%M %p"),
        );

        let plain = format!(
            "{}: Transaction BLOCKED. TXN:{} {} from {}. Risk:{:.0}/100. Contact support.",
            self.brand,
            tx.id,
            self.amount(tx.amount, 0),
            tx.city,
            assessment.score
        );

        RenderedMessage { kind: NoticeKind::Block, transaction_id: tx.id.clone(), rich, plain }
    }

    fn amount(&self, amount: f64, decimals: usize) -> String {
        format!("{}{}", self.currency_symbol, format_amount(amount, decimals))
    }
}

/// Format `amount` with `decimals` fractional digits and comma thousands
/// separators, e.g. `95000.0` -> `"95,000.00"`.
#[must_use]
pub fn format_amount(amount: f64, decimals: usize) -> String {
    let digits = format!("{:.*}", decimals, amount.abs());
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (digits.as_str(), None),
    };

    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if amount < 0.0 && digits.bytes().any(|b| b.is_ascii_digit() && b != b'0') {
        out.push('-');
    }
    let len = int_part.len();
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if let Some(frac_part) = frac_part {
        out.push('.');
        out.push_str(frac_part);
    }
    out
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
