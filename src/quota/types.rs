//! Quota value types produced by provider parsers.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::status::{Pace, QuotaStatus};

/// Kind of limit a quota measures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum QuotaType {
    /// Rolling session window (e.g., Claude's 5-hour block)
    Session,
    /// Weekly allowance across all models
    Weekly,
    /// Weekly allowance scoped to one model family (e.g., "Opus")
    Model(String),
    /// Provider-defined window identified only by a label (e.g., "Daily")
    TimeLimit(String),
}

impl QuotaType {
    /// Total length of the reset window, where the product defines one.
    ///
    /// Model-scoped quotas share the weekly window. Labelled time limits
    /// have no known duration, so pace analytics stay `Unknown` for them.
    pub fn window(&self) -> Option<Duration> {
        match self {
            QuotaType::Session => Some(Duration::hours(5)),
            QuotaType::Weekly | QuotaType::Model(_) => Some(Duration::days(7)),
            QuotaType::TimeLimit(_) => None,
        }
    }

    /// Short display label.
    pub fn label(&self) -> String {
        match self {
            QuotaType::Session => "Session".to_string(),
            QuotaType::Weekly => "Weekly".to_string(),
            QuotaType::Model(name) => name.clone(),
            QuotaType::TimeLimit(label) => label.clone(),
        }
    }
}

/// One measured usage limit, captured by a single probe.
///
/// `percent_remaining` is capped at 100 on construction; negative values are
/// valid and mean the account is over quota.
#[derive(Debug, Clone, Serialize)]
pub struct UsageQuota {
    /// Percent of the allowance still available (<= 100, may be negative)
    pub percent_remaining: f64,
    /// What kind of limit this is
    pub quota_type: QuotaType,
    /// Provider identifier (e.g., "claude")
    pub provider_id: String,
    /// Absolute instant the window resets, when the provider reported one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resets_at: Option<DateTime<Utc>>,
    /// Original reset phrase, preserved verbatim for display fidelity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_text: Option<String>,
}

impl UsageQuota {
    /// Create a quota, capping `percent_remaining` at 100.
    pub fn new(provider_id: impl Into<String>, quota_type: QuotaType, percent_remaining: f64) -> Self {
        Self {
            percent_remaining: percent_remaining.min(100.0),
            quota_type,
            provider_id: provider_id.into(),
            resets_at: None,
            reset_text: None,
        }
    }

    /// Builder: attach a resolved reset instant.
    pub fn with_resets_at(mut self, at: DateTime<Utc>) -> Self {
        self.resets_at = Some(at);
        self
    }

    /// Builder: attach the original reset phrase.
    pub fn with_reset_text(mut self, text: impl Into<String>) -> Self {
        self.reset_text = Some(text.into());
        self
    }

    /// Percent of the allowance consumed.
    pub fn percent_used(&self) -> f64 {
        100.0 - self.percent_remaining
    }

    /// Threshold classification of the remaining allowance.
    pub fn status(&self) -> QuotaStatus {
        QuotaStatus::from_percent_remaining(self.percent_remaining)
    }

    /// Fraction of the reset window already elapsed, as a percent.
    ///
    /// `None` (not zero) when the reset instant or the window length for
    /// this quota type is unknown.
    pub fn percent_time_elapsed(&self) -> Option<f64> {
        self.percent_time_elapsed_at(Utc::now())
    }

    pub(crate) fn percent_time_elapsed_at(&self, now: DateTime<Utc>) -> Option<f64> {
        let resets_at = self.resets_at?;
        let window = self.quota_type.window()?;
        let remaining = resets_at - now;
        let elapsed = window - remaining;
        let fraction = elapsed.num_milliseconds() as f64 / window.num_milliseconds() as f64;
        Some((fraction * 100.0).clamp(0.0, 100.0))
    }

    /// Usage consumed ahead of (positive) or behind (negative) the clock.
    pub fn pace_percent(&self) -> Option<f64> {
        Some(self.percent_used() - self.percent_time_elapsed()?)
    }

    /// Pace classification against the elapsed fraction of the window.
    pub fn pace(&self) -> Pace {
        self.pace_at(Utc::now())
    }

    pub(crate) fn pace_at(&self, now: DateTime<Utc>) -> Pace {
        match self.percent_time_elapsed_at(now) {
            Some(elapsed) => Pace::classify(self.percent_used() - elapsed),
            None => Pace::Unknown,
        }
    }
}

/// Pay-as-you-go overage figures, in major currency units (dollars).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostUsage {
    /// Amount spent in the current period
    pub spent: f64,
    /// Budget for the current period
    pub budget: f64,
}

impl CostUsage {
    /// Display form matching the CLIs' own phrasing.
    pub fn display(&self) -> String {
        format!("${:.2} / ${:.2}", self.spent, self.budget)
    }
}

/// Complete result of one probe cycle for one provider.
///
/// Immutable once constructed; uniqueness of quotas by type is a parser
/// responsibility, not enforced here.
#[derive(Debug, Clone, Serialize)]
pub struct UsageSnapshot {
    /// Provider identifier
    pub provider_id: String,
    /// Quotas in the order the provider reported them
    pub quotas: Vec<UsageQuota>,
    /// When this snapshot was captured
    pub captured_at: DateTime<Utc>,
    /// Account email if the provider surfaced one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_email: Option<String>,
    /// Account organization if available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_organization: Option<String>,
    /// Plan tier (e.g., "Pro", "Max")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_tier: Option<String>,
    /// How the account is signed in (e.g., "Claude account", "ChatGPT")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_method: Option<String>,
    /// Pay-as-you-go spend, when the product reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_usage: Option<CostUsage>,
}

impl UsageSnapshot {
    /// Create an empty snapshot for a provider, stamped now.
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            quotas: Vec::new(),
            captured_at: Utc::now(),
            account_email: None,
            account_organization: None,
            account_tier: None,
            login_method: None,
            cost_usage: None,
        }
    }

    /// The quota with the least remaining allowance, what a status display
    /// leads with.
    pub fn most_constrained(&self) -> Option<&UsageQuota> {
        self.quotas.iter().min_by(|a, b| {
            a.percent_remaining
                .partial_cmp(&b.percent_remaining)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    /// True when any quota is fully depleted or over quota.
    pub fn any_depleted(&self) -> bool {
        self.quotas
            .iter()
            .any(|q| q.status() == QuotaStatus::Depleted)
    }
}
