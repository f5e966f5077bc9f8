//! Quota domain model: measured limits, snapshots, and derived analytics.

mod status;
mod types;

pub use status::{Pace, QuotaStatus, CRITICAL_THRESHOLD, ON_PACE_TOLERANCE, WARNING_THRESHOLD};
pub use types::{CostUsage, QuotaType, UsageQuota, UsageSnapshot};
