//! Status thresholds and pace classification.
//!
//! The exact cut points are product policy, not architecture; they live here
//! as constants so the display layer and tests share one definition.

use serde::Serialize;

/// Remaining percent at or below which a quota is `Warning`.
pub const WARNING_THRESHOLD: f64 = 25.0;

/// Remaining percent at or below which a quota is `Critical`.
pub const CRITICAL_THRESHOLD: f64 = 10.0;

/// Band (in percent points) around the elapsed-time fraction treated as
/// "on pace".
pub const ON_PACE_TOLERANCE: f64 = 5.0;

/// Threshold classification of a quota's remaining allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QuotaStatus {
    /// Plenty of allowance left
    Healthy,
    /// Running low
    Warning,
    /// Nearly exhausted
    Critical,
    /// Exhausted or over quota
    Depleted,
}

impl QuotaStatus {
    /// Classify a remaining percentage. Monotonic step function:
    /// `<= 0` is `Depleted`, then `Critical`, `Warning`, `Healthy` at
    /// increasing thresholds.
    pub fn from_percent_remaining(percent: f64) -> Self {
        if percent <= 0.0 {
            QuotaStatus::Depleted
        } else if percent <= CRITICAL_THRESHOLD {
            QuotaStatus::Critical
        } else if percent <= WARNING_THRESHOLD {
            QuotaStatus::Warning
        } else {
            QuotaStatus::Healthy
        }
    }
}

/// Comparison of usage consumed against the elapsed fraction of the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Pace {
    /// Consuming faster than the clock
    Ahead,
    /// Consuming slower than the clock
    Behind,
    /// Within the tolerance band
    OnPace,
    /// No reset instant or window length available
    Unknown,
}

impl Pace {
    /// Classify `percent_used - percent_time_elapsed`. Symmetric around
    /// zero with [`ON_PACE_TOLERANCE`] on either side.
    pub fn classify(pace_percent: f64) -> Self {
        if pace_percent > ON_PACE_TOLERANCE {
            Pace::Ahead
        } else if pace_percent < -ON_PACE_TOLERANCE {
            Pace::Behind
        } else {
            Pace::OnPace
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_zero_is_depleted() {
        assert_eq!(QuotaStatus::from_percent_remaining(0.0), QuotaStatus::Depleted);
        assert_eq!(
            QuotaStatus::from_percent_remaining(-40.0),
            QuotaStatus::Depleted
        );
    }

    #[test]
    fn test_status_boundaries() {
        assert_eq!(
            QuotaStatus::from_percent_remaining(CRITICAL_THRESHOLD),
            QuotaStatus::Critical
        );
        assert_eq!(
            QuotaStatus::from_percent_remaining(WARNING_THRESHOLD),
            QuotaStatus::Warning
        );
        assert_eq!(
            QuotaStatus::from_percent_remaining(WARNING_THRESHOLD + 0.1),
            QuotaStatus::Healthy
        );
        assert_eq!(QuotaStatus::from_percent_remaining(100.0), QuotaStatus::Healthy);
    }

    #[test]
    fn test_status_is_monotonic() {
        // Walking up from -10 to 100 must never move to a worse status
        fn rank(s: QuotaStatus) -> u8 {
            match s {
                QuotaStatus::Depleted => 0,
                QuotaStatus::Critical => 1,
                QuotaStatus::Warning => 2,
                QuotaStatus::Healthy => 3,
            }
        }
        let mut prev = 0u8;
        let mut p = -10.0;
        while p <= 100.0 {
            let r = rank(QuotaStatus::from_percent_remaining(p));
            assert!(r >= prev, "status regressed at {p}");
            prev = r;
            p += 0.25;
        }
    }

    #[test]
    fn test_pace_symmetric() {
        assert_eq!(Pace::classify(ON_PACE_TOLERANCE + 0.1), Pace::Ahead);
        assert_eq!(Pace::classify(-(ON_PACE_TOLERANCE + 0.1)), Pace::Behind);
        assert_eq!(Pace::classify(ON_PACE_TOLERANCE), Pace::OnPace);
        assert_eq!(Pace::classify(-ON_PACE_TOLERANCE), Pace::OnPace);
        assert_eq!(Pace::classify(0.0), Pace::OnPace);
    }
}
