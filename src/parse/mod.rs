//! Shared extraction helpers used by every provider parser.
//!
//! Each provider's output differs in layout but reuses the same phrasings:
//! "N% left"/"N% used" percentages, reset phrases, "$A / $B spent" cost
//! lines, and a product-plan-account header. The helpers here normalize
//! those into the quota domain model so parsers stay thin.

mod reset;

pub use reset::{parse_reset_absolute, parse_reset_phrase, parse_reset_relative};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ProbeError;
use crate::quota::CostUsage;

static PERCENT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(-?\d+(?:\.\d+)?)\s*%\s*(left|remaining|used)").expect("percent pattern")
});

static COST_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$([0-9][0-9,]*(?:\.[0-9]+)?)\s*/\s*\$([0-9][0-9,]*(?:\.[0-9]+)?)\s*spent")
        .expect("cost pattern")
});

/// Extract a percentage from "N% left" / "N% remaining" / "N% used"
/// phrasing, normalized to percent *remaining*.
pub fn percent_remaining(line: &str) -> Option<f64> {
    let caps = PERCENT_PATTERN.captures(line)?;
    let value: f64 = caps[1].parse().ok()?;
    let phrase = caps[2].to_ascii_lowercase();
    if phrase == "used" {
        Some(100.0 - value)
    } else {
        Some(value)
    }
}

/// Collapse a string that is the same text concatenated twice into one copy.
///
/// Some CLIs drift cursor alignment while redrawing, which leaves a reset
/// phrase doubled on one rendered line ("Resets 4:59pmResets 4:59pm").
/// Applied repeatedly until stable.
pub fn dedupe_repeated(text: &str) -> &str {
    let mut s = text;
    loop {
        let len = s.len();
        if len < 2 || len % 2 != 0 {
            return s;
        }
        let mid = len / 2;
        if !s.is_char_boundary(mid) || s[..mid] != s[mid..] {
            return s;
        }
        s = &s[..mid];
    }
}

/// Product-plan-account header line, e.g.
/// `Claude Code · Pro plan · user@example.com`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountHeader {
    pub product: String,
    pub plan: String,
    pub account: String,
}

/// Parse a `product · plan · account` header line.
pub fn parse_account_header(line: &str) -> Option<AccountHeader> {
    let parts: Vec<&str> = line.split('·').map(str::trim).collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    Some(AccountHeader {
        product: parts[0].to_string(),
        plan: parts[1].to_string(),
        account: parts[2].to_string(),
    })
}

/// Extract a "$A / $B spent" pair, tolerating comma-grouped thousands.
pub fn parse_cost_line(line: &str) -> Option<CostUsage> {
    let caps = COST_PATTERN.captures(line)?;
    Some(CostUsage {
        spent: parse_dollars(&caps[1])?,
        budget: parse_dollars(&caps[2])?,
    })
}

fn parse_dollars(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse().ok()
}

/// Convert an API integer minor-currency-unit field (cents) to dollars.
pub fn cost_from_cents(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Phrases every target CLI can emit that mean the probe cannot succeed,
/// mapped to the shared failure taxonomy. Checked by parsers before they
/// attempt quota extraction.
pub fn detect_known_error(text: &str) -> Option<ProbeError> {
    // Trust prompts, old and new phrasing. Seeing one in final output means
    // the auto-response never fired.
    if text.contains("Do you trust the files in this folder?")
        || text.contains("Yes, I trust this folder")
        || text.contains("Do you trust this folder?")
    {
        return Some(ProbeError::execution("trust prompt was not accepted"));
    }

    if text.contains("OAuth token has expired")
        || text.contains("session has expired")
        || text.contains("Session expired")
    {
        return Some(ProbeError::SessionExpired);
    }

    if text.contains("Please run /login")
        || text.contains("Not logged in")
        || text.contains("Invalid API key")
        || text.contains("You need to log in")
    {
        return Some(ProbeError::AuthenticationRequired);
    }

    if let Some(line) = text
        .lines()
        .find(|l| l.to_ascii_lowercase().contains("subscription plans only"))
    {
        return Some(ProbeError::SubscriptionRequired {
            message: line.trim().to_string(),
        });
    }

    if text.contains("A new version is available")
        || text.contains("Update available! Run")
    {
        return Some(ProbeError::execution("CLI requires an update"));
    }

    None
}
