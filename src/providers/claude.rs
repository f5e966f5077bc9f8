//! Claude Code provider: drives the CLI's `/usage` screen.
//!
//! The usage overlay is drawn as meter blocks:
//!
//! ```text
//!   Current session
//!   ████████████████████████████████████               72% used
//!   Resets 1am (Asia/Tokyo)
//!
//!   Current week (all models)
//!   ███████████▌                                       23% used
//!   Resets Mar 3, 12am (Asia/Tokyo)
//! ```
//!
//! The screen is redrawn in place, so parsing happens only on rendered
//! text. A known cursor-drift artifact can leave a reset phrase doubled on
//! one line; [`dedupe_repeated`] handles it.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::automation::{locate, AutoResponse, ExecRequest};
use crate::error::ProbeError;
use crate::parse::{
    dedupe_repeated, detect_known_error, parse_account_header, parse_cost_line,
    parse_reset_phrase, percent_remaining,
};
use crate::quota::{QuotaType, UsageQuota, UsageSnapshot};

use super::ProbeContext;

const PROVIDER_ID: &str = "claude";

static MODEL_SCOPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([A-Za-z][A-Za-z0-9 .-]*?)(?:\s+only)?\)").expect("model scope"));

pub(crate) async fn probe(ctx: &ProbeContext) -> Result<UsageSnapshot, ProbeError> {
    let binary = locate("claude").ok_or(ProbeError::BinaryNotFound {
        name: "claude".into(),
    })?;

    let req = ExecRequest {
        binary,
        args: Vec::new(),
        initial_input: Some("/usage\r".to_string()),
        timeout: ctx.timeout,
        working_dir: Some(ctx.home.clone()),
        auto_responses: vec![
            // Old and new trust prompt phrasing
            AutoResponse::new("Do you trust the files in this folder?", "\r"),
            AutoResponse::new("Yes, I trust this folder", "\r"),
            // The slash-command menu needs a confirming Enter
            AutoResponse::new("/usage", "\r"),
        ],
    };

    let (text, _exit_code) = super::run_cli(req).await?;
    parse_usage(&text)
}

/// Parse the rendered `/usage` screen into a snapshot.
pub(crate) fn parse_usage(text: &str) -> Result<UsageSnapshot, ProbeError> {
    if let Some(err) = detect_known_error(text) {
        return Err(err);
    }

    let lines: Vec<&str> = text.lines().collect();
    let mut snapshot = UsageSnapshot::new(PROVIDER_ID);
    let now = Utc::now();

    for (i, raw_line) in lines.iter().enumerate() {
        let line = raw_line.trim();

        if snapshot.account_email.is_none() {
            if let Some(header) = parse_account_header(line) {
                snapshot.login_method = Some(header.product);
                snapshot.account_tier = Some(header.plan);
                snapshot.account_email = Some(header.account);
                continue;
            }
        }

        let Some(remaining) = percent_remaining(line) else {
            continue;
        };

        // The meter label sits on the line above the bar
        let label = i
            .checked_sub(1)
            .map(|j| lines[j].trim())
            .filter(|l| !l.is_empty() && !l.starts_with("Settings:"))
            .unwrap_or_default();
        if label.is_empty() {
            continue;
        }

        let mut quota = UsageQuota::new(PROVIDER_ID, quota_type_for(label), remaining);

        // Reset and spend metadata follow the bar until the next blank line
        for follow in lines.iter().skip(i + 1) {
            let follow = follow.trim();
            if follow.is_empty() || percent_remaining(follow).is_some() {
                break;
            }
            if let Some(cost) = parse_cost_line(follow) {
                snapshot.cost_usage = Some(cost);
            }
            if let Some(reset_part) = follow.split('·').find(|p| p.contains("Resets")) {
                let reset_text = dedupe_repeated(reset_part.trim()).to_string();
                if let Some(at) = parse_reset_phrase(&reset_text, now) {
                    quota = quota.with_resets_at(at);
                }
                quota = quota.with_reset_text(reset_text);
            }
        }

        snapshot.quotas.push(quota);
    }

    if snapshot.quotas.is_empty() {
        return Err(ProbeError::parse("no usage meters found in /usage output"));
    }
    Ok(snapshot)
}

fn quota_type_for(label: &str) -> QuotaType {
    let lower = label.to_ascii_lowercase();
    if lower.contains("session") {
        return QuotaType::Session;
    }
    if lower.contains("week") {
        if lower.contains("all models") {
            return QuotaType::Weekly;
        }
        if let Some(caps) = MODEL_SCOPE.captures(label) {
            return QuotaType::Model(caps[1].to_string());
        }
        return QuotaType::Weekly;
    }
    QuotaType::TimeLimit(label.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::QuotaStatus;
    use pretty_assertions::assert_eq;

    const USAGE_SCREEN: &str = r#"
 Settings:  Status   Config   Usage  (←/→ or tab to cycle)

 Claude Code · Max plan · dev@example.com

  Current session
  ████████████████████████████████████               72% used
  Resets 1am (Asia/Tokyo)

  Current week (all models)
  ███████████▌                                       23% used
  Resets Mar 3, 12am (Asia/Tokyo)

  Current week (Opus only)
                                                     0% used

  Extra usage
  ██████████████████████▏                            44% used
  $22.22 / $50.00 spent · Resets Mar 1, 12am (Asia/Tokyo)

  Esc to cancel
"#;

    #[test]
    fn test_parse_full_usage_screen() {
        let snap = parse_usage(USAGE_SCREEN).unwrap();
        assert_eq!(snap.quotas.len(), 4);

        assert_eq!(snap.quotas[0].quota_type, QuotaType::Session);
        assert_eq!(snap.quotas[0].percent_remaining, 28.0);
        assert_eq!(
            snap.quotas[0].reset_text.as_deref(),
            Some("Resets 1am (Asia/Tokyo)")
        );
        assert!(snap.quotas[0].resets_at.is_some());

        assert_eq!(snap.quotas[1].quota_type, QuotaType::Weekly);
        assert_eq!(snap.quotas[1].percent_remaining, 77.0);

        assert_eq!(snap.quotas[2].quota_type, QuotaType::Model("Opus".into()));
        assert_eq!(snap.quotas[2].percent_remaining, 100.0);
        assert_eq!(snap.quotas[2].status(), QuotaStatus::Healthy);

        assert_eq!(
            snap.quotas[3].quota_type,
            QuotaType::TimeLimit("Extra usage".into())
        );

        let cost = snap.cost_usage.unwrap();
        assert_eq!(cost.spent, 22.22);
        assert_eq!(cost.budget, 50.0);

        assert_eq!(snap.account_email.as_deref(), Some("dev@example.com"));
        assert_eq!(snap.account_tier.as_deref(), Some("Max plan"));
        assert_eq!(snap.login_method.as_deref(), Some("Claude Code"));
    }

    #[test]
    fn test_doubled_reset_phrase_is_deduplicated() {
        let screen = "\
  Current session
  ████████                                           50% used
  Resets 4:59pm (UTC)Resets 4:59pm (UTC)
";
        let snap = parse_usage(screen).unwrap();
        assert_eq!(
            snap.quotas[0].reset_text.as_deref(),
            Some("Resets 4:59pm (UTC)")
        );
    }

    #[test]
    fn test_trust_prompt_leftover_classifies_as_execution_failure() {
        let err = parse_usage("Do you trust the files in this folder?\n  ❯ Yes\n    No")
            .unwrap_err();
        assert!(matches!(err, ProbeError::ExecutionFailed { .. }));
    }

    #[test]
    fn test_login_prompt_classifies_as_auth_required() {
        let err = parse_usage("Please run /login to authenticate").unwrap_err();
        assert!(matches!(err, ProbeError::AuthenticationRequired));
    }

    #[test]
    fn test_empty_screen_is_parse_failure() {
        let err = parse_usage("nothing useful here").unwrap_err();
        assert!(matches!(err, ProbeError::ParseFailed { .. }));
    }

    #[test]
    fn test_over_quota_meter() {
        let screen = "\
  Current session
  ████████                                           110% used
";
        let snap = parse_usage(screen).unwrap();
        assert_eq!(snap.quotas[0].percent_remaining, -10.0);
        assert_eq!(snap.quotas[0].status(), QuotaStatus::Depleted);
    }
}
