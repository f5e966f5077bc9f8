//! Gemini CLI provider: `/stats` output.
//!
//! Unlike the meter-block screens, Gemini reports each limit on a single
//! line with the label up front:
//!
//! ```text
//!  Gemini CLI · Free tier · dev@example.com
//!
//!  Daily requests: 38% used · resets 4:59pm (UTC)
//!  Daily tokens: 12% used
//! ```

use chrono::Utc;

use crate::automation::{locate, AutoResponse, ExecRequest};
use crate::error::ProbeError;
use crate::parse::{
    dedupe_repeated, detect_known_error, parse_account_header, parse_reset_phrase,
    percent_remaining,
};
use crate::quota::{QuotaType, UsageQuota, UsageSnapshot};

use super::ProbeContext;

const PROVIDER_ID: &str = "gemini";

pub(crate) async fn probe(ctx: &ProbeContext) -> Result<UsageSnapshot, ProbeError> {
    let binary = locate("gemini").ok_or(ProbeError::BinaryNotFound {
        name: "gemini".into(),
    })?;

    let req = ExecRequest {
        binary,
        args: Vec::new(),
        initial_input: Some("/stats\r".to_string()),
        timeout: ctx.timeout,
        working_dir: Some(ctx.home.clone()),
        auto_responses: vec![AutoResponse::new("Do you trust this folder?", "\r")],
    };
    let (text, _exit_code) = super::run_cli(req).await?;
    parse_stats(&text)
}

/// Parse the rendered `/stats` output.
pub(crate) fn parse_stats(text: &str) -> Result<UsageSnapshot, ProbeError> {
    if let Some(err) = detect_known_error(text) {
        return Err(err);
    }

    let mut snapshot = UsageSnapshot::new(PROVIDER_ID);
    let now = Utc::now();

    for raw_line in text.lines() {
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
        let Some((label, rest)) = line.split_once(':') else {
            continue;
        };

        let mut quota = UsageQuota::new(
            PROVIDER_ID,
            QuotaType::TimeLimit(label.trim().to_string()),
            remaining,
        );
        if let Some(reset_part) = rest.split('·').find(|p| p.contains("resets")) {
            let phrase = dedupe_repeated(reset_part.trim()).to_string();
            if let Some(at) = parse_reset_phrase(&phrase, now) {
                quota = quota.with_resets_at(at);
            }
            quota = quota.with_reset_text(phrase);
        }
        snapshot.quotas.push(quota);
    }

    if snapshot.quotas.is_empty() {
        return Err(ProbeError::parse("no usage lines found in /stats output"));
    }
    Ok(snapshot)
}
