//! Codex CLI provider: `/status` screen, with an API fallback.
//!
//! The CLI's status screen reports rate limits inline:
//!
//! ```text
//!  Signed in with ChatGPT · Plus plan · dev@example.com
//!
//!  5h limit
//!  [████████..........] 37% used (resets 2h 15m)
//!
//!  Weekly limit
//!  [██................] 12% used (resets 6d 23h 22m)
//! ```
//!
//! When the binary is not installed but `~/.codex/auth.json` exists, the
//! probe falls back to the usage API using the stored ChatGPT OAuth tokens
//! (refreshable through the OpenAI token endpoint).

use std::path::PathBuf;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::automation::{locate, ExecRequest};
use crate::credentials::{
    CredentialManager, FileCredentialStore, HttpRequest, TokenEndpoint,
};
use crate::error::ProbeError;
use crate::parse::{
    detect_known_error, parse_account_header, parse_reset_phrase, percent_remaining,
};
use crate::quota::{QuotaType, UsageQuota, UsageSnapshot};

use super::ProbeContext;

const PROVIDER_ID: &str = "codex";
const USAGE_URL: &str = "https://chatgpt.com/backend-api/codex/usage";
const TOKEN_URL: &str = "https://auth.openai.com/oauth/token";
const OAUTH_CLIENT_ID: &str = "app_EMoamEEZ73f0CkXaXp7hrann";

static RESET_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(resets ([^)]+)\)").expect("reset suffix"));

pub(crate) fn auth_file(ctx: &ProbeContext) -> PathBuf {
    ctx.home.join(".codex").join("auth.json")
}

pub(crate) async fn probe(ctx: &ProbeContext) -> Result<UsageSnapshot, ProbeError> {
    match locate("codex") {
        Some(binary) => {
            let req = ExecRequest {
                binary,
                args: Vec::new(),
                initial_input: Some("/status\r".to_string()),
                timeout: ctx.timeout,
                working_dir: Some(ctx.home.clone()),
                auto_responses: Vec::new(),
            };
            let (text, exit_code) = super::run_cli(req).await?;
            parse_status(&text, exit_code)
        }
        None if auth_file(ctx).exists() => {
            debug!("codex binary missing; probing usage API instead");
            let ctx = ctx.clone();
            tokio::task::spawn_blocking(move || probe_api(&ctx))
                .await
                .map_err(|e| ProbeError::execution(format!("probe task failed: {e}")))?
        }
        None => Err(ProbeError::BinaryNotFound {
            name: "codex".into(),
        }),
    }
}

/// Parse the rendered `/status` screen.
///
/// Codex encodes "not signed in" as a non-zero exit with a plain message,
/// so the exit code participates in classification here, not in the
/// automation layer.
pub(crate) fn parse_status(text: &str, exit_code: i32) -> Result<UsageSnapshot, ProbeError> {
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
        let label = i
            .checked_sub(1)
            .map(|j| lines[j].trim())
            .filter(|l| !l.is_empty())
            .unwrap_or_default();
        if label.is_empty() {
            continue;
        }

        let mut quota = UsageQuota::new(PROVIDER_ID, quota_type_for(label), remaining);
        if let Some(caps) = RESET_SUFFIX.captures(line) {
            let phrase = caps[1].trim().to_string();
            if let Some(at) = parse_reset_phrase(&phrase, now) {
                quota = quota.with_resets_at(at);
            }
            quota = quota.with_reset_text(phrase);
        }
        snapshot.quotas.push(quota);
    }

    if snapshot.quotas.is_empty() {
        if exit_code != 0 {
            return Err(ProbeError::execution(format!(
                "codex exited with status {exit_code}"
            )));
        }
        return Err(ProbeError::parse("no rate limits found in /status output"));
    }
    Ok(snapshot)
}

fn quota_type_for(label: &str) -> QuotaType {
    let lower = label.to_ascii_lowercase();
    if lower.contains("5h") || lower.contains("session") {
        QuotaType::Session
    } else if lower.contains("week") {
        QuotaType::Weekly
    } else {
        QuotaType::TimeLimit(label.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct UsageResponse {
    rate_limits: RateLimits,
    #[serde(default)]
    plan_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RateLimits {
    #[serde(default)]
    primary: Option<RateLimitWindow>,
    #[serde(default)]
    secondary: Option<RateLimitWindow>,
}

#[derive(Debug, Deserialize)]
struct RateLimitWindow {
    used_percent: f64,
    #[serde(default)]
    resets_in_seconds: Option<i64>,
}

fn probe_api(ctx: &ProbeContext) -> Result<UsageSnapshot, ProbeError> {
    let store = FileCredentialStore::new(auth_file(ctx)).with_nested_key("tokens");
    let manager = CredentialManager::new(Box::new(store), ctx.http.clone())
        .with_token_endpoint(TokenEndpoint {
            url: TOKEN_URL.into(),
            client_id: Some(OAUTH_CLIENT_ID.into()),
        });

    let response = manager.authorized_request(&HttpRequest::get(USAGE_URL))?;
    if !response.is_success() {
        return Err(ProbeError::execution(format!(
            "usage API returned status {}",
            response.status
        )));
    }
    parse_api_usage(&response.body)
}

/// Fold the usage API body into a snapshot: primary window is the 5h
/// session limit, secondary the weekly one.
pub(crate) fn parse_api_usage(body: &[u8]) -> Result<UsageSnapshot, ProbeError> {
    let decoded: UsageResponse = serde_json::from_slice(body)
        .map_err(|e| ProbeError::parse(format!("usage response: {e}")))?;

    let now = Utc::now();
    let mut snapshot = UsageSnapshot::new(PROVIDER_ID);
    snapshot.account_tier = decoded.plan_type;
    snapshot.login_method = Some("ChatGPT".to_string());

    let windows = [
        (decoded.rate_limits.primary, QuotaType::Session),
        (decoded.rate_limits.secondary, QuotaType::Weekly),
    ];
    for (window, quota_type) in windows {
        let Some(window) = window else { continue };
        let mut quota =
            UsageQuota::new(PROVIDER_ID, quota_type, 100.0 - window.used_percent);
        if let Some(secs) = window.resets_in_seconds {
            quota = quota.with_resets_at(now + chrono::Duration::seconds(secs));
        }
        snapshot.quotas.push(quota);
    }

    if snapshot.quotas.is_empty() {
        return Err(ProbeError::parse("usage response carried no rate limits"));
    }
    Ok(snapshot)
}
