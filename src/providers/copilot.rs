//! GitHub Copilot provider: JSON over HTTP, no CLI involved.
//!
//! Reads the OAuth token the Copilot apps store under
//! `~/.config/github-copilot/hosts.json` (no refresh token is kept there,
//! so authorization failures surface directly) and queries the Copilot
//! user endpoint for quota snapshots.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{NaiveDate, TimeZone, Utc};
use serde::Deserialize;

use crate::credentials::{CredentialManager, FileCredentialStore, HttpRequest};
use crate::error::ProbeError;
use crate::quota::{QuotaType, UsageQuota, UsageSnapshot};

use super::ProbeContext;

const PROVIDER_ID: &str = "copilot";
const USER_URL: &str = "https://api.github.com/copilot_internal/user";

pub(crate) fn hosts_file(ctx: &ProbeContext) -> PathBuf {
    ctx.home
        .join(".config")
        .join("github-copilot")
        .join("hosts.json")
}

pub(crate) async fn probe(ctx: &ProbeContext) -> Result<UsageSnapshot, ProbeError> {
    let ctx = ctx.clone();
    tokio::task::spawn_blocking(move || probe_blocking(&ctx))
        .await
        .map_err(|e| ProbeError::execution(format!("probe task failed: {e}")))?
}

fn probe_blocking(ctx: &ProbeContext) -> Result<UsageSnapshot, ProbeError> {
    let store = FileCredentialStore::new(hosts_file(ctx)).with_nested_key("github.com");
    let manager = CredentialManager::new(Box::new(store), ctx.http.clone());

    let request = HttpRequest::get(USER_URL)
        .with_header("Accept", "application/json")
        .with_header("User-Agent", "quotabar");
    let response = manager.authorized_request(&request)?;

    match response.status {
        200 => parse_user(&response.body),
        404 => Err(ProbeError::SubscriptionRequired {
            message: "no Copilot subscription on this account".into(),
        }),
        status => Err(ProbeError::execution(format!(
            "Copilot API returned status {status}"
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    /// Keyed by quota name; BTreeMap keeps snapshot order deterministic
    #[serde(default)]
    quota_snapshots: BTreeMap<String, QuotaSnapshotBody>,
    #[serde(default)]
    quota_reset_date: Option<String>,
    #[serde(default)]
    copilot_plan: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuotaSnapshotBody {
    #[serde(default)]
    unlimited: bool,
    #[serde(default)]
    percent_remaining: Option<f64>,
}

/// Fold the user endpoint body into a snapshot. Unlimited quotas carry no
/// signal and are skipped.
pub(crate) fn parse_user(body: &[u8]) -> Result<UsageSnapshot, ProbeError> {
    let decoded: UserResponse = serde_json::from_slice(body)
        .map_err(|e| ProbeError::parse(format!("user response: {e}")))?;

    let resets_at = decoded
        .quota_reset_date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|dt| Utc.from_local_datetime(&dt).single());

    let mut snapshot = UsageSnapshot::new(PROVIDER_ID);
    snapshot.account_tier = decoded.copilot_plan;
    snapshot.login_method = Some("GitHub".to_string());

    for (name, body) in decoded.quota_snapshots {
        if body.unlimited {
            continue;
        }
        let Some(percent) = body.percent_remaining else {
            continue;
        };
        let mut quota = UsageQuota::new(
            PROVIDER_ID,
            QuotaType::TimeLimit(pretty_name(&name)),
            percent,
        );
        if let Some(at) = resets_at {
            quota = quota.with_resets_at(at);
        }
        snapshot.quotas.push(quota);
    }

    if snapshot.quotas.is_empty() {
        return Err(ProbeError::parse(
            "user response carried no limited quota snapshots",
        ));
    }
    Ok(snapshot)
}

fn pretty_name(raw: &str) -> String {
    let mut pretty = raw.replace('_', " ");
    if let Some(first) = pretty.get_mut(..1) {
        first.make_ascii_uppercase();
    }
    pretty
}
