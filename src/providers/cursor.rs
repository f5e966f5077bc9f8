//! Cursor provider: usage-summary API with a setup token.
//!
//! Cursor has no public OAuth flow for third parties; the probe uses a
//! session token from the `CURSOR_SESSION_TOKEN` environment variable. The
//! API reports money in integer cents, which must land as decimal dollars
//! (2672 is $26.72, not $2672.00).

use serde::Deserialize;

use crate::credentials::{CredentialManager, EnvCredentialStore, HttpRequest};
use crate::error::ProbeError;
use crate::parse::cost_from_cents;
use crate::quota::{CostUsage, QuotaType, UsageQuota, UsageSnapshot};

use super::ProbeContext;

const PROVIDER_ID: &str = "cursor";
const TOKEN_VAR: &str = "CURSOR_SESSION_TOKEN";
const USAGE_URL: &str = "https://cursor.com/api/usage-summary";

pub(crate) fn has_setup_token() -> bool {
    std::env::var(TOKEN_VAR).is_ok_and(|v| !v.is_empty())
}

pub(crate) async fn probe(ctx: &ProbeContext) -> Result<UsageSnapshot, ProbeError> {
    let ctx = ctx.clone();
    tokio::task::spawn_blocking(move || probe_blocking(&ctx))
        .await
        .map_err(|e| ProbeError::execution(format!("probe task failed: {e}")))?
}

fn probe_blocking(ctx: &ProbeContext) -> Result<UsageSnapshot, ProbeError> {
    let store = EnvCredentialStore::new(TOKEN_VAR);
    let manager = CredentialManager::new(Box::new(store), ctx.http.clone());

    let response = manager.authorized_request(&HttpRequest::get(USAGE_URL))?;
    if !response.is_success() {
        return Err(ProbeError::execution(format!(
            "usage-summary returned status {}",
            response.status
        )));
    }
    parse_usage_summary(&response.body)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageSummary {
    #[serde(default)]
    membership_type: Option<String>,
    #[serde(default)]
    premium_requests: Option<RequestCounts>,
    #[serde(default)]
    usage_based_spend_cents: Option<i64>,
    #[serde(default)]
    usage_based_limit_cents: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RequestCounts {
    used: f64,
    limit: f64,
}

/// Fold the usage summary into a snapshot.
pub(crate) fn parse_usage_summary(body: &[u8]) -> Result<UsageSnapshot, ProbeError> {
    let decoded: UsageSummary = serde_json::from_slice(body)
        .map_err(|e| ProbeError::parse(format!("usage summary: {e}")))?;

    let mut snapshot = UsageSnapshot::new(PROVIDER_ID);
    snapshot.account_tier = decoded.membership_type;

    if let Some(counts) = decoded.premium_requests {
        if counts.limit > 0.0 {
            let remaining = (1.0 - counts.used / counts.limit) * 100.0;
            snapshot.quotas.push(UsageQuota::new(
                PROVIDER_ID,
                QuotaType::TimeLimit("Premium requests".into()),
                remaining,
            ));
        }
    }

    if let (Some(spent), Some(budget)) = (
        decoded.usage_based_spend_cents,
        decoded.usage_based_limit_cents,
    ) {
        snapshot.cost_usage = Some(CostUsage {
            spent: cost_from_cents(spent),
            budget: cost_from_cents(budget),
        });
        if budget > 0 {
            let remaining = (1.0 - spent as f64 / budget as f64) * 100.0;
            snapshot.quotas.push(UsageQuota::new(
                PROVIDER_ID,
                QuotaType::TimeLimit("Usage-based spend".into()),
                remaining,
            ));
        }
    }

    if snapshot.quotas.is_empty() {
        return Err(ProbeError::parse("usage summary carried no limits"));
    }
    Ok(snapshot)
}
