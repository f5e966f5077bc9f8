//! Stored credentials and the stores that load and persist them.
//!
//! Providers keep OAuth token sets in JSON files under their own config
//! directories, with varying field names and nesting. One serde shape with
//! aliases covers all of them; missing optional fields are tolerated.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProbeError;

/// Refresh slightly before the recorded expiry so a token never dies
/// mid-request.
const EXPIRY_SKEW_MS: i64 = 60_000;

/// One provider's stored token set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredential {
    #[serde(alias = "accessToken", alias = "oauth_token")]
    pub access_token: String,

    #[serde(default, alias = "refreshToken", skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Expiry as epoch milliseconds, when the provider records one
    #[serde(default, alias = "expiresAt", skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,

    /// Plan hint stored alongside the tokens (e.g., "max")
    #[serde(default, alias = "subscriptionType", skip_serializing_if = "Option::is_none")]
    pub subscription_type: Option<String>,
}

impl StoredCredential {
    /// A credential sourced from a setup-token environment variable: no
    /// refresh token by construction, no recorded expiry.
    pub fn setup_token(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            subscription_type: None,
        }
    }

    /// True when an expiry is recorded and has (nearly) passed. Unknown
    /// expiry is treated as not expired; the 401 path covers it.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub(crate) fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|at| now.timestamp_millis() >= at - EXPIRY_SKEW_MS)
    }

    /// Whether the refresh flow is available for this credential.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}

/// Load/persist seam for credentials. The refresh flow persists rotated
/// tokens back through the same store before returning.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<StoredCredential, ProbeError>;
    fn save(&self, credential: &StoredCredential) -> Result<(), ProbeError>;
}

/// Accepted on-disk spellings for each credential field, preferred one
/// first. Saves keep whatever spelling the file already uses.
const ACCESS_TOKEN_KEYS: &[&str] = &["access_token", "accessToken", "oauth_token"];
const REFRESH_TOKEN_KEYS: &[&str] = &["refresh_token", "refreshToken"];
const EXPIRES_AT_KEYS: &[&str] = &["expires_at", "expiresAt"];
const SUBSCRIPTION_KEYS: &[&str] = &["subscription_type", "subscriptionType"];

/// Write one credential field into a JSON object, reusing the spelling
/// already present in the file. A `None` value leaves existing content
/// alone.
fn merge_field(
    obj: &mut serde_json::Map<String, serde_json::Value>,
    spellings: &[&str],
    value: Option<serde_json::Value>,
) {
    let Some(value) = value else { return };
    let key = spellings
        .iter()
        .find(|s| obj.contains_key(**s))
        .copied()
        .unwrap_or(spellings[0]);
    obj.insert(key.to_string(), value);
}

/// JSON-file-backed store. `nested_key` descends into a wrapper object
/// (e.g., Claude's `{"claudeAiOauth": {...}}`); sibling content in the file
/// is preserved on save, both next to the wrapper and inside it.
pub struct FileCredentialStore {
    path: PathBuf,
    nested_key: Option<String>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            nested_key: None,
        }
    }

    pub fn with_nested_key(mut self, key: impl Into<String>) -> Self {
        self.nested_key = Some(key.into());
        self
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<StoredCredential, ProbeError> {
        let raw = std::fs::read(&self.path).map_err(|_| ProbeError::AuthenticationRequired)?;
        let mut value: serde_json::Value = serde_json::from_slice(&raw)
            .map_err(|e| ProbeError::parse(format!("credential file is not JSON: {e}")))?;
        if let Some(key) = &self.nested_key {
            value = value
                .get_mut(key)
                .map(serde_json::Value::take)
                .ok_or(ProbeError::AuthenticationRequired)?;
        }
        serde_json::from_value(value).map_err(|_| ProbeError::AuthenticationRequired)
    }

    fn save(&self, credential: &StoredCredential) -> Result<(), ProbeError> {
        let mut root: serde_json::Value = std::fs::read(&self.path)
            .ok()
            .and_then(|raw| serde_json::from_slice(&raw).ok())
            .unwrap_or_else(|| serde_json::json!({}));
        if !root.is_object() {
            root = serde_json::json!({});
        }

        // Merge into the existing object rather than replacing it: the
        // provider's own CLI keeps fields of its own next to the tokens
        // (id_token, account_id) that must survive a rotation.
        let target = match &self.nested_key {
            Some(key) => {
                let obj = root
                    .as_object_mut()
                    .ok_or_else(|| ProbeError::execution("credential file is not an object"))?;
                obj.entry(key.clone()).or_insert_with(|| serde_json::json!({}))
            }
            None => &mut root,
        };
        if !target.is_object() {
            *target = serde_json::json!({});
        }
        if let Some(obj) = target.as_object_mut() {
            merge_field(obj, ACCESS_TOKEN_KEYS, Some(credential.access_token.clone().into()));
            merge_field(
                obj,
                REFRESH_TOKEN_KEYS,
                credential.refresh_token.clone().map(Into::into),
            );
            merge_field(obj, EXPIRES_AT_KEYS, credential.expires_at.map(Into::into));
            merge_field(
                obj,
                SUBSCRIPTION_KEYS,
                credential.subscription_type.clone().map(Into::into),
            );
        }

        let pretty = serde_json::to_string_pretty(&root)
            .map_err(|e| ProbeError::execution(format!("serialize credential: {e}")))?;
        std::fs::write(&self.path, pretty)
            .map_err(|e| ProbeError::execution(format!("write credential file: {e}")))?;
        debug!(path = %self.path.display(), "persisted rotated credential");
        Ok(())
    }
}

/// Store backed by a fixed environment variable ("setup token"). Nothing to
/// persist; the refresh flow is structurally unavailable.
pub struct EnvCredentialStore {
    var: String,
}

impl EnvCredentialStore {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl CredentialStore for EnvCredentialStore {
    fn load(&self) -> Result<StoredCredential, ProbeError> {
        match std::env::var(&self.var) {
            Ok(token) if !token.is_empty() => Ok(StoredCredential::setup_token(token)),
            _ => Err(ProbeError::AuthenticationRequired),
        }
    }

    fn save(&self, _credential: &StoredCredential) -> Result<(), ProbeError> {
        Ok(())
    }
}
