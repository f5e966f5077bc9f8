//! Provider parsers and the probe dispatch surface.
//!
//! Each product gets one module with a pure parser from rendered CLI text
//! (or API JSON) to a [`UsageSnapshot`], plus a `probe` that drives the
//! automation/credential layers. Dispatch is a closed enum selected by
//! provider id; display metadata lives in an explicitly constructed
//! [`ProviderRegistry`] value, not a global.

mod claude;
mod codex;
mod copilot;
mod cursor;
mod gemini;

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::automation::{execute, locate, ExecRequest};
use crate::credentials::{HttpClient, UreqClient};
use crate::error::ProbeError;
use crate::quota::UsageSnapshot;
use crate::term::render;

/// The closed set of supported products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Claude,
    Codex,
    Gemini,
    Copilot,
    Cursor,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Claude => "claude",
            ProviderId::Codex => "codex",
            ProviderId::Gemini => "gemini",
            ProviderId::Copilot => "copilot",
            ProviderId::Cursor => "cursor",
        }
    }

    pub fn all() -> &'static [ProviderId] {
        &[
            ProviderId::Claude,
            ProviderId::Codex,
            ProviderId::Gemini,
            ProviderId::Copilot,
            ProviderId::Cursor,
        ]
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "claude" => Ok(ProviderId::Claude),
            "codex" => Ok(ProviderId::Codex),
            "gemini" => Ok(ProviderId::Gemini),
            "copilot" => Ok(ProviderId::Copilot),
            "cursor" => Ok(ProviderId::Cursor),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display metadata for one provider.
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub id: ProviderId,
    pub display_name: &'static str,
    /// CLI binary name, for providers probed through a terminal
    pub binary: Option<&'static str>,
}

/// Explicitly constructed lookup table with process-scoped lifetime.
/// Built once at startup and handed to every consumer that needs
/// display-name lookups.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    entries: Vec<ProviderInfo>,
}

impl ProviderRegistry {
    /// The built-in provider set.
    pub fn builtin() -> Self {
        Self {
            entries: vec![
                ProviderInfo {
                    id: ProviderId::Claude,
                    display_name: "Claude Code",
                    binary: Some("claude"),
                },
                ProviderInfo {
                    id: ProviderId::Codex,
                    display_name: "Codex CLI",
                    binary: Some("codex"),
                },
                ProviderInfo {
                    id: ProviderId::Gemini,
                    display_name: "Gemini CLI",
                    binary: Some("gemini"),
                },
                ProviderInfo {
                    id: ProviderId::Copilot,
                    display_name: "GitHub Copilot",
                    binary: None,
                },
                ProviderInfo {
                    id: ProviderId::Cursor,
                    display_name: "Cursor",
                    binary: None,
                },
            ],
        }
    }

    pub fn info(&self, id: ProviderId) -> Option<&ProviderInfo> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn display_name(&self, id: ProviderId) -> &'static str {
        self.info(id).map_or("Unknown", |e| e.display_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProviderInfo> {
        self.entries.iter()
    }
}

/// Everything a probe needs from its environment. Cloneable so each
/// provider's probe can run as an independent task.
#[derive(Clone)]
pub struct ProbeContext {
    pub registry: Arc<ProviderRegistry>,
    pub http: Arc<dyn HttpClient>,
    /// Base directory for credential file lookups (the user's home)
    pub home: PathBuf,
    /// Per-probe deadline handed to CLI automation
    pub timeout: Duration,
}

impl ProbeContext {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(ProviderRegistry::builtin()),
            http: Arc::new(UreqClient::new()),
            home: dirs::home_dir().unwrap_or_else(|| PathBuf::from("/")),
            timeout: Duration::from_secs(45),
        }
    }
}

impl Default for ProbeContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Perform one probe now. Callers own scheduling; this function behaves
/// identically regardless of cadence.
pub async fn probe(id: ProviderId, ctx: &ProbeContext) -> Result<UsageSnapshot, ProbeError> {
    debug!(provider = %id, "starting probe");
    match id {
        ProviderId::Claude => claude::probe(ctx).await,
        ProviderId::Codex => codex::probe(ctx).await,
        ProviderId::Gemini => gemini::probe(ctx).await,
        ProviderId::Copilot => copilot::probe(ctx).await,
        ProviderId::Cursor => cursor::probe(ctx).await,
    }
}

/// Whether a probe for this provider could plausibly succeed on this
/// machine (binary installed, or credentials present).
pub fn is_available(id: ProviderId, ctx: &ProbeContext) -> bool {
    match id {
        ProviderId::Claude => locate("claude").is_some(),
        ProviderId::Codex => locate("codex").is_some() || codex::auth_file(ctx).exists(),
        ProviderId::Gemini => locate("gemini").is_some(),
        ProviderId::Copilot => copilot::hosts_file(ctx).exists(),
        ProviderId::Cursor => cursor::has_setup_token(),
    }
}

/// Run a CLI interaction on the blocking pool and render its output.
///
/// The request carries its own timeout, so the subprocess is killed even if
/// the calling future is dropped mid-probe.
pub(crate) async fn run_cli(req: ExecRequest) -> Result<(String, i32), ProbeError> {
    let outcome = tokio::task::spawn_blocking(move || execute(&req))
        .await
        .map_err(|e| ProbeError::execution(format!("probe task failed: {e}")))??;
    Ok((render(&outcome.output), outcome.exit_code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_registry_lookup() {
        let registry = ProviderRegistry::builtin();
        assert_eq!(registry.display_name(ProviderId::Claude), "Claude Code");
        assert_eq!(registry.display_name(ProviderId::Cursor), "Cursor");
        assert_eq!(registry.iter().count(), ProviderId::all().len());
    }

    #[test]
    fn test_provider_id_round_trip() {
        for id in ProviderId::all() {
            assert_eq!(id.as_str().parse::<ProviderId>().unwrap(), *id);
        }
        assert!("netscape".parse::<ProviderId>().is_err());
    }
}
