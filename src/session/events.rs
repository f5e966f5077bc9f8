//! Hook event decoding and the listener discovery-file contract.
//!
//! An external local listener receives hook payloads from the coding
//! assistant and forwards them as JSON. Payloads are untrusted: anything
//! malformed or unrecognized decodes to "no event" rather than an error.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, trace};

/// Lifecycle event names delivered by the hook mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEventKind {
    SessionStart,
    SessionEnd,
    TaskCompleted,
    SubagentStart,
    SubagentStop,
    Stop,
}

impl HookEventKind {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "SessionStart" => Some(HookEventKind::SessionStart),
            "SessionEnd" => Some(HookEventKind::SessionEnd),
            "TaskCompleted" => Some(HookEventKind::TaskCompleted),
            "SubagentStart" => Some(HookEventKind::SubagentStart),
            "SubagentStop" => Some(HookEventKind::SubagentStop),
            "Stop" => Some(HookEventKind::Stop),
            _ => None,
        }
    }
}

/// One decoded, validated hook event.
#[derive(Debug, Clone)]
pub struct HookEvent {
    pub session_id: String,
    pub kind: HookEventKind,
    pub cwd: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    session_id: String,
    hook_event_name: String,
    #[serde(default)]
    cwd: String,
}

/// Decode a hook payload. Malformed JSON, missing fields, or an
/// unrecognized event name all yield `None`.
pub fn decode_event(payload: &[u8]) -> Option<HookEvent> {
    let raw: RawPayload = match serde_json::from_slice(payload) {
        Ok(raw) => raw,
        Err(e) => {
            trace!("discarding malformed hook payload: {e}");
            return None;
        }
    };
    let kind = match HookEventKind::from_name(&raw.hook_event_name) {
        Some(kind) => kind,
        None => {
            trace!(name = %raw.hook_event_name, "discarding unrecognized hook event");
            return None;
        }
    };
    if raw.session_id.is_empty() {
        return None;
    }
    Some(HookEvent {
        session_id: raw.session_id,
        kind,
        cwd: raw.cwd,
        received_at: Utc::now(),
    })
}

/// Read the port the external listener is bound to from its discovery
/// file (a single integer).
pub fn read_hook_port(path: &Path) -> Option<u16> {
    let contents = std::fs::read_to_string(path).ok()?;
    contents.trim().parse().ok()
}

/// Record the listener's bound port. Written by the listener side of the
/// contract; exposed here so both sides share one format.
pub fn write_hook_port(path: &Path, port: u16) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    debug!(port, path = %path.display(), "recording hook listener port");
    std::fs::write(path, port.to_string())
}
