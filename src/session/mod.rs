//! Session tracking: hook events in, validated session state out.

mod events;
mod monitor;

pub use events::{decode_event, read_hook_port, write_hook_port, HookEvent, HookEventKind};
pub use monitor::{Session, SessionMonitor, SessionPhase, SharedSessionMonitor};
