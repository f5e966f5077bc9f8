//! Core library for quotabar: find out how much usage quota is left on
//! the AI coding assistants installed on this machine.
//!
//! The pipeline runs in layers:
//!
//! - [`automation`] drives provider CLIs inside a pseudo-terminal and
//!   harvests their raw output.
//! - [`term`] renders that raw byte stream through a terminal emulator
//!   into clean text.
//! - [`parse`] holds the shared text-extraction helpers providers build
//!   their parsers from.
//! - [`credentials`] manages stored OAuth tokens, expiry, and the
//!   refresh-and-retry dance for providers probed over HTTP.
//! - [`providers`] contains one parser per product and the probe
//!   dispatch surface.
//! - [`quota`] is the provider-independent domain model the parsers
//!   produce.
//! - [`session`] tracks live assistant sessions from hook events.
//!
//! Probes are one-shot: callers own scheduling and caching, and every
//! failure comes back as a classified [`error::ProbeError`] so a frontend
//! can tell "run `claude login`" apart from "the CLI changed its output".

pub mod automation;
pub mod credentials;
pub mod error;
pub mod parse;
pub mod providers;
pub mod quota;
pub mod session;
pub mod term;

pub use error::ProbeError;
pub use providers::{probe, ProbeContext, ProviderId, ProviderRegistry};
pub use quota::{Pace, QuotaStatus, QuotaType, UsageQuota, UsageSnapshot};
pub use session::{SessionMonitor, SessionPhase, SharedSessionMonitor};
