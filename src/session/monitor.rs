//! Session state machine: one active session, bounded recent history.
//!
//! Transitions:
//!
//! ```text
//! active <-> subagents_working     (subagent count crosses zero)
//! active | subagents_working -> stopped      (Stop event)
//! active | subagents_working | stopped -> ended   (SessionEnd, terminal)
//! ```
//!
//! A start for a new session id while another is active implicitly ends
//! the previous one. Events for unknown ids (other than a start) are
//! ignored, as is everything after `ended`.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::events::{HookEvent, HookEventKind};

/// Default cap on the concluded-sessions ring.
pub const DEFAULT_RECENT_CAP: usize = 10;

/// Lifecycle phase of a tracked session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Active,
    SubagentsWorking,
    Stopped,
    Ended,
}

/// One tracked execution of the external coding-assistant tool.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub cwd: String,
    pub phase: SessionPhase,
    pub active_subagent_count: u32,
    pub completed_task_count: u32,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    fn start(event: &HookEvent) -> Self {
        Self {
            id: event.session_id.clone(),
            cwd: event.cwd.clone(),
            phase: SessionPhase::Active,
            active_subagent_count: 0,
            completed_task_count: 0,
            started_at: event.received_at,
            ended_at: None,
        }
    }

    fn end(&mut self, at: DateTime<Utc>) {
        self.phase = SessionPhase::Ended;
        self.active_subagent_count = 0;
        self.ended_at = Some(at);
    }
}

/// Single logical owner of session state. Wrap in
/// [`SharedSessionMonitor`] when event delivery and UI readers run
/// concurrently; reads take cheap cloned snapshots.
#[derive(Debug)]
pub struct SessionMonitor {
    active: Option<Session>,
    recent: VecDeque<Session>,
    recent_cap: usize,
}

/// Shared handle: all mutations serialize through the write lock.
pub type SharedSessionMonitor = Arc<RwLock<SessionMonitor>>;

impl Default for SessionMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_CAP)
    }
}

impl SessionMonitor {
    pub fn new(recent_cap: usize) -> Self {
        Self {
            active: None,
            recent: VecDeque::new(),
            recent_cap,
        }
    }

    /// Snapshot of the currently active session, if any.
    pub fn active(&self) -> Option<Session> {
        self.active.clone()
    }

    /// Concluded sessions, newest first, capped.
    pub fn recent(&self) -> Vec<Session> {
        self.recent.iter().cloned().collect()
    }

    /// Process one event now. Behaves identically regardless of caller
    /// cadence.
    pub fn handle_event(&mut self, event: &HookEvent) {
        if event.kind == HookEventKind::SessionStart {
            self.handle_start(event);
            return;
        }

        // Every other event only applies to the known active session
        let Some(session) = self
            .active
            .as_mut()
            .filter(|s| s.id == event.session_id)
        else {
            trace!(id = %event.session_id, "ignoring event for unknown session");
            return;
        };

        match event.kind {
            HookEventKind::SessionStart => {}
            HookEventKind::SessionEnd => {
                session.end(event.received_at);
                if let Some(ended) = self.active.take() {
                    debug!(id = %ended.id, tasks = ended.completed_task_count, "session ended");
                    self.push_recent(ended);
                }
            }
            HookEventKind::TaskCompleted => {
                // Work can still be attributed after a stop signal
                session.completed_task_count += 1;
            }
            HookEventKind::SubagentStart => {
                if session.phase == SessionPhase::Stopped {
                    return;
                }
                session.active_subagent_count += 1;
                session.phase = SessionPhase::SubagentsWorking;
            }
            HookEventKind::SubagentStop => {
                if session.phase == SessionPhase::Stopped {
                    return;
                }
                session.active_subagent_count = session.active_subagent_count.saturating_sub(1);
                if session.active_subagent_count == 0 {
                    session.phase = SessionPhase::Active;
                }
            }
            HookEventKind::Stop => {
                session.phase = SessionPhase::Stopped;
                session.active_subagent_count = 0;
            }
        }
    }

    fn handle_start(&mut self, event: &HookEvent) {
        if let Some(previous) = self.active.take() {
            if previous.id == event.session_id {
                // Duplicate start for the live session; keep its state
                self.active = Some(previous);
                return;
            }
            // The previous session never sent its end; close it with the
            // new event's timestamp
            debug!(id = %previous.id, "implicitly ending superseded session");
            let mut previous = previous;
            previous.end(event.received_at);
            self.push_recent(previous);
        }
        debug!(id = %event.session_id, cwd = %event.cwd, "session started");
        self.active = Some(Session::start(event));
    }

    fn push_recent(&mut self, session: Session) {
        self.recent.push_front(session);
        while self.recent.len() > self.recent_cap {
            self.recent.pop_back();
        }
    }

    /// Consume decoded events from the external listener's channel until
    /// it closes. The monitor is the single consumer; no re-entrancy.
    pub async fn run(monitor: SharedSessionMonitor, mut rx: mpsc::Receiver<HookEvent>) {
        while let Some(event) = rx.recv().await {
            monitor.write().handle_event(&event);
        }
        debug!("hook event channel closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn event(id: &str, kind: HookEventKind) -> HookEvent {
        HookEvent {
            session_id: id.to_string(),
            kind,
            cwd: "/work".to_string(),
            received_at: Utc::now(),
        }
    }

    fn monitor_with(events: &[(&str, HookEventKind)]) -> SessionMonitor {
        let mut monitor = SessionMonitor::default();
        for (id, kind) in events {
            monitor.handle_event(&event(id, *kind));
        }
        monitor
    }

    #[test]
    fn test_subagent_lifecycle_then_stop_then_end() {
        let mut monitor = monitor_with(&[
            ("s1", HookEventKind::SessionStart),
            ("s1", HookEventKind::SubagentStart),
            ("s1", HookEventKind::SubagentStart),
            ("s1", HookEventKind::SubagentStop),
        ]);

        let session = monitor.active().unwrap();
        assert_eq!(session.phase, SessionPhase::SubagentsWorking);
        assert_eq!(session.active_subagent_count, 1);

        monitor.handle_event(&event("s1", HookEventKind::Stop));
        let session = monitor.active().unwrap();
        assert_eq!(session.phase, SessionPhase::Stopped);
        assert_eq!(session.active_subagent_count, 0);

        monitor.handle_event(&event("s1", HookEventKind::TaskCompleted));
        monitor.handle_event(&event("s1", HookEventKind::SessionEnd));
        assert!(monitor.active().is_none());

        let recent = monitor.recent();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].phase, SessionPhase::Ended);
        assert_eq!(recent[0].completed_task_count, 1);
        assert!(recent[0].ended_at.is_some());
    }

    #[test]
    fn test_subagent_count_returns_to_active() {
        let monitor = monitor_with(&[
            ("s1", HookEventKind::SessionStart),
            ("s1", HookEventKind::SubagentStart),
            ("s1", HookEventKind::SubagentStop),
        ]);
        let session = monitor.active().unwrap();
        assert_eq!(session.phase, SessionPhase::Active);
        assert_eq!(session.active_subagent_count, 0);
    }

    #[test]
    fn test_task_completion_counts_after_stop_but_subagents_ignored() {
        let monitor = monitor_with(&[
            ("s1", HookEventKind::SessionStart),
            ("s1", HookEventKind::Stop),
            ("s1", HookEventKind::TaskCompleted),
            ("s1", HookEventKind::TaskCompleted),
            ("s1", HookEventKind::SubagentStart),
        ]);
        let session = monitor.active().unwrap();
        assert_eq!(session.phase, SessionPhase::Stopped);
        assert_eq!(session.completed_task_count, 2);
        assert_eq!(session.active_subagent_count, 0);
    }

    #[test]
    fn test_new_start_implicitly_ends_previous() {
        let monitor = monitor_with(&[
            ("s1", HookEventKind::SessionStart),
            ("s1", HookEventKind::TaskCompleted),
            ("s2", HookEventKind::SessionStart),
        ]);

        let active = monitor.active().unwrap();
        assert_eq!(active.id, "s2");

        let recent = monitor.recent();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "s1");
        assert_eq!(recent[0].phase, SessionPhase::Ended);
        assert_eq!(recent[0].completed_task_count, 1);
        assert!(recent[0].ended_at.is_some());
    }

    #[test]
    fn test_duplicate_start_keeps_session_state() {
        let monitor = monitor_with(&[
            ("s1", HookEventKind::SessionStart),
            ("s1", HookEventKind::TaskCompleted),
            ("s1", HookEventKind::SessionStart),
        ]);
        let session = monitor.active().unwrap();
        assert_eq!(session.completed_task_count, 1);
        assert!(monitor.recent().is_empty());
    }

    #[test]
    fn test_events_for_unknown_session_ignored() {
        let monitor = monitor_with(&[
            ("s1", HookEventKind::SessionStart),
            ("ghost", HookEventKind::TaskCompleted),
            ("ghost", HookEventKind::SessionEnd),
        ]);
        let session = monitor.active().unwrap();
        assert_eq!(session.id, "s1");
        assert_eq!(session.completed_task_count, 0);
        assert!(monitor.recent().is_empty());
    }

    #[test]
    fn test_ended_session_is_immutable() {
        let mut monitor = monitor_with(&[
            ("s1", HookEventKind::SessionStart),
            ("s1", HookEventKind::SessionEnd),
            // All silently ignored: s1 is no longer active
            ("s1", HookEventKind::TaskCompleted),
            ("s1", HookEventKind::Stop),
        ]);
        assert_eq!(monitor.recent()[0].completed_task_count, 0);
        assert_eq!(monitor.recent()[0].phase, SessionPhase::Ended);

        // A fresh start reuses the id but not the old entity
        monitor.handle_event(&event("s1", HookEventKind::SessionStart));
        assert_eq!(monitor.active().unwrap().completed_task_count, 0);
        assert_eq!(monitor.recent().len(), 1);
    }

    #[test]
    fn test_recent_ring_capped_newest_first() {
        let mut monitor = SessionMonitor::new(3);
        for i in 0..6 {
            let id = format!("s{i}");
            monitor.handle_event(&event(&id, HookEventKind::SessionStart));
            monitor.handle_event(&event(&id, HookEventKind::SessionEnd));
        }
        let recent = monitor.recent();
        assert_eq!(recent.len(), 3);
        let ids: Vec<&str> = recent.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s5", "s4", "s3"]);
    }

    #[tokio::test]
    async fn test_run_consumes_channel() {
        let monitor: SharedSessionMonitor = Arc::new(RwLock::new(SessionMonitor::default()));
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(SessionMonitor::run(monitor.clone(), rx));

        tx.send(event("s1", HookEventKind::SessionStart)).await.unwrap();
        tx.send(event("s1", HookEventKind::TaskCompleted)).await.unwrap();
        drop(tx);
        task.await.unwrap();

        let guard = monitor.read();
        assert_eq!(guard.active().unwrap().completed_task_count, 1);
    }
}
