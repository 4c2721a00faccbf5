use std::collections::{HashMap, HashSet};

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::instrument;

use loupe_core::ids::{CommandId, ConnectionId, SessionId};
use loupe_core::kinds::DisconnectReason;

use crate::connection::SessionConnectionState;
use crate::console::{LiveConsoleBuffer, LiveConsoleEntry, LiveConsoleFilter, DEFAULT_CAPACITY};
use crate::pending::PendingCaptureRequest;

struct SessionEntry {
    state: SessionConnectionState,
    console: LiveConsoleBuffer,
    pending: HashMap<CommandId, PendingCaptureRequest>,
    tab_scope: HashSet<i64>,
}

impl Default for SessionEntry {
    fn default() -> Self {
        Self {
            state: SessionConnectionState::default(),
            console: LiveConsoleBuffer::new(DEFAULT_CAPACITY),
            pending: HashMap::new(),
            tab_scope: HashSet::new(),
        }
    }
}

/// In-process map of per-session live state (spec.md §3, §4.6): connection
/// binding, liveness timestamps, the live-console ring, pending capture
/// commands, and the tab-scope set. Guarded by `DashMap`'s internal sharded
/// locking so bind/unbind/buffer-append/pending-command operations stay
/// short and non-blocking (spec.md §5).
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionEntry>,
    /// commandId → sessionId, so `resolve_pending`/`capture_result` handling
    /// doesn't need to know which session a command belongs to up front.
    command_index: DashMap<CommandId, SessionId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a connection to a session, replacing any prior binding on this
    /// session (spec.md §4.5 `session_start`).
    #[instrument(skip(self))]
    pub fn bind_connection(&self, session_id: &SessionId, connection: ConnectionId, now_ms: i64) {
        self.sessions
            .entry(session_id.clone())
            .or_default()
            .state
            .bind(connection, now_ms);
    }

    /// Clears the binding if it matches `connection` and rejects every
    /// pending capture for the session (spec.md §4.5 disconnect handling).
    #[instrument(skip(self))]
    pub fn unbind_connection(
        &self,
        session_id: &SessionId,
        reason: DisconnectReason,
        now_ms: i64,
    ) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.state.unbind(reason, now_ms);
            for (command_id, pending) in entry.pending.drain() {
                self.command_index.remove(&command_id);
                drop(pending); // dropping the resolver rejects the waiter
            }
        }
    }

    pub fn touch_heartbeat(&self, session_id: &SessionId, now_ms: i64) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.state.touch_heartbeat(now_ms);
        }
    }

    pub fn connection_state(&self, session_id: &SessionId) -> Option<SessionConnectionState> {
        self.sessions.get(session_id).map(|e| e.state.clone())
    }

    pub fn is_connected(&self, session_id: &SessionId) -> bool {
        self.sessions.get(session_id).map(|e| e.state.is_connected()).unwrap_or(false)
    }

    pub fn bound_connection(&self, session_id: &SessionId) -> Option<ConnectionId> {
        self.sessions.get(session_id).and_then(|e| e.state.connection.clone())
    }

    /// Adds a tab id to the session's scope (spec.md §3 tab-scope set).
    pub fn add_tab(&self, session_id: &SessionId, tab_id: i64) {
        self.sessions.entry(session_id.clone()).or_default().tab_scope.insert(tab_id);
    }

    /// An empty scope means no tab has been registered yet, so every tab is
    /// treated as in-scope; otherwise membership is required.
    pub fn is_tab_in_scope(&self, session_id: &SessionId, tab_id: i64) -> bool {
        match self.sessions.get(session_id) {
            Some(entry) => entry.tab_scope.is_empty() || entry.tab_scope.contains(&tab_id),
            None => true,
        }
    }

    /// Mirrors a console or runtime-error event into the session's ring
    /// (spec.md §4.5 `event`/`event_batch`).
    pub fn push_console_entry(&self, session_id: &SessionId, entry: LiveConsoleEntry) {
        self.sessions.entry(session_id.clone()).or_default().console.push(entry);
    }

    pub fn query_console(
        &self,
        session_id: &SessionId,
        filter: &LiveConsoleFilter,
    ) -> Vec<LiveConsoleEntry> {
        self.sessions.get(session_id).map(|e| e.console.query(filter)).unwrap_or_default()
    }

    pub fn console_dropped(&self, session_id: &SessionId) -> u64 {
        self.sessions.get(session_id).map(|e| e.console.dropped()).unwrap_or(0)
    }

    /// Mints a fresh `commandId`, registers it against `session_id`, and
    /// returns the receiver half a V2 tool call awaits on (spec.md §4.5
    /// `SendCapture` steps 2-3).
    #[instrument(skip(self))]
    pub fn register_pending(&self, session_id: &SessionId) -> (CommandId, oneshot::Receiver<serde_json::Value>) {
        let command_id = CommandId::new();
        let (tx, rx) = oneshot::channel();
        self.sessions
            .entry(session_id.clone())
            .or_default()
            .pending
            .insert(command_id.clone(), PendingCaptureRequest::new(command_id.clone(), tx));
        self.command_index.insert(command_id.clone(), session_id.clone());
        (command_id, rx)
    }

    /// Resolves a pending capture by id with the `capture_result` payload.
    /// Returns `false` if the id is unknown (already resolved, rejected, or
    /// never registered) — the caller silently drops it (spec.md §4.5).
    #[instrument(skip(self, payload))]
    pub fn resolve_pending(&self, command_id: &CommandId, payload: serde_json::Value) -> bool {
        let Some((_, session_id)) = self.command_index.remove(command_id) else {
            return false;
        };
        let Some(mut entry) = self.sessions.get_mut(&session_id) else {
            return false;
        };
        match entry.pending.remove(command_id) {
            Some(pending) => {
                pending.resolve(payload);
                true
            }
            None => false,
        }
    }

    /// Drops (without resolving) a pending capture that hit its deadline
    /// timer, so the slot doesn't leak (spec.md §5 "a client-triggered tool
    /// call that fails partway must leave no pending-command entry behind").
    pub fn expire_pending(&self, command_id: &CommandId) {
        if let Some((_, session_id)) = self.command_index.remove(command_id) {
            if let Some(mut entry) = self.sessions.get_mut(&session_id) {
                entry.pending.remove(command_id);
            }
        }
    }

    pub fn remove_session(&self, session_id: &SessionId) {
        if let Some((_, entry)) = self.sessions.remove(session_id) {
            for command_id in entry.pending.keys() {
                self.command_index.remove(command_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn console_entry(ts: i64) -> LiveConsoleEntry {
        LiveConsoleEntry {
            timestamp: ts,
            level: "log".into(),
            message: "hi".into(),
            args: vec![],
            tab_id: Some(1),
            origin: None,
            is_runtime_error: false,
        }
    }

    #[test]
    fn bind_rebind_and_unbind() {
        let registry = SessionRegistry::new();
        let sid = SessionId::new();
        let conn1 = ConnectionId::new();
        let conn2 = ConnectionId::new();

        registry.bind_connection(&sid, conn1, 100);
        assert!(registry.is_connected(&sid));

        registry.bind_connection(&sid, conn2.clone(), 200);
        assert_eq!(registry.bound_connection(&sid), Some(conn2));

        registry.unbind_connection(&sid, DisconnectReason::NormalClosure, 300);
        assert!(!registry.is_connected(&sid));
    }

    #[test]
    fn unbind_rejects_pending_captures() {
        let registry = SessionRegistry::new();
        let sid = SessionId::new();
        registry.bind_connection(&sid, ConnectionId::new(), 0);

        let (command_id, rx) = registry.register_pending(&sid);
        registry.unbind_connection(&sid, DisconnectReason::NetworkError, 10);

        assert!(rx.try_recv().is_err());
        assert!(!registry.resolve_pending(&command_id, serde_json::json!({})));
    }

    #[test]
    fn resolve_pending_delivers_payload() {
        let registry = SessionRegistry::new();
        let sid = SessionId::new();
        let (command_id, rx) = registry.register_pending(&sid);

        assert!(registry.resolve_pending(&command_id, serde_json::json!({"ok": true})));
        let payload = rx.blocking_recv().unwrap();
        assert_eq!(payload["ok"], true);
    }

    #[test]
    fn resolve_unknown_command_returns_false() {
        let registry = SessionRegistry::new();
        assert!(!registry.resolve_pending(&CommandId::new(), serde_json::json!(null)));
    }

    #[test]
    fn console_push_and_query_roundtrip() {
        let registry = SessionRegistry::new();
        let sid = SessionId::new();
        registry.push_console_entry(&sid, console_entry(1));
        registry.push_console_entry(&sid, console_entry(2));

        let results = registry.query_console(&sid, &LiveConsoleFilter::default());
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn tab_scope_empty_allows_any_then_restricts_once_populated() {
        let registry = SessionRegistry::new();
        let sid = SessionId::new();
        assert!(registry.is_tab_in_scope(&sid, 42));

        registry.add_tab(&sid, 1);
        assert!(registry.is_tab_in_scope(&sid, 1));
        assert!(!registry.is_tab_in_scope(&sid, 2));
    }
}
