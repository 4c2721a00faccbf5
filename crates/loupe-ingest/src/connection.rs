use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;

use loupe_core::ids::{ConnectionId, SessionId};
use loupe_core::wire::OutboundFrame;

/// Liveness window from spec.md §4.5/§5: a probe every 30s, force-close if
/// nothing (including pongs) is heard within 30+10s.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;
pub const HEARTBEAT_GRACE_SECS: u64 = 10;

/// Per-connection state the teacher tracks on its `Client` (spec.md §4.5
/// "Per-connection state"). `bound_session` replaces any prior binding on
/// `session_start`.
pub struct ConnectionState {
    pub connected_at: i64,
    pub bound_session: Option<SessionId>,
    pub message_count: u64,
    last_activity_ms: AtomicI64,
}

impl ConnectionState {
    pub fn new(now_ms: i64) -> Self {
        Self {
            connected_at: now_ms,
            bound_session: None,
            message_count: 0,
            last_activity_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn touch(&self, now_ms: i64) {
        self.last_activity_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> i64 {
        self.last_activity_ms.load(Ordering::Relaxed)
    }

    pub fn is_stale(&self, now_ms: i64) -> bool {
        let grace_ms = (HEARTBEAT_INTERVAL_SECS + HEARTBEAT_GRACE_SECS) as i64 * 1000;
        now_ms - self.last_activity() > grace_ms
    }
}

/// A live connection's outbound half plus its tracked state. Held by value
/// in the registry — when a socket drops, `unregister` removes and drops
/// the sender, which in turn causes any outstanding `send` to fail silently.
pub struct ConnectionHandle {
    pub tx: mpsc::UnboundedSender<OutboundFrame>,
    pub state: ConnectionState,
}

impl ConnectionHandle {
    pub fn send(&self, frame: OutboundFrame) -> bool {
        self.tx.send(frame).is_ok()
    }
}

/// Registry of every currently-open socket, keyed by connection id
/// (spec.md §4.5 "Ingest Pipeline holds each connection by value").
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionHandle>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, now_ms: i64) -> (ConnectionId, mpsc::UnboundedReceiver<OutboundFrame>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(id.clone(), ConnectionHandle { tx, state: ConnectionState::new(now_ms) });
        (id, rx)
    }

    pub fn unregister(&self, id: &ConnectionId) {
        self.connections.remove(id);
    }

    pub fn send_to(&self, id: &ConnectionId, frame: OutboundFrame) -> bool {
        self.connections.get(id).map(|h| h.send(frame)).unwrap_or(false)
    }

    pub fn touch(&self, id: &ConnectionId, now_ms: i64) {
        if let Some(handle) = self.connections.get(id) {
            handle.state.touch(now_ms);
        }
    }

    pub fn bind_session(&self, id: &ConnectionId, session_id: SessionId) {
        if let Some(mut handle) = self.connections.get_mut(id) {
            handle.state.bound_session = Some(session_id);
        }
    }

    pub fn bound_session(&self, id: &ConnectionId) -> Option<SessionId> {
        self.connections.get(id).and_then(|h| h.state.bound_session.clone())
    }

    /// Ids of connections that have gone silent past the heartbeat grace
    /// window, for the liveness-probe task to force-close.
    pub fn stale_connections(&self, now_ms: i64) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|e| e.value().state.is_stale(now_ms))
            .map(|e| e.key().clone())
            .collect()
    }

    /// Every currently-open connection id, for the heartbeat task's probe
    /// sweep (spec.md §4.5).
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_bind_and_lookup() {
        let registry = ConnectionRegistry::new();
        let (id, _rx) = registry.register(1000);
        let sid = SessionId::new();
        registry.bind_session(&id, sid.clone());
        assert_eq!(registry.bound_session(&id), Some(sid));
    }

    #[test]
    fn stale_after_grace_window() {
        let registry = ConnectionRegistry::new();
        let (id, _rx) = registry.register(0);
        assert!(registry.stale_connections(1000).is_empty());
        let past_grace = ((HEARTBEAT_INTERVAL_SECS + HEARTBEAT_GRACE_SECS) * 1000 + 1) as i64;
        assert_eq!(registry.stale_connections(past_grace), vec![id]);
    }

    #[test]
    fn unregister_drops_sender_so_send_fails() {
        let registry = ConnectionRegistry::new();
        let (id, _rx) = registry.register(0);
        registry.unregister(&id);
        assert!(!registry.send_to(&id, OutboundFrame::Pong));
    }
}
