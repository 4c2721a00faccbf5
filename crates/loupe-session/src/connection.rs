use loupe_core::ids::ConnectionId;
use loupe_core::kinds::DisconnectReason;

/// Liveness and binding state for a session's single active connection
/// (spec.md §3 `SessionConnectionState`). A session with no bound
/// connection (never connected yet, or dropped) has `connection: None`.
#[derive(Clone, Debug)]
pub struct SessionConnectionState {
    pub connection: Option<ConnectionId>,
    pub connected_at: Option<i64>,
    pub last_heartbeat_at: Option<i64>,
    pub disconnected_at: Option<i64>,
    pub disconnect_reason: Option<DisconnectReason>,
}

impl Default for SessionConnectionState {
    fn default() -> Self {
        Self {
            connection: None,
            connected_at: None,
            last_heartbeat_at: None,
            disconnected_at: None,
            disconnect_reason: None,
        }
    }
}

impl SessionConnectionState {
    pub fn bind(&mut self, connection: ConnectionId, now_ms: i64) {
        self.connection = Some(connection);
        self.connected_at = Some(now_ms);
        self.last_heartbeat_at = Some(now_ms);
        self.disconnected_at = None;
        self.disconnect_reason = None;
    }

    pub fn touch_heartbeat(&mut self, now_ms: i64) {
        self.last_heartbeat_at = Some(now_ms);
    }

    pub fn unbind(&mut self, reason: DisconnectReason, now_ms: i64) {
        self.connection = None;
        self.disconnected_at = Some(now_ms);
        self.disconnect_reason = Some(reason);
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_then_unbind_tracks_timestamps_and_reason() {
        let mut state = SessionConnectionState::default();
        let conn = ConnectionId::new();
        state.bind(conn.clone(), 100);
        assert!(state.is_connected());
        assert_eq!(state.connected_at, Some(100));

        state.touch_heartbeat(130);
        assert_eq!(state.last_heartbeat_at, Some(130));

        state.unbind(DisconnectReason::StaleTimeout, 200);
        assert!(!state.is_connected());
        assert_eq!(state.disconnected_at, Some(200));
        assert_eq!(state.disconnect_reason, Some(DisconnectReason::StaleTimeout));
    }
}
