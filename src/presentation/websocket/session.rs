//! WebSocket Session State

use std::time::Instant;

/// Per-connection state tracked by the socket task.
#[derive(Debug)]
pub struct SessionState {
    pub user_id: i64,
    pub session_id: String,
    pub last_heartbeat: Instant,
    pub identified: bool,
}

impl SessionState {
    pub fn new(session_id: String) -> Self {
        Self {
            user_id: 0,
            session_id,
            last_heartbeat: Instant::now(),
            identified: false,
        }
    }

    pub fn heartbeat(&mut self) {
        self.last_heartbeat = Instant::now();
    }

    pub fn is_alive(&self, timeout_ms: u64) -> bool {
        self.last_heartbeat.elapsed().as_millis() < timeout_ms as u128
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_session_is_alive() {
        let session = SessionState::new("s-1".into());
        assert!(session.is_alive(1000));
        assert!(!session.identified);
    }

    #[test]
    fn test_heartbeat_refreshes_liveness() {
        let mut session = SessionState::new("s-1".into());
        session.last_heartbeat = Instant::now() - std::time::Duration::from_millis(50);
        assert!(!session.is_alive(10));

        session.heartbeat();
        assert!(session.is_alive(10));
    }
}
