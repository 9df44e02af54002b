/// Lifecycle of a session as seen by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Ready for a message
    Idle,
    /// A message was sent and `session.idle` has not arrived yet
    Busy,
    /// Destroyed locally or lost with the connection
    Destroyed,
}

impl SessionState {
    /// Check if a transition to the target state is valid
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        match (self, target) {
            (Idle, Busy) => true,
            (Busy, Idle) => true,
            // Another message while busy is queued by the agent
            (Busy, Busy) => true,
            (Idle, Idle) => true,

            (Destroyed, _) => false,
            (_, Destroyed) => true,
        }
    }

    pub fn display(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Busy => "working...",
            SessionState::Destroyed => "destroyed",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Busy)
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(self, SessionState::Destroyed)
    }
}
