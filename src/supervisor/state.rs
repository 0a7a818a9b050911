use thiserror::Error;

/// Supervisor lifecycle states. Idle is both the initial state and the state
/// every cycle returns to; there is no terminal "destroyed" state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Starting,
    Running,
    Stopping,
}

#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("invalid transition: {0:?} -> {1:?}")]
    InvalidTransition(State, State),
}

pub struct StateMachine {
    pub state: State,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self { state: State::Idle }
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_transition(&self, to: &State) -> bool {
        matches!(
            (&self.state, to),
            (State::Idle, State::Starting)
                | (State::Starting, State::Running)
                | (State::Starting, State::Idle)
                | (State::Starting, State::Stopping)
                | (State::Running, State::Stopping)
                | (State::Running, State::Idle)
                | (State::Stopping, State::Idle)
        )
    }

    pub fn transition(&mut self, to: State) -> Result<(), TransitionError> {
        if self.can_transition(&to) {
            tracing::debug!("State transition: {:?} -> {:?}", self.state, to);
            self.state = to;
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition(self.state, to))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_lifecycle() {
        let mut sm = StateMachine::new();
        assert_eq!(sm.state, State::Idle);
        assert!(sm.transition(State::Starting).is_ok());
        assert!(sm.transition(State::Running).is_ok());
        assert!(sm.transition(State::Stopping).is_ok());
        assert!(sm.transition(State::Idle).is_ok());
    }

    #[test]
    fn failed_start_returns_to_idle() {
        let mut sm = StateMachine::new();
        sm.transition(State::Starting).unwrap();
        // 타임아웃/조기 종료 경로
        assert!(sm.transition(State::Idle).is_ok());
        // 같은 머신으로 바로 재시작 가능
        assert!(sm.transition(State::Starting).is_ok());
    }

    #[test]
    fn stop_during_startup() {
        let mut sm = StateMachine::new();
        sm.transition(State::Starting).unwrap();
        assert!(sm.transition(State::Stopping).is_ok());
        assert!(sm.transition(State::Idle).is_ok());
    }

    #[test]
    fn unexpected_exit_while_running() {
        let mut sm = StateMachine::new();
        sm.transition(State::Starting).unwrap();
        sm.transition(State::Running).unwrap();
        assert!(sm.transition(State::Idle).is_ok());
    }

    #[test]
    fn invalid_transition() {
        let mut sm = StateMachine::new();
        // cannot go directly from Idle -> Running
        assert!(sm.transition(State::Running).is_err());
        // Idle -> Stopping is also not a transition; stop() on an idle
        // supervisor is a no-op that never enters Stopping
        assert!(sm.transition(State::Stopping).is_err());
    }
}
