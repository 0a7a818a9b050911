//! Launcher 전용 에러 타입. `start()`의 각 실패 경로를 호출자가
//! 프로그램적으로 구분할 수 있게 합니다.

use crate::supervisor::state::State;
use std::time::Duration;

/// Errors surfaced by supervisor operations. `stop()` never returns these;
/// it reports failure through its numeric status instead.
#[derive(thiserror::Error, Debug)]
pub enum LauncherError {
    /// start() was called while a cycle is active. The caller's start is
    /// rejected, never queued.
    #[error("server is already active (state: {0:?})")]
    AlreadyRunning(State),

    /// The OS could not create the process (missing interpreter, bad path,
    /// permissions). Not retried.
    #[error("failed to spawn server process: {0}")]
    Spawn(#[source] std::io::Error),

    /// The child came up but never announced its endpoint in time.
    #[error("server did not announce an endpoint within {0:?}")]
    StartTimeout(Duration),

    /// The child exited before announcing its endpoint.
    #[error("server exited before becoming ready (code: {code:?}, signal: {signal:?})")]
    PrematureExit {
        code: Option<i32>,
        signal: Option<i32>,
    },

    /// Internal cleanup failure. Logged and folded into stop()'s status
    /// code; only restart() can surface it indirectly.
    #[error("stop failed: {0}")]
    Stop(String),
}

impl LauncherError {
    /// 머신 리더블 에러 코드
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AlreadyRunning(_) => "ALREADY_RUNNING",
            Self::Spawn(_) => "SPAWN_FAILED",
            Self::StartTimeout(_) => "START_TIMEOUT",
            Self::PrematureExit { .. } => "PREMATURE_EXIT",
            Self::Stop(_) => "STOP_FAILED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            LauncherError::AlreadyRunning(State::Running).error_code(),
            "ALREADY_RUNNING"
        );
        assert_eq!(
            LauncherError::StartTimeout(Duration::from_secs(30)).error_code(),
            "START_TIMEOUT"
        );
    }

    #[test]
    fn test_messages_name_the_cause() {
        let e = LauncherError::StartTimeout(Duration::from_millis(30_000));
        assert!(e.to_string().contains("30"));

        let e = LauncherError::PrematureExit {
            code: Some(7),
            signal: None,
        };
        assert!(e.to_string().contains('7'));

        let e = LauncherError::AlreadyRunning(State::Starting);
        assert!(e.to_string().contains("Starting"));
    }
}
