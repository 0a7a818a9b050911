//! Server child process: spawn with stdio capture, endpoint scanning, exit
//! tracking.
//!
//! The child is the Python Camoufox server. It receives its options as one
//! compact JSON argv entry (`--config <json>`), inherits the parent
//! environment unmodified, and announces a WebSocket endpoint on stdout.
//! stderr is diagnostic only and never affects the lifecycle.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tokio::sync::{broadcast, oneshot, watch};

use crate::supervisor::error::LauncherError;
use crate::supervisor::ready::{OutputScanner, ReadyDetector};
use crate::supervisor::LauncherEvent;

/// How the child ended. On Windows `signal` is always `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitInfo {
    fn from_status(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

/// A spawned server process and the channels its reader tasks feed.
pub struct ServerProcess {
    pub pid: u32,
    /// Resolves with the first endpoint the detector finds on stdout.
    pub endpoint_rx: oneshot::Receiver<String>,
    /// Holds `Some` once the process has exited.
    pub exited_rx: watch::Receiver<Option<ExitInfo>>,
}

impl ServerProcess {
    /// Spawn the server process and its reader/waiter tasks.
    ///
    /// # Arguments
    /// * `program` - Python interpreter to run
    /// * `script` - Path to the server script
    /// * `config_json` - Serialized options, passed as one argv entry
    /// * `working_dir` - Fixed working directory (the install location)
    /// * `detector` - Readiness detection strategy for stdout
    /// * `events` - Event channel the waiter announces exits on
    pub fn spawn(
        program: &Path,
        script: &Path,
        config_json: &str,
        working_dir: &Path,
        detector: Arc<dyn ReadyDetector>,
        events: broadcast::Sender<LauncherEvent>,
    ) -> Result<Self, LauncherError> {
        let mut cmd = TokioCommand::new(program);
        cmd.arg(script)
            .arg("--config")
            .arg(config_json)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Windows: hide console window
        #[cfg(target_os = "windows")]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        // 환경 변수는 부모 것을 그대로 상속한다. 자식 스크립트가 자체적으로
        // 인코딩/경로를 처리하므로 여기서 덮어쓰지 않는다
        let mut child = cmd.spawn().map_err(LauncherError::Spawn)?;

        let pid = child.id().ok_or_else(|| {
            LauncherError::Spawn(std::io::Error::new(
                std::io::ErrorKind::Other,
                "spawned process has no PID",
            ))
        })?;

        let (endpoint_tx, endpoint_rx) = oneshot::channel::<String>();
        let (exited_tx, exited_rx) = watch::channel::<Option<ExitInfo>>(None);

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // ── stdout reader ────────────────────────────────────
        // Raw chunk reads, not lines: the announcement may arrive without a
        // trailing newline or split across arbitrary write boundaries.
        if let Some(mut stdout) = stdout {
            let detector = detector.clone();
            tokio::spawn(async move {
                let mut scanner = OutputScanner::new();
                let mut endpoint_tx = Some(endpoint_tx);
                let mut buf = [0u8; 4096];
                loop {
                    match stdout.read(&mut buf).await {
                        Ok(0) => {
                            if let Some(found) = scanner.finish(detector.as_ref()) {
                                if let Some(tx) = endpoint_tx.take() {
                                    let _ = tx.send(found);
                                }
                            }
                            break;
                        }
                        Ok(n) => {
                            let chunk = &buf[..n];
                            tracing::trace!(
                                "server stdout: {}",
                                String::from_utf8_lossy(chunk).trim_end()
                            );
                            if let Some(found) = scanner.push(chunk, detector.as_ref()) {
                                if let Some(tx) = endpoint_tx.take() {
                                    let _ = tx.send(found);
                                }
                            }
                        }
                        Err(e) => {
                            tracing::debug!("server stdout read error: {}", e);
                            break;
                        }
                    }
                }
            });
        }

        // ── stderr reader ────────────────────────────────────
        if let Some(stderr) = stderr {
            tokio::spawn(async move {
                let reader = BufReader::new(stderr);
                let mut lines = reader.lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!("server stderr: {}", line);
                }
            });
        }

        // ── process waiter ───────────────────────────────────
        {
            tokio::spawn(async move {
                let info = match child.wait().await {
                    Ok(status) => ExitInfo::from_status(status),
                    Err(e) => {
                        tracing::warn!("Failed to wait for server process {}: {}", pid, e);
                        ExitInfo {
                            code: None,
                            signal: None,
                        }
                    }
                };
                tracing::info!(
                    "Server process {} exited (code: {:?}, signal: {:?})",
                    pid,
                    info.code,
                    info.signal
                );
                let _ = exited_tx.send(Some(info));
                let _ = events.send(LauncherEvent::Exit {
                    code: info.code,
                    signal: info.signal,
                });
            });
        }

        tracing::info!("Server process started with PID {}", pid);

        Ok(Self {
            pid,
            endpoint_rx,
            exited_rx,
        })
    }
}

/// Wait until the watch channel reports an exit. Returns `None` only if the
/// waiter task died without publishing, which has no normal cause.
pub async fn wait_for_exit(rx: &mut watch::Receiver<Option<ExitInfo>>) -> Option<ExitInfo> {
    loop {
        if let Some(info) = *rx.borrow() {
            return Some(info);
        }
        if rx.changed().await.is_err() {
            return *rx.borrow();
        }
    }
}
