//! Process supervisor for the Camoufox server.
//!
//! One `Supervisor` owns one server lifecycle: Idle → Starting → Running →
//! Stopping → Idle. `start()` resolves with the WebSocket endpoint scraped
//! from the child's stdout, `stop()` closes the registered remote resource
//! while the process is still alive and then force-kills it, and every
//! failure path returns the supervisor to Idle so it can be started again.

pub mod child;
pub mod error;
pub mod ready;
pub mod state;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};

use crate::config::{self, LaunchOptions};
use child::{wait_for_exit, ExitInfo, ServerProcess};
use error::LauncherError;
use ready::{ReadyDetector, WsEndpointDetector};
use state::{State, StateMachine};

/// How long cleanup waits for the exit notification after a kill before
/// double-checking the OS process table.
const EXIT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle events. `Ready` mirrors the endpoint `start()` returns; `Exit`
/// is emitted whenever the child ends, expected or not.
#[derive(Debug, Clone)]
pub enum LauncherEvent {
    Ready {
        endpoint: String,
    },
    Exit {
        code: Option<i32>,
        signal: Option<i32>,
    },
}

/// A caller-owned handle tied to the running server, in practice the
/// WebSocket browser session. `stop()` closes it before the process is
/// killed so the peer sees an orderly shutdown instead of a dropped socket.
#[async_trait::async_trait]
pub trait RemoteResource: Send + Sync {
    /// Close the resource. Closing one that never actually connected must
    /// be a no-op, not an error.
    async fn close(&mut self) -> anyhow::Result<()>;
}

struct Inner {
    machine: StateMachine,
    /// Start-cycle generation counter. Every cleanup path re-checks it under
    /// the lock, so a stale loser of a finished race can never touch a later
    /// cycle.
    run_id: u64,
    pid: Option<u32>,
    endpoint: Option<String>,
    exited_rx: Option<watch::Receiver<Option<ExitInfo>>>,
    remote: Option<Box<dyn RemoteResource>>,
}

/// Supervisor for a single server process. Cheap to construct; multiple
/// supervisors are fully independent.
pub struct Supervisor {
    options: LaunchOptions,
    detector: Arc<dyn ReadyDetector>,
    events: broadcast::Sender<LauncherEvent>,
    inner: Arc<Mutex<Inner>>,
}

impl Supervisor {
    pub fn new(options: LaunchOptions) -> Self {
        Self::with_detector(options, Arc::new(WsEndpointDetector::new()))
    }

    /// Supervisor with a custom readiness detector, for servers that
    /// announce themselves with something other than a `ws://` URL.
    pub fn with_detector(options: LaunchOptions, detector: Arc<dyn ReadyDetector>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            options,
            detector,
            events,
            inner: Arc::new(Mutex::new(Inner {
                machine: StateMachine::new(),
                run_id: 0,
                pid: None,
                endpoint: None,
                exited_rx: None,
                remote: None,
            })),
        }
    }

    /// Start the server and wait for its endpoint announcement.
    ///
    /// Exactly one outcome settles the call: the endpoint arrives (`Ok`),
    /// the spawn fails, the startup timeout elapses, or the child exits
    /// early. The losing futures are dropped with the race, so a finished
    /// call can never be resolved a second time.
    pub async fn start(&self) -> Result<String, LauncherError> {
        let timeout = self.options.start_timeout();

        // Reserve the cycle and spawn while holding the lock, so no other
        // start() or stop() can interleave into the Idle → Starting gap.
        let (run_id, mut endpoint_rx, mut exited_rx) = {
            let mut inner = self.inner.lock().await;
            let current = inner.machine.state;
            if inner.machine.transition(State::Starting).is_err() {
                return Err(LauncherError::AlreadyRunning(current));
            }
            inner.run_id += 1;
            let run_id = inner.run_id;

            let process = match self.spawn_child() {
                Ok(p) => p,
                Err(e) => {
                    let _ = inner.machine.transition(State::Idle);
                    return Err(e);
                }
            };

            inner.pid = Some(process.pid);
            inner.exited_rx = Some(process.exited_rx.clone());
            (run_id, process.endpoint_rx, process.exited_rx)
        };

        let sleep = tokio::time::sleep(timeout);
        tokio::pin!(sleep);
        let mut endpoint_closed = false;

        loop {
            tokio::select! {
                res = &mut endpoint_rx, if !endpoint_closed => match res {
                    Ok(endpoint) => break self.finish_start(run_id, endpoint).await,
                    Err(_) => {
                        // stdout closed without an announcement; the exit
                        // notification is imminent
                        endpoint_closed = true;
                    }
                },
                info = wait_for_exit(&mut exited_rx) => {
                    let info = info.unwrap_or(ExitInfo { code: None, signal: None });
                    tracing::warn!(
                        "Server process exited before becoming ready (code: {:?}, signal: {:?})",
                        info.code,
                        info.signal
                    );
                    self.reset_after_failed_start(run_id).await;
                    break Err(LauncherError::PrematureExit {
                        code: info.code,
                        signal: info.signal,
                    });
                }
                _ = &mut sleep => {
                    tracing::warn!("Server did not announce an endpoint within {:?}", timeout);
                    self.kill_current(run_id).await;
                    self.reset_after_failed_start(run_id).await;
                    break Err(LauncherError::StartTimeout(timeout));
                }
            }
        }
    }

    /// Stop the server. Never fails: returns 0 on a clean stop (including
    /// when there was nothing to stop), 1 when any cleanup step reported an
    /// error. A call that races an in-flight stop waits for that teardown
    /// to finish, so whenever stop() returns the supervisor is immediately
    /// restartable.
    pub async fn stop(&self) -> i32 {
        match self.stop_inner().await {
            Ok(()) => 0,
            Err(e) => {
                tracing::error!("Stop finished with errors: {}", e);
                1
            }
        }
    }

    /// Stop then start. The stop status is logged only; errors from the new
    /// cycle propagate.
    pub async fn restart(&self) -> Result<String, LauncherError> {
        let status = self.stop().await;
        if status != 0 {
            tracing::warn!("Stop during restart reported status {}", status);
        }
        self.start().await
    }

    /// Register the resource `stop()` must close before killing the process.
    /// A later registration replaces the previous one; the replaced resource
    /// is dropped without being closed.
    pub async fn set_remote_resource(&self, resource: Box<dyn RemoteResource>) {
        let mut inner = self.inner.lock().await;
        if inner.remote.is_some() {
            tracing::debug!("Replacing previously registered remote resource");
        }
        inner.remote = Some(resource);
    }

    /// The endpoint of the running server, `None` in every other state.
    pub async fn endpoint(&self) -> Option<String> {
        let inner = self.inner.lock().await;
        if inner.machine.state == State::Running {
            inner.endpoint.clone()
        } else {
            None
        }
    }

    pub async fn state(&self) -> State {
        self.inner.lock().await.machine.state
    }

    pub async fn pid(&self) -> Option<u32> {
        self.inner.lock().await.pid
    }

    pub async fn is_running(&self) -> bool {
        self.state().await == State::Running
    }

    /// Subscribe to lifecycle events. Readiness is also reported through
    /// `start()`'s return value, so single-consumer callers never need this.
    pub fn subscribe(&self) -> broadcast::Receiver<LauncherEvent> {
        self.events.subscribe()
    }

    // ── internals ────────────────────────────────────────────

    fn spawn_child(&self) -> Result<ServerProcess, LauncherError> {
        let config_json = serde_json::to_string(&self.options.server).map_err(|e| {
            LauncherError::Spawn(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        ServerProcess::spawn(
            &self.options.resolve_python(),
            &self.options.resolve_script(),
            &config_json,
            &config::install_dir(),
            self.detector.clone(),
            self.events.clone(),
        )
    }

    /// Endpoint won the race: move to Running, record it, emit `Ready`, and
    /// arm the unexpected-exit reaper for this cycle.
    async fn finish_start(&self, run_id: u64, endpoint: String) -> Result<String, LauncherError> {
        let mut inner = self.inner.lock().await;
        if inner.run_id != run_id || inner.machine.state != State::Starting {
            // stop() took the cycle over while the announcement was in
            // flight; the child is gone or going
            tracing::debug!("Endpoint arrived after the start cycle was torn down");
            return Err(LauncherError::PrematureExit {
                code: None,
                signal: None,
            });
        }

        let _ = inner.machine.transition(State::Running);
        inner.endpoint = Some(endpoint.clone());
        tracing::info!("Server ready at {}", endpoint);
        let _ = self.events.send(LauncherEvent::Ready {
            endpoint: endpoint.clone(),
        });

        if let Some(mut exit_rx) = inner.exited_rx.clone() {
            let inner_arc = self.inner.clone();
            tokio::spawn(async move {
                let info = wait_for_exit(&mut exit_rx).await;
                let mut inner = inner_arc.lock().await;
                // stop() owns the shutdown when the state is Stopping, and a
                // different run_id means a whole new cycle took over
                if inner.run_id == run_id && inner.machine.state == State::Running {
                    tracing::warn!(
                        "Server process exited unexpectedly (code: {:?}, signal: {:?})",
                        info.map(|i| i.code),
                        info.map(|i| i.signal)
                    );
                    let _ = inner.machine.transition(State::Idle);
                    inner.pid = None;
                    inner.endpoint = None;
                    inner.exited_rx = None;
                }
            });
        }

        Ok(endpoint)
    }

    /// Kill the current cycle's process and confirm it is gone. Used by the
    /// timeout path; the premature-exit path skips the kill since the PID is
    /// already dead and may have been reused.
    async fn kill_current(&self, run_id: u64) {
        let (pid, exited_rx) = {
            let inner = self.inner.lock().await;
            if inner.run_id != run_id {
                return;
            }
            (inner.pid, inner.exited_rx.clone())
        };

        if let Some(pid) = pid {
            if let Err(e) = crate::process::kill_process_tree_async(pid).await {
                tracing::warn!("Failed to kill server process {}: {}", pid, e);
            }
            if let Some(mut rx) = exited_rx {
                let confirmed =
                    tokio::time::timeout(EXIT_CONFIRM_TIMEOUT, wait_for_exit(&mut rx)).await;
                if confirmed.is_err() && crate::process::is_running_async(pid).await {
                    tracing::error!("Server process {} survived the kill", pid);
                }
            }
        }
    }

    /// Return a failed start cycle to Idle, unless stop() or a newer cycle
    /// already owns the state.
    async fn reset_after_failed_start(&self, run_id: u64) {
        let mut inner = self.inner.lock().await;
        if inner.run_id == run_id && inner.machine.state == State::Starting {
            let _ = inner.machine.transition(State::Idle);
            inner.pid = None;
            inner.endpoint = None;
            inner.exited_rx = None;
        }
    }

    async fn stop_inner(&self) -> Result<(), LauncherError> {
        // Take ownership of everything this stop is responsible for. A
        // leftover remote resource is closed even from Idle.
        let (run_id, remote, pid, exited_rx, active, already_stopping) = {
            let mut inner = self.inner.lock().await;
            let active = matches!(inner.machine.state, State::Starting | State::Running);
            let already_stopping = inner.machine.state == State::Stopping;
            if active {
                let _ = inner.machine.transition(State::Stopping);
            }
            (
                inner.run_id,
                inner.remote.take(),
                if active { inner.pid } else { None },
                if active { inner.exited_rx.clone() } else { None },
                active,
                already_stopping,
            )
        };

        let mut failed: Option<String> = None;

        // 프로세스가 아직 살아 있는 동안 원격 리소스를 먼저 닫는다
        if let Some(mut remote) = remote {
            if let Err(e) = remote.close().await {
                tracing::warn!("Remote resource close failed: {}", e);
                failed = Some(format!("remote resource close failed: {}", e));
            }
        }

        if let Some(pid) = pid {
            let already_exited = exited_rx
                .as_ref()
                .map(|rx| rx.borrow().is_some())
                .unwrap_or(false);
            if !already_exited {
                if let Err(e) = crate::process::kill_process_tree_async(pid).await {
                    tracing::warn!("Failed to kill server process {}: {}", pid, e);
                    failed = Some(format!("kill failed for process {}: {}", pid, e));
                }
            }
            if let Some(mut rx) = exited_rx {
                let confirmed =
                    tokio::time::timeout(EXIT_CONFIRM_TIMEOUT, wait_for_exit(&mut rx)).await;
                if confirmed.is_err() && crate::process::is_running_async(pid).await {
                    failed = Some(format!("process {} still running after kill", pid));
                }
            }
        }

        {
            let mut inner = self.inner.lock().await;
            if inner.run_id == run_id && active {
                let _ = inner.machine.transition(State::Idle);
                inner.pid = None;
                inner.endpoint = None;
                inner.exited_rx = None;
            }
        }

        // 경쟁에서 진 stop()은 이긴 쪽의 정리가 끝나 Idle로 돌아올 때까지
        // 기다린다. stop()이 반환된 직후에는 항상 start()가 가능해야 한다
        if already_stopping {
            while self.state().await == State::Stopping {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }

        match failed {
            None => Ok(()),
            Some(msg) => Err(LauncherError::Stop(msg)),
        }
    }
}
