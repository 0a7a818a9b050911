//! Cross-platform process termination and liveness checks.
//!
//! The server child may spawn its own helpers (the browser itself), so on
//! Windows the whole tree is taken down with `taskkill /T`. On Unix the
//! browser processes exit with the server, so a direct SIGKILL is enough.

use anyhow::Result;
use sysinfo::{Pid, System};

/// Force-kill a process (and, on Windows, its descendants) by PID.
///
/// A PID that no longer exists is treated as success: the goal is "this
/// process is gone", not "we delivered a signal".
pub fn kill_process_tree(pid: u32) -> Result<()> {
    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x08000000;

        match std::process::Command::new("taskkill")
            .args(["/T", "/F", "/PID", &pid.to_string()])
            .creation_flags(CREATE_NO_WINDOW)
            .output()
        {
            Ok(out) if out.status.success() => return Ok(()),
            Ok(out) => {
                // taskkill ran but refused; the PID may already be gone.
                if !is_running(pid) {
                    return Ok(());
                }
                tracing::warn!(
                    "taskkill /T /F /PID {} failed (status {:?}), falling back to TerminateProcess",
                    pid,
                    out.status.code()
                );
            }
            Err(e) => {
                tracing::warn!("taskkill unavailable for PID {}: {}, falling back", pid, e);
            }
        }

        // 폴백: 루트 프로세스만이라도 종료
        terminate_via_handle(pid)?;
    }

    #[cfg(not(target_os = "windows"))]
    {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid as NixPid;

        match signal::kill(NixPid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) => {}
            // ESRCH: 이미 종료된 프로세스
            Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => {
                return Err(anyhow::anyhow!("failed to send SIGKILL to PID {}: {}", pid, e));
            }
        }
    }

    Ok(())
}

#[cfg(target_os = "windows")]
fn terminate_via_handle(pid: u32) -> Result<()> {
    use winapi::um::handleapi::CloseHandle;
    use winapi::um::processthreadsapi::{OpenProcess, TerminateProcess};
    use winapi::um::winnt::PROCESS_TERMINATE;

    unsafe {
        let handle = OpenProcess(PROCESS_TERMINATE, 0, pid);
        if handle.is_null() {
            if !is_running(pid) {
                return Ok(());
            }
            return Err(anyhow::anyhow!("failed to open process {}", pid));
        }

        let result = TerminateProcess(handle, 1);
        CloseHandle(handle);

        if result == 0 {
            return Err(anyhow::anyhow!("TerminateProcess failed for PID {}", pid));
        }
    }
    Ok(())
}

/// 특정 PID가 실행 중인지 확인 (크로스 플랫폼)
pub fn is_running(pid: u32) -> bool {
    let mut sys = System::new();
    sys.refresh_processes();
    sys.process(Pid::from_u32(pid)).is_some()
}

// sysinfo 시스템 콜은 동기적으로 OS 프로세스 테이블 전체를 스캔합니다.
// tokio 워커 스레드에서 직접 호출하면 런타임 전체가 블로킹되므로,
// spawn_blocking을 통해 전용 블로킹 스레드풀에서 실행합니다.

/// `is_running`의 비동기 래퍼.
pub async fn is_running_async(pid: u32) -> bool {
    tokio::task::spawn_blocking(move || is_running(pid))
        .await
        .unwrap_or(false)
}

/// `kill_process_tree`의 비동기 래퍼.
pub async fn kill_process_tree_async(pid: u32) -> Result<()> {
    tokio::task::spawn_blocking(move || kill_process_tree(pid))
        .await
        .map_err(|e| anyhow::anyhow!("kill task panicked: {}", e))?
}
