//! Launch options for the Camoufox server process.
//!
//! `ServerOptions` is the part serialized into the `--config` JSON argument
//! the Python server reads; key names are camelCase because that is the
//! contract on the child side (`config.get('blockImages')` etc.).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default startup timeout in milliseconds.
pub const DEFAULT_START_TIMEOUT_MS: u64 = 30_000;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    pub server: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Options forwarded to the server process. Serialized as one compact JSON
/// argv entry; the server falls back to its own defaults for missing keys,
/// but we always send the full set so behavior is explicit.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerOptions {
    pub headless: bool,
    pub geoip: bool,
    /// Omitted from the JSON when unset; the server treats a missing key as
    /// "no proxy".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,
    pub humanize: bool,
    pub showcursor: bool,
    pub block_images: bool,
    pub main_world_eval: bool,
    pub debug: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            headless: true,
            geoip: true,
            proxy: None,
            humanize: true,
            showcursor: true,
            block_images: false,
            main_world_eval: true,
            debug: false,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LaunchOptions {
    pub server: ServerOptions,
    /// How long `start()` waits for the endpoint line before giving up.
    pub start_timeout_ms: u64,
    /// Python interpreter override. Resolution order: this field →
    /// `CAMOUFOX_PYTHON` → platform default.
    pub python: Option<PathBuf>,
    /// Server script override. Resolution order: this field →
    /// `CAMOUFOX_SERVER_SCRIPT` → `server.py` next to the executable.
    pub script: Option<PathBuf>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            server: ServerOptions::default(),
            start_timeout_ms: DEFAULT_START_TIMEOUT_MS,
            python: None,
            script: None,
        }
    }
}

impl LaunchOptions {
    /// Load options from a TOML file, falling back to defaults when the file
    /// is missing or malformed.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path.as_ref()).unwrap_or_default();
        let opts: Self = toml::from_str(&s).unwrap_or_else(|e| {
            if !s.is_empty() {
                tracing::warn!(
                    "Failed to parse {}: {}, using defaults",
                    path.as_ref().display(),
                    e
                );
            }
            Self::default()
        });
        Ok(opts)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    /// Python 인터프리터 경로를 해석합니다.
    pub fn resolve_python(&self) -> PathBuf {
        if let Some(ref python) = self.python {
            return python.clone();
        }
        // 환경 변수 오버라이드 (테스트/개발용)
        if let Ok(python) = std::env::var("CAMOUFOX_PYTHON") {
            return PathBuf::from(python);
        }
        #[cfg(target_os = "windows")]
        {
            PathBuf::from("python")
        }
        #[cfg(not(target_os = "windows"))]
        {
            PathBuf::from("python3")
        }
    }

    /// 서버 스크립트 경로를 해석합니다.
    pub fn resolve_script(&self) -> PathBuf {
        if let Some(ref script) = self.script {
            return script.clone();
        }
        // 환경 변수 오버라이드 (테스트/개발용)
        if let Ok(script) = std::env::var("CAMOUFOX_SERVER_SCRIPT") {
            return PathBuf::from(script);
        }
        install_dir().join("server.py")
    }
}

/// Directory the launcher is installed in. Also the working directory of the
/// server child, so its relative lookups (browser binaries, data files)
/// resolve against the install location rather than the caller's cwd.
pub fn install_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}
