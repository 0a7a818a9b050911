pub mod config;
pub mod process;
pub mod supervisor;

pub use config::{LaunchOptions, ProxyConfig, ServerOptions};
pub use supervisor::child::ExitInfo;
pub use supervisor::error::LauncherError;
pub use supervisor::ready::{OutputScanner, ReadyDetector, WsEndpointDetector};
pub use supervisor::state::State;
pub use supervisor::{LauncherEvent, RemoteResource, Supervisor};
