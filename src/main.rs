use std::sync::Arc;

use camoufox_launcher::{LaunchOptions, LauncherEvent, Supervisor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    tracing::info!("Camoufox launcher starting");

    let config_path = std::env::var("CAMOUFOX_LAUNCHER_CONFIG")
        .unwrap_or_else(|_| "config/launcher.toml".to_string());
    let options = LaunchOptions::from_file(&config_path)?;

    let supervisor = Arc::new(Supervisor::new(options));
    let mut events = supervisor.subscribe();

    let endpoint = supervisor.start().await?;
    tracing::info!("Server available at {}", endpoint);
    println!("{}", endpoint);

    // Ctrl+C로 정리하거나, 서버가 먼저 죽으면 그 종료를 따라간다
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received, stopping server...");
                let status = supervisor.stop().await;
                tracing::info!("Stop finished with status {}", status);
                std::process::exit(status);
            }
            event = events.recv() => match event {
                Ok(LauncherEvent::Exit { code, signal }) => {
                    tracing::warn!(
                        "Server exited (code: {:?}, signal: {:?}), shutting down",
                        code,
                        signal
                    );
                    let status = supervisor.stop().await;
                    std::process::exit(if code == Some(0) { status } else { 1 });
                }
                Ok(LauncherEvent::Ready { endpoint }) => {
                    tracing::debug!("Ready event: {}", endpoint);
                }
                Err(_) => break,
            }
        }
    }

    Ok(())
}
