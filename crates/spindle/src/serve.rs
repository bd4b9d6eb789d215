//! Daemon bootstrap: sweep, monitors, health endpoint, facade loop.

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

use spindle_harness::{spawn_monitor, startup_sweep};

use crate::daemon::Daemon;
use crate::facade;
use crate::health;
use crate::settings::Settings;

pub async fn serve(settings: Settings, host: String, port: u16) -> Result<()> {
    std::fs::create_dir_all(&settings.spindle_home)?;
    let daemon = Arc::new(Daemon::new(settings));

    info!(
        pid = std::process::id(),
        host,
        port,
        max_concurrent = daemon.settings.max_concurrent,
        "spindle starting"
    );
    install_signal_handlers();

    // Sweep stale records, finalize children that finished while the daemon
    // was down, and resume monitoring the ones still alive.
    let still_running = startup_sweep(&daemon.store);
    for id in still_running {
        info!(id, "resuming monitor after restart");
        spawn_monitor(daemon.store.clone(), id);
    }

    let health_daemon = Arc::clone(&daemon);
    let health_host = host.clone();
    tokio::spawn(async move {
        if let Err(e) = health::serve_health(health_daemon, health_host, port).await {
            error!(error = %e, "health endpoint failed");
        }
    });

    facade::run_stdio_facade(daemon).await?;
    info!("stdin closed, daemon exiting");
    Ok(())
}

/// Log daemon-directed signals and exit with `128 + signo`.
///
/// In-flight children are unaffected: they live in their own sessions.
fn install_signal_handlers() {
    use tokio::signal::unix::{signal, SignalKind};

    let hooks = [
        (SignalKind::terminate(), "SIGTERM", 15),
        (SignalKind::interrupt(), "SIGINT", 2),
        (SignalKind::hangup(), "SIGHUP", 1),
    ];
    for (kind, name, signo) in hooks {
        tokio::spawn(async move {
            match signal(kind) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!(signal = name, "signal received, exiting");
                    std::process::exit(128 + signo);
                }
                Err(e) => error!(signal = name, error = %e, "failed to install signal handler"),
            }
        });
    }
}
