use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod cli;
mod daemon;
mod facade;
mod health;
mod serve;
mod settings;
mod spin;

use cli::{Cli, Commands};
use settings::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::from_env();

    match cli.command {
        Commands::Serve { host, port } => {
            // stdout carries the JSON-RPC protocol; diagnostics go to
            // stderr and the rotating file log.
            let _guard = init_serve_logging(&settings)?;
            serve::serve(settings, host, port).await
        }
        Commands::Start => {
            init_stderr_logging();
            start_daemon()
        }
        Commands::Reload => {
            init_stderr_logging();
            let path = settings.reload_signal_path();
            std::fs::create_dir_all(&settings.spindle_home)?;
            std::fs::write(&path, chrono::Utc::now().to_rfc3339())
                .with_context(|| format!("Failed to touch {}", path.display()))?;
            println!("Reload signal dropped at {}", path.display());
            Ok(())
        }
        Commands::Status { host, port } => {
            init_stderr_logging();
            status(&host, port).await
        }
    }
}

fn init_serve_logging(
    settings: &Settings,
) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(&settings.spindle_home)?;
    let appender = tracing_appender::rolling::daily(&settings.spindle_home, "spindle.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .try_init()
        .ok();
    Ok(guard)
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .ok();
}

/// Start via systemd when a unit exists, else detach a background serve.
fn start_daemon() -> Result<()> {
    let unit_listing = std::process::Command::new("systemctl")
        .args(["--user", "list-unit-files", "spindle.service"])
        .output();

    let has_unit = unit_listing
        .map(|out| String::from_utf8_lossy(&out.stdout).contains("spindle.service"))
        .unwrap_or(false);

    if has_unit {
        std::process::Command::new("systemctl")
            .args(["--user", "start", "spindle"])
            .status()
            .context("Failed to run systemctl")?;
        println!("Started via systemd");
        return Ok(());
    }

    let exe = std::env::current_exe().context("Failed to locate own binary")?;
    std::process::Command::new(exe)
        .arg("serve")
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .context("Failed to spawn background daemon")?;
    println!("Started in background (no systemd service found)");
    Ok(())
}

async fn status(host: &str, port: u16) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()?;
    match client
        .get(format!("http://{host}:{port}/health"))
        .send()
        .await
    {
        Ok(resp) => println!("{}", resp.text().await.unwrap_or_default()),
        Err(_) => println!("Not running"),
    }
    Ok(())
}
