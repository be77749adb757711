//! findit-daemon: background indexing and search daemon for FindIt.
//!
//! Provides:
//! - Unix socket server for IPC (§6 tool surface)
//! - The shared Global DB, vector indices and embedding/VLM clients,
//!   loaded once and held for the daemon's lifetime
//! - File watching and incremental indexing (§4.7, §4.1)

use anyhow::{Context, Result};
use clap::Parser;
use findit_daemon::config::{default_config_path, load_config, Config};
use findit_daemon::{default_app_dir, default_pid_path, default_socket_path, Server};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "findit-daemon")]
#[command(about = "FindIt daemon - background media indexing and search service")]
#[command(version)]
struct Args {
    /// Run in foreground (don't daemonize)
    #[arg(long)]
    foreground: bool,

    /// Unix socket path
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Application data directory (Global DB, vector indices, folder registry)
    #[arg(long)]
    app_dir: Option<PathBuf>,

    /// PID file path
    #[arg(long)]
    pid: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = default_config_path()?;
    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load config from {}: {err}. Using defaults.", config_path.display());
            Config::default()
        }
    };

    let socket_path = args.socket.or_else(|| config.daemon_socket_path()).unwrap_or_else(default_socket_path);
    let app_dir = args.app_dir.unwrap_or_else(default_app_dir);
    let pid_path = args.pid.unwrap_or_else(default_pid_path);

    if args.foreground {
        tracing_subscriber::fmt().with_writer(std::io::stderr).init();
        run_daemon(&socket_path, &app_dir, &pid_path, &config)
    } else {
        daemonize(&socket_path, &app_dir, &pid_path, &config)
    }
}

/// Double-fork daemonize: detach from the controlling terminal, start a
/// new session, and redirect stdio to `/dev/null` before the tokio
/// runtime ever starts.
fn daemonize(socket_path: &Path, app_dir: &Path, pid_path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = pid_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create PID directory")?;
    }

    match unsafe { libc::fork() } {
        -1 => anyhow::bail!("fork failed"),
        0 => {}
        _ => std::process::exit(0),
    }

    if unsafe { libc::setsid() } == -1 {
        anyhow::bail!("setsid failed");
    }

    match unsafe { libc::fork() } {
        -1 => anyhow::bail!("second fork failed"),
        0 => {}
        _ => std::process::exit(0),
    }

    std::env::set_current_dir("/").ok();

    let dev_null = std::fs::OpenOptions::new().read(true).write(true).open("/dev/null").context("failed to open /dev/null")?;

    use std::os::unix::io::AsRawFd;
    unsafe {
        libc::dup2(dev_null.as_raw_fd(), libc::STDIN_FILENO);
        libc::dup2(dev_null.as_raw_fd(), libc::STDOUT_FILENO);
        libc::dup2(dev_null.as_raw_fd(), libc::STDERR_FILENO);
    }

    let log_dir = pid_path.parent().unwrap_or(std::path::Path::new("/tmp"));
    let log_path = log_dir.join("findit-daemon.log");

    let log_file = std::fs::OpenOptions::new().create(true).append(true).open(&log_path).context("failed to open log file")?;

    tracing_subscriber::fmt().with_writer(std::sync::Mutex::new(log_file)).with_ansi(false).init();

    run_daemon(socket_path, app_dir, pid_path, config)
}

fn run_daemon(socket_path: &Path, app_dir: &Path, pid_path: &Path, config: &Config) -> Result<()> {
    let pid = std::process::id();
    if let Some(parent) = pid_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    std::fs::write(pid_path, pid.to_string()).context("failed to write PID file")?;

    tracing::info!("findit-daemon starting (pid: {pid})");

    let rt = tokio::runtime::Builder::new_multi_thread().enable_all().build().context("failed to create tokio runtime")?;

    let result = rt.block_on(async_main(socket_path, app_dir, pid_path, config));

    std::fs::remove_file(pid_path).ok();

    result
}

async fn async_main(socket_path: &Path, app_dir: &Path, pid_path: &Path, config: &Config) -> Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;
    let mut sighup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())?;

    let server = Server::new(socket_path, app_dir, config)?;

    tokio::select! {
        result = server.run() => {
            result?;
        }
        _ = sigterm.recv() => {
            tracing::info!("received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            tracing::info!("received SIGINT, shutting down");
        }
        _ = sighup.recv() => {
            tracing::info!("received SIGHUP, shutting down");
        }
    }

    std::fs::remove_file(socket_path).ok();
    std::fs::remove_file(pid_path).ok();

    tracing::info!("findit-daemon stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_defaults() {
        let args = Args::parse_from(["findit-daemon"]);
        assert!(!args.foreground);
        assert!(args.socket.is_none());
        assert!(args.app_dir.is_none());
        assert!(args.pid.is_none());
    }

    #[test]
    fn args_foreground_flag() {
        let args = Args::parse_from(["findit-daemon", "--foreground"]);
        assert!(args.foreground);
    }

    #[test]
    fn args_custom_paths() {
        let args = Args::parse_from([
            "findit-daemon",
            "--socket",
            "/tmp/custom.sock",
            "--app-dir",
            "/tmp/custom-data",
            "--pid",
            "/tmp/custom.pid",
        ]);

        assert_eq!(args.socket.as_deref(), Some(Path::new("/tmp/custom.sock")));
        assert_eq!(args.app_dir.as_deref(), Some(Path::new("/tmp/custom-data")));
        assert_eq!(args.pid.as_deref(), Some(Path::new("/tmp/custom.pid")));
    }
}
