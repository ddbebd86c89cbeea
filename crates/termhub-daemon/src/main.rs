//! Termhub Daemon
//!
//! Serves terminal sessions to WebSocket clients: one PTY process per
//! session, shared by every authorised client, with catch-up replay for
//! late joiners.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use termhub_daemon::access::AccessGate;
use termhub_daemon::gateway::Gateway;
use termhub_daemon::persist::PersistenceBridge;
use termhub_daemon::process::{FallbackBackend, ProcessBackend, PtyBackend, PtyCommand, PtyGeometry};
use termhub_daemon::server::WsServer;
use termhub_daemon::session::{RegistryConfig, SessionRegistry};
use termhub_daemon::storage::Database;

#[derive(Parser, Debug)]
#[command(name = "termhub-daemon")]
#[command(version, about = "Termhub daemon - terminal session multiplexer")]
struct Args {
    /// TCP bind address for the WebSocket server
    #[arg(long, default_value = "127.0.0.1:7070", env = "TERMHUB_ADDR")]
    addr: SocketAddr,

    /// Database file path
    #[arg(long, env = "TERMHUB_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Program spawned inside each session's terminal
    #[arg(long, default_value = "bash", env = "TERMHUB_COMMAND")]
    command: String,

    /// Arguments passed to the session program (repeatable)
    #[arg(long = "command-arg", env = "TERMHUB_COMMAND_ARGS", value_delimiter = ' ')]
    command_args: Vec<String>,

    /// Initial terminal width for fresh sessions
    #[arg(long, default_value_t = 80, env = "TERMHUB_COLS")]
    cols: u16,

    /// Initial terminal height for fresh sessions
    #[arg(long, default_value_t = 24, env = "TERMHUB_ROWS")]
    rows: u16,

    /// Use the synthetic process backend instead of real PTYs
    #[arg(long, env = "TERMHUB_SYNTHETIC")]
    synthetic: bool,

    /// Log level filter for the daemon (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "info", env = "TERMHUB_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "TERMHUB_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_filter = format!("termhub_daemon={}", args.log_level);
    termhub_core::tracing_init::init_tracing(&log_filter, args.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %args.addr,
        synthetic = args.synthetic,
        "Starting termhub-daemon"
    );

    let db = if let Some(path) = &args.db_path {
        Database::open(path).await?
    } else {
        let default_path = default_db_path()?;
        info!(path = %default_path.display(), "Opening database (default path)");
        Database::open(&default_path).await?
    };

    // Backend selection is explicit and happens once, here.
    let backend: Arc<dyn ProcessBackend> = if args.synthetic {
        Arc::new(FallbackBackend::new())
    } else {
        Arc::new(PtyBackend::new(PtyCommand {
            program: args.command.clone(),
            args: args.command_args.clone(),
        }))
    };

    let bridge = PersistenceBridge::new(Arc::new(db.clone()));
    let registry = Arc::new(SessionRegistry::new(
        backend,
        bridge,
        RegistryConfig {
            geometry: PtyGeometry {
                cols: args.cols,
                rows: args.rows,
            },
            ..RegistryConfig::default()
        },
    ));
    let gateway = Arc::new(Gateway::new(Arc::clone(&registry), AccessGate::new(Arc::new(db))));
    let server = WsServer::new(gateway);

    let listener = tokio::net::TcpListener::bind(args.addr).await?;

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    // Notify systemd that the daemon is ready to serve (unix only).
    // The `true` parameter unsets $NOTIFY_SOCKET so session processes
    // don't accidentally notify systemd.
    #[cfg(unix)]
    sd_notify::notify(true, &[sd_notify::NotifyState::Ready])?;

    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    tokio::select! {
        result = server.serve(listener) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
        }
    }

    registry.shutdown().await;
    info!("Daemon stopped");
    Ok(())
}

/// Default database path: ~/.termhub/termhub.db
fn default_db_path() -> anyhow::Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".termhub").join("termhub.db"))
}
