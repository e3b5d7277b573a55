//! reclink-worker entry point.
//!
//! ```text
//! reclink-worker -l <log> -c <crash> [-u <user>] [-i <id>]
//! reclink-worker --config <path>   Load a custom config TOML
//! reclink-worker --gen-config      Write default config to stdout
//! reclink-worker -v                Print the version
//! ```

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::{CommandFactory, Parser};
use tracing::{Instrument, error, info, info_span, warn};

use reclink_worker::config::{LoadIssue, WorkerConfig};
use reclink_worker::logging;
use reclink_worker::service::WorkerService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "reclink-worker",
    about = "Recording/streaming session worker driven over a local socket",
    disable_version_flag = true
)]
struct Cli {
    /// Log file path.
    #[arg(short, long)]
    log: Option<PathBuf>,

    /// Crash report path.
    #[arg(short, long)]
    crash: Option<PathBuf>,

    /// User name attached to every log line.
    #[arg(short, long)]
    user: Option<String>,

    /// Session id attached to every log line.
    #[arg(short, long)]
    id: Option<String>,

    /// Print the version and exit.
    #[arg(short = 'v', long)]
    version: bool,

    /// Path to configuration TOML file.
    #[arg(long, default_value = "reclink-worker.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.version {
        println!("reclink-worker {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&WorkerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let (Some(log_path), Some(crash_path)) = (cli.log.clone(), cli.crash.clone()) else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let (config, load_issue) = match WorkerConfig::try_load(&cli.config) {
        Ok(config) => (config, None),
        Err(issue) => (WorkerConfig::default(), Some(issue)),
    };

    let log_guard = logging::init(&log_path, &config.logging.level)?;
    logging::install_crash_hook(crash_path);

    let user = cli.user.as_deref().unwrap_or("-");
    let id = cli.id.as_deref().unwrap_or("-");
    info!("reclink-worker v{}", env!("CARGO_PKG_VERSION"));
    match load_issue {
        None => info!("config: {}", cli.config.display()),
        Some(LoadIssue::Missing) => info!("no config at {}; using defaults", cli.config.display()),
        Some(issue @ LoadIssue::Invalid(_)) => {
            warn!("{}: {issue}; using defaults", cli.config.display())
        }
    }
    info!("socket: {} ({})", config.channel.socket_path.display(), config.channel.role);
    info!("engine: {}", config.engine.kind);
    info!("record when streaming: {}", config.session.record_when_streaming);

    let service = WorkerService::new(config);
    let stop = service.stop_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(false, Ordering::SeqCst);
    });

    let result = service
        .run()
        .instrument(info_span!("session", user, id))
        .await;
    match &result {
        Ok(summary) => info!(
            commands = summary.commands,
            disconnected = summary.disconnected,
            "exiting"
        ),
        Err(e) => error!(error = %e, "worker failed"),
    }
    log_guard.flush();
    result?;

    Ok(())
}
