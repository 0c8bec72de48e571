//! atomic server - script-driven BBS session engine

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use atomic_utils::{AtomicError, LogConfig, Result};

mod config;
mod pty;
mod registry;
mod script;
mod session;
mod tcp;
mod terminal;

use config::{AppConfig, ConfigLoader};
use registry::SessionRegistry;
use script::{BannerEngine, ScriptCache};
use session::ConfigIdentityResolver;
use tcp::ServerContext;

#[derive(Debug, Parser)]
#[command(name = "atomic-server", version, about = "Script-driven BBS terminal server")]
struct Args {
    /// Configuration file (defaults to the XDG config location)
    #[arg(short, long, env = "ATOMIC_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overrides server.listen
    #[arg(short, long)]
    listen: Option<String>,

    /// Verbose logging to stderr
    #[arg(long)]
    debug: bool,
}

/// Server state container
pub struct Server {
    context: ServerContext,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    pub fn new(config: AppConfig) -> Self {
        let engine = Arc::new(BannerEngine::new(config.doors.clone()));
        let scripts = ScriptCache::new(engine, config.server.entry_script.clone())
            .with_fallback(config.server.banner.clone());
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            context: ServerContext {
                identities: Arc::new(ConfigIdentityResolver::new(config.users.clone())),
                config: Arc::new(config),
                registry: Arc::new(SessionRegistry::new()),
                scripts: Arc::new(scripts),
            },
            shutdown_tx,
        }
    }

    /// Listen until Ctrl-C, then close every session
    pub async fn run(&self) -> Result<()> {
        let addr = &self.context.config.server.listen;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AtomicError::connection(format!("bind {}: {}", addr, e)))?;

        // Sessions reuse this compile
        if let Err(e) = self.context.scripts.get_or_compile() {
            warn!(error = %e, "Entry script does not compile yet");
        }

        let accept = tokio::spawn(tcp::run_accept_loop(
            listener,
            self.context.clone(),
            self.shutdown_tx.subscribe(),
        ));

        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
        }
        info!("Shutting down");

        let _ = self.shutdown_tx.send(());
        self.context.registry.shutdown_all();
        if let Err(e) = accept.await {
            warn!(error = %e, "Accept loop task failed");
        }
        Ok(())
    }
}

fn write_pid_file(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        atomic_utils::paths::ensure_dir(dir).map_err(|source| AtomicError::FileWrite {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, std::process::id().to_string()).map_err(|source| {
        AtomicError::FileWrite {
            path: path.to_path_buf(),
            source,
        }
    })
}

async fn run_daemon(args: Args) -> Result<()> {
    info!("atomic server starting");

    let mut config = ConfigLoader::load_and_validate(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }

    info!(
        listen = %config.server.listen,
        entry_script = %config.server.entry_script.display(),
        output_mode = %config.terminal.output_mode,
        "Configuration loaded"
    );

    let pid_path = atomic_utils::pid_file();
    if let Err(e) = write_pid_file(&pid_path) {
        warn!(error = %e, "Could not write PID file");
    }

    let server = Server::new(config);
    let result = server.run().await;

    if pid_path.exists() {
        let _ = std::fs::remove_file(&pid_path);
    }

    info!("atomic server stopped");
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_config = if args.debug {
        LogConfig::development()
    } else {
        LogConfig::server()
    };
    atomic_utils::init_logging_with_config(log_config)?;

    run_daemon(args).await
}
