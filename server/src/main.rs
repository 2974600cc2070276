use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::Server;
use shared::{DEFAULT_PORT, DEFAULT_SAVE_INTERVAL_SECS, DEFAULT_STATE_FILE};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
    /// File the world is saved to
    #[clap(short, long, env = "STATE_FILE", default_value = DEFAULT_STATE_FILE)]
    state_file: PathBuf,
    /// Seconds between background saves of a non-empty world
    #[clap(long, default_value_t = DEFAULT_SAVE_INTERVAL_SECS)]
    save_interval: u64,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            host: args.host,
            port: args.port,
            state_file: args.state_file,
            save_interval: Duration::from_secs(args.save_interval.max(1)),
        }
    }
}

/// Parses arguments, binds the listener and runs the server until a shutdown
/// signal arrives or the world handler fails.
#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from(Args::parse());

    let server = match Server::bind(&config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start server: {}", e);
            if let Some(help) = e.remediation() {
                error!("{}", help);
            }
            return ExitCode::FAILURE;
        }
    };

    match server.run(shutdown_signal()).await {
        Ok(()) => {
            info!("Server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Server stopped after a fatal error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Resolves on Ctrl+C, or on SIGTERM where available.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down gracefully..."),
        _ = terminate => info!("Received SIGTERM, shutting down gracefully..."),
    }
}
