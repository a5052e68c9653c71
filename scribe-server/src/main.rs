//! Scribe sync server.
//!
//! Usage: `scribe-server [config.json]`. Without a config file the server
//! binds 127.0.0.1:9090 and keeps documents in memory. Set `RUST_LOG` to
//! control log output.

use log::{error, info};
use scribe_collab::server::{ServerConfig, SyncServer};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => match ServerConfig::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to read config {path}: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => ServerConfig::default(),
    };

    info!("Starting Scribe sync server...");
    let server = match SyncServer::new(config) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to open storage: {e}");
            return ExitCode::FAILURE;
        }
    };

    let code = tokio::select! {
        result = server.run() => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Server stopped: {e}");
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            ExitCode::SUCCESS
        }
    };

    server.shutdown().await;
    code
}
