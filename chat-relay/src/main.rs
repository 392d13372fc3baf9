//! Chat relay server -- room-scoped WebSocket fan-out.
//!
//! Clients connect to `ws://host:port/?room=<name>` and send JSON chat
//! messages; each valid message is rebroadcast to the other clients in the
//! same room.
//!
//! # Usage
//!
//! ```bash
//! # Run on the default port 8787
//! cargo run --bin chat-relay
//!
//! # Run on a custom port
//! cargo run --bin chat-relay -- 9000
//!
//! # The PORT environment variable wins over the positional argument
//! PORT=9000 cargo run --bin chat-relay
//! ```

use std::sync::Arc;

use chat_relay::config::{RelayCliArgs, RelayConfig};
use chat_relay::relay::{self, RelayState};
use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = RelayCliArgs::parse();

    // Load config from PORT + CLI args + config file + defaults.
    let config = match RelayConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let bind_addr = config.bind_addr();
    tracing::info!(addr = %bind_addr, "starting chat relay");

    let state = Arc::new(RelayState::with_config(config.max_message_size));

    match relay::start_server_with_shutdown(&bind_addr, state, shutdown_signal()).await {
        Ok((bound_addr, handle)) => {
            tracing::info!("chat relay listening on ws://{bound_addr}");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "relay server task failed");
            }
            tracing::info!("chat relay stopped");
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start relay server");
            std::process::exit(1);
        }
    }
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
