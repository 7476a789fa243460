//! Wiregate session gateway.
//!
//! Binary wiring for the session subsystem: configuration, observability,
//! the TCP accept loop (with optional TLS), the session registry with its
//! idle sweeper, and signal-driven graceful shutdown. The accept loop plays
//! the external-collaborator role: it hands connected transports to the
//! registry and otherwise stays out of the sessions' way.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use wiregate::config::loader::load_config;
use wiregate::config::GateConfig;
use wiregate::lifecycle::{self, Shutdown};
use wiregate::net::registry::SessionRegistry;
use wiregate::net::stream::SessionStream;
use wiregate::net::tls::load_tls_acceptor;
use wiregate::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "wiregate", about = "Session gateway for byte-oriented peers")]
struct Args {
    /// Path to a TOML configuration file; built-in defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GateConfig::default(),
    };

    logging::init_logging(&config.observability.log_filter);
    tracing::info!("wiregate v0.1.0 starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_sessions = config.listener.max_sessions,
        idle_timeout_secs = config.session.idle_timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let tls_acceptor = match &config.listener.tls {
        Some(tls) => Some(load_tls_acceptor(
            Path::new(&tls.cert_path),
            Path::new(&tls.key_path),
        )?),
        None => None,
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(
        address = %local_addr,
        tls = tls_acceptor.is_some(),
        "Listening for connections"
    );

    let registry = Arc::new(SessionRegistry::new(
        config.listener.max_sessions,
        config.session.clone(),
    ));
    let shutdown = Arc::new(Shutdown::new());

    if config.sweep.enabled {
        let sweeper = Arc::clone(&registry);
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(sweeper.run_sweeper(
            Duration::from_secs(config.sweep.interval_secs),
            shutdown_rx,
        ));
    }

    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            lifecycle::wait_for_signal().await;
            shutdown.trigger();
        });
    }

    let mut shutdown_rx = shutdown.subscribe();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, peer)) => {
                        let registry = Arc::clone(&registry);
                        let tls_acceptor = tls_acceptor.clone();
                        tokio::spawn(async move {
                            let stream = match tls_acceptor {
                                Some(acceptor) => match acceptor.accept(socket).await {
                                    Ok(tls_stream) => SessionStream::secure(tls_stream),
                                    Err(e) => {
                                        tracing::warn!(peer = %peer, error = %e, "TLS handshake failed");
                                        return;
                                    }
                                },
                                None => SessionStream::plain(socket),
                            };
                            match registry.register(stream) {
                                Ok(session) => {
                                    session.start();
                                }
                                Err(e) => {
                                    tracing::warn!(peer = %peer, error = %e, "Connection refused");
                                }
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                tracing::info!("Shutdown signal received; closing listener");
                break;
            }
        }
    }

    registry.shutdown_all().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
