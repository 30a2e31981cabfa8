mod handler;

use anyhow::Context;
use clap::Parser;
use decoy_core::config::{load_server_config, RuntimeOptions};
use decoy_core::observation::{JsonLinesSink, ObservationSink, Tee, TracingSink};
use decoy_core::{Responder, ServerIdentity};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::time::Duration;

#[derive(Parser)]
#[command(name = "decoy-server", about = "Decoy HTTP server: serves a static site and records every request")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "/etc/decoy/server.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_server_config(&cli.config)
        .map_err(|e| anyhow::anyhow!("{}", e))
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;

    let log_level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    tracing::info!("Decoy HTTP server starting");

    let sink: Box<dyn ObservationSink> = match &config.logging.file {
        Some(path) => {
            let file = JsonLinesSink::open(path)
                .with_context(|| format!("failed to open observation log {}", path.display()))?;
            Box::new(Tee(TracingSink, file))
        }
        None => Box::new(TracingSink),
    };

    let identity = ServerIdentity::from_config(config.content.identity.as_deref());
    let options = RuntimeOptions::from_names(&config.options);
    let responder = Responder::new(&config.content.root, identity, options, sink)
        .with_context(|| format!("failed to index content root {}", config.content.root.display()))?;
    tracing::info!(
        "Indexed {} files under {}, server banner {:?}",
        responder.index().len(),
        responder.root().display(),
        responder.identity().banner()
    );
    let responder = Arc::new(responder);

    let timeout = Duration::from_secs(config.limits.connection_timeout_sec);
    let max_head = config.limits.max_request_head;
    let max_conns = config.limits.max_connections as usize;

    let ip: IpAddr = config
        .server
        .listen
        .parse()
        .with_context(|| format!("invalid listen address {:?}", config.server.listen))?;
    let bind_addr = SocketAddr::new(ip, config.server.port);
    let listener = bind_listener(bind_addr).with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("Server listening on {}", bind_addr);

    // Connection limiter
    let semaphore = Arc::new(Semaphore::new(max_conns));

    // Accept loop
    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!("Accept failed: {}", e);
                        continue;
                    }
                };
                let responder = responder.clone();
                let sem = semaphore.clone();

                tokio::spawn(async move {
                    let _permit = match sem.try_acquire() {
                        Ok(p) => p,
                        Err(_) => {
                            tracing::warn!("Connection limit reached, rejecting {}", addr);
                            return;
                        }
                    };

                    if let Err(e) = handler::handle_client(stream, addr, responder, timeout, max_head).await {
                        tracing::debug!("Client {} error: {}", addr, e);
                    }
                });
            }
            _ = shutdown_signal() => {
                tracing::info!("Shutdown signal received");
                break;
            }
        }
    }

    tracing::info!("Decoy HTTP server stopped");
    Ok(())
}

fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nodelay(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    socket.set_nonblocking(true)?;
    TcpListener::from_std(socket.into())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
