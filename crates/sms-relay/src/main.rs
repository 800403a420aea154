//! SMS Relay - Entry point.

use sms_relay::{
    api::{create_router_with_body_limit, AppState},
    config::{Config, LogConfig, StoreBackend},
    SmsRelay,
};
use sms_store::{ConnectionState, Store};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config.log);

    info!("Starting SMS Relay");

    // Connect to the store before accepting any traffic
    let store = match config.store.backend {
        StoreBackend::Redis => match Store::redis(config.store.redis_options()).await {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to connect to Redis: {}", e);
                std::process::exit(1);
            }
        },
        StoreBackend::Memory => {
            warn!("Using in-memory storage (messages will be lost on restart)");
            Store::memory(config.store.sweep_interval)
        }
    };
    let store = Arc::new(store);

    // A store that turns fatal later (e.g. credentials revoked) takes the process down
    let monitor = store.monitor().clone();
    tokio::spawn(async move {
        if monitor.terminated().await == ConnectionState::Fatal {
            error!("Store connection failed permanently, exiting");
            std::process::exit(1);
        }
    });

    let relay = SmsRelay::new(store.clone(), config.relay.ttl);
    let app = create_router_with_body_limit(AppState::new(relay), config.relay.max_body_bytes);

    // Bind to address
    let ip = match config.server.listen_ip() {
        Ok(ip) => ip,
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    };
    let addr = SocketAddr::new(ip, config.server.port);

    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!(
        "Listening on {} (ttl={:?}, store={})",
        addr,
        config.relay.ttl,
        store.backend()
    );
    info!("Waiting for messages...");

    // Run server
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    store.disconnect().await;

    if let Err(e) = result {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("SMS Relay stopped");
}

fn init_logging(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));

    let registry = tracing_subscriber::registry().with(filter);
    if log.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
