use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flipcast::api::{self, AppState};
use flipcast::broadcaster::Broadcaster;
use flipcast::config::Config;
use flipcast::marketplace::{MercariClient, SearchQuery};
use flipcast::scan::{self, ScanConfig};

#[derive(Error, Debug)]
pub enum FlipcastError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), FlipcastError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "flipcast=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();
    tracing::info!("flipcast starting");

    let broadcaster = Broadcaster::with_limits(
        Duration::from_secs(config.write_timeout.max(1)),
        config.queue_capacity,
    );

    // The keepalive timer lives here, not inside the broadcaster.
    let pinger = broadcaster.clone();
    let ping_interval = Duration::from_secs(config.ping_interval.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(ping_interval);
        // The first tick fires immediately; there is nobody to ping yet.
        interval.tick().await;
        loop {
            interval.tick().await;
            let delivered = pinger.ping();
            tracing::trace!(delivered, "keepalive ping");
        }
    });

    if let Some(keywords) = config.scan_keywords.clone() {
        let client = MercariClient::new(config.mercari_api_key.clone());
        let scan_config = ScanConfig {
            query: SearchQuery {
                keywords,
                category: config.scan_category.clone(),
                condition: config.scan_condition.clone(),
                min_price: config.scan_min_price,
                max_price: config.scan_max_price,
                include_sold: false,
            },
            interval: Duration::from_secs(config.scan_interval.max(1)),
            reference_price: config.reference_price,
            opportunity_score: config.opportunity_score,
            alert_score: config.alert_score,
        };
        tokio::spawn(scan::run(client, broadcaster.clone(), scan_config));
        tracing::info!("scan pipeline enabled");
    }

    let state = AppState {
        broadcaster: broadcaster.clone(),
        auth_token: config.auth_token.as_deref().map(Arc::from),
    };
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|source| FlipcastError::Bind {
            addr: config.bind,
            source,
        })?;
    tracing::info!(addr = %config.bind, "listening");

    let shutdown_broadcaster = broadcaster.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("shutdown signal received");
            // Open event streams never end on their own; cut them loose so
            // graceful shutdown can finish.
            shutdown_broadcaster.disconnect_all();
        })
        .await
        .map_err(FlipcastError::Serve)?;

    tracing::info!("flipcast stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
