mod api;
mod client;
mod config;
mod engine;
mod error;
mod geo;
mod models;
mod observability;
mod state;

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::client::http::HttpGateway;
use crate::client::search::{SearchDebouncer, SearchResult};
use crate::client::tracking::{TrackingPoller, TrackingTarget, TrackingUpdate};
use crate::config::Config;
use crate::error::AppError;

const USAGE: &str = "usage:
  order-tracker                                      run the HTTP server
  order-tracker track <base-url> <order-id> <shop-order-id>
  order-tracker search <base-url> <city>             reads queries from stdin";

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("serve") => serve(&config).await,
        Some("track") => match &args[1..] {
            [base_url, order_id, shop_order_id] => {
                track(&config, base_url, parse_id(order_id)?, parse_id(shop_order_id)?).await
            }
            _ => Err(AppError::BadRequest(USAGE.to_string())),
        },
        Some("search") => match &args[1..] {
            [base_url, city] => search(&config, base_url, city).await,
            _ => Err(AppError::BadRequest(USAGE.to_string())),
        },
        Some(_) => Err(AppError::BadRequest(USAGE.to_string())),
    }
}

async fn serve(config: &Config) -> Result<(), AppError> {
    let shared_state = Arc::new(state::AppState::new(config.event_buffer_size));
    let app = api::rest::router(shared_state);

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn track(
    config: &Config,
    base_url: &str,
    order_id: Uuid,
    shop_order_id: Uuid,
) -> Result<(), AppError> {
    let gateway = Arc::new(HttpGateway::new(base_url).map_err(|err| AppError::Internal(err.to_string()))?);
    let poller = TrackingPoller::new(gateway).with_interval(config.tracking_poll_interval);

    let handle = poller.subscribe(TrackingTarget::new(order_id, shop_order_id), |update| {
        match update {
            TrackingUpdate::Status {
                status, courier_id, ..
            } => tracing::info!(status = %status, courier_id = ?courier_id, "status"),
            TrackingUpdate::Location {
                sample,
                distance_km,
                ..
            } => tracing::info!(
                lat = sample.latitude,
                lng = sample.longitude,
                distance_km = %format!("{distance_km:.2}"),
                "courier moved"
            ),
            TrackingUpdate::Unavailable { reason, .. } => {
                tracing::warn!(reason = %reason, "tracking unavailable, still retrying")
            }
        }
    });

    shutdown_signal().await;
    handle.unsubscribe();
    Ok(())
}

async fn search(config: &Config, base_url: &str, city: &str) -> Result<(), AppError> {
    let gateway = Arc::new(HttpGateway::new(base_url).map_err(|err| AppError::Internal(err.to_string()))?);
    let debouncer = SearchDebouncer::with_quiet_period(gateway, config.search_debounce);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = shutdown_signal() => break,
        };
        let Some(query) = line.map_err(|err| AppError::Internal(format!("stdin: {err}")))? else {
            break;
        };

        debouncer.schedule_search(city, &query, |result| match result {
            SearchResult::Items(items) => {
                let names: Vec<&str> = items.iter().map(|item| item.name.as_str()).collect();
                tracing::info!(count = items.len(), items = ?names, "search results");
            }
            SearchResult::Cleared => tracing::info!("search cleared"),
        });
    }

    Ok(())
}

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|err| AppError::BadRequest(format!("invalid id {raw}: {err}")))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
