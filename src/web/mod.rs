//! Web server module.

mod cache;
mod handlers;

pub use cache::*;
pub use handlers::*;

use crate::config::{LookbackWindow, ServerConfig};
use crate::provider::{AccountHealth, FleetPoll, FleetPoller};

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub poller: Arc<FleetPoller>,
    pub default_lookback: LookbackWindow,
    pub fleet_cache: Arc<TtlCache<LookbackWindow, FleetPoll>>,
    pub account_cache: Arc<TtlCache<(String, LookbackWindow), AccountHealth>>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        poller: Arc<FleetPoller>,
        default_lookback: LookbackWindow,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            config,
            poller,
            default_lookback,
            fleet_cache: Arc::new(TtlCache::new(cache_ttl)),
            account_cache: Arc::new(TtlCache::new(cache_ttl)),
        }
    }

    /// Fleet poll for `days`, served from the cache while fresh.
    pub async fn fleet(&self, days: LookbackWindow) -> FleetPoll {
        if let Some(fleet) = self.fleet_cache.get(&days).await {
            return fleet;
        }
        let fleet = self.poller.poll_fleet(days).await;
        self.fleet_cache.insert(days, fleet.clone()).await;
        fleet
    }

    /// Single-account poll, or `None` for an unknown account.
    pub async fn account(&self, name: &str, days: LookbackWindow) -> Option<AccountHealth> {
        let account = self.poller.registry().get(name)?;
        let key = (name.to_string(), days);
        if let Some(health) = self.account_cache.get(&key).await {
            return Some(health);
        }
        let health = self.poller.poll_account(account, days).await;
        self.account_cache.insert(key, health.clone()).await;
        Some(health)
    }

    pub async fn clear_cache(&self) {
        self.fleet_cache.clear().await;
        self.account_cache.clear().await;
    }
}

/// Dashboard web server.
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with all routes.
    pub fn routes(&self) -> Router {
        router(self.state.clone())
    }

    /// Start the server on the configured port.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

    Router::new()
        // Pages
        .route("/", get(handlers::handle_dashboard))
        .route("/account/{name}", get(handlers::handle_account_page))
        // API endpoints
        .route("/api/fleet", get(handlers::handle_get_fleet))
        .route("/api/accounts", get(handlers::handle_get_accounts))
        .route("/api/accounts/{name}", get(handlers::handle_get_account))
        .route("/api/refresh", post(handlers::handle_refresh))
        // Static assets
        .route("/favicon.ico", get(handlers::handle_favicon))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
