//! Application startup and lifecycle management.

use crate::config::LedgerConfig;
use crate::handlers::{self, exports, invoices, organizations, payments, quotes};
use crate::services::{init_metrics, LedgerEngine};
use crate::store::{LedgerStore, MemoryStore, PgStore};
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: LedgerConfig,
    pub engine: LedgerEngine,
}

/// Build the HTTP router over `state`.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/organizations", post(organizations::create_organization))
        .route("/organizations/:org_id/quotes", post(quotes::create_quote))
        .route(
            "/organizations/:org_id/quotes/:quote_id",
            get(quotes::get_quote),
        )
        .route(
            "/organizations/:org_id/quotes/:quote_id/send",
            post(quotes::send_quote),
        )
        .route(
            "/organizations/:org_id/quotes/:quote_id/accept",
            post(quotes::accept_quote),
        )
        .route(
            "/organizations/:org_id/quotes/:quote_id/sign",
            post(quotes::sign_quote),
        )
        .route(
            "/organizations/:org_id/quotes/:quote_id/reject",
            post(quotes::reject_quote),
        )
        .route(
            "/organizations/:org_id/quotes/:quote_id/expire",
            post(quotes::expire_quote),
        )
        .route(
            "/organizations/:org_id/quotes/:quote_id/convert",
            post(quotes::convert_quote),
        )
        .route(
            "/organizations/:org_id/invoices",
            post(invoices::create_invoice),
        )
        .route(
            "/organizations/:org_id/invoices/:invoice_id",
            get(invoices::get_invoice),
        )
        .route(
            "/organizations/:org_id/invoices/:invoice_id/send",
            post(invoices::send_invoice),
        )
        .route(
            "/organizations/:org_id/invoices/:invoice_id/cancel",
            post(invoices::cancel_invoice),
        )
        .route(
            "/organizations/:org_id/invoices/:invoice_id/balance",
            get(invoices::invoice_balance),
        )
        .route(
            "/organizations/:org_id/invoices/:invoice_id/payments",
            post(payments::record_payment).get(payments::list_payments),
        )
        .route(
            "/organizations/:org_id/payments/:payment_id",
            delete(payments::reverse_payment),
        )
        .route(
            "/organizations/:org_id/exports/ledger",
            get(exports::ledger_export),
        );

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        .merge(api)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application, connecting to PostgreSQL when `DATABASE_URL` is set.
    pub async fn build(config: LedgerConfig) -> Result<Self, AppError> {
        init_metrics();

        let store: Arc<dyn LedgerStore> = match &config.database {
            Some(database) => {
                let store = PgStore::connect(
                    &database.url,
                    database.max_connections,
                    database.min_connections,
                )
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                    AppError::from(e)
                })?;

                store.run_migrations().await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to run migrations");
                    AppError::from(e)
                })?;
                Arc::new(store)
            }
            None => {
                tracing::warn!("DATABASE_URL not set - using the in-memory store");
                Arc::new(MemoryStore::new())
            }
        };

        Self::with_store(config, store).await
    }

    /// Build the application over an existing store.
    pub async fn with_store(
        config: LedgerConfig,
        store: Arc<dyn LedgerStore>,
    ) -> Result<Self, AppError> {
        init_metrics();

        let engine = LedgerEngine::new(store, config.engine.clone(), config.export.clone());
        let state = AppState {
            config: config.clone(),
            engine,
        };

        let ip = config.common.host.parse().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!(
                "Invalid host '{}': {}",
                config.common.host,
                e
            ))
        })?;
        let http_addr = SocketAddr::new(ip, config.common.port);
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(http_port = http_port, "Ledger engine listener bound");

        Ok(Self {
            http_port,
            http_listener,
            state,
        })
    }

    /// Get the HTTP port the application is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn engine(&self) -> &LedgerEngine {
        &self.state.engine
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);

        tracing::info!(
            service = "ledger-engine",
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            "Service ready to accept connections"
        );

        axum::serve(self.http_listener, router).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
