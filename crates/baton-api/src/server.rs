//! HTTP server configuration and request routing.
//!
//! Requests flow through middleware in order:
//! 1. Request ID generation
//! 2. Request/response logging
//! 3. Timeout enforcement
//! 4. Body size limit
//! 5. Continuation secret check (`/__continue` only)
//! 6. Handler execution
//!
//! # Graceful Shutdown
//!
//! On SIGTERM or CTRL+C the server stops accepting connections and lets
//! in-flight requests finish. Background forwarding windows are not owned by
//! the server; the caller drains them through `Relay::wait_idle`.

use std::{future::Future, net::SocketAddr, time::Duration};

use axum::{
    extract::{DefaultBodyLimit, Request},
    middleware::{self, Next},
    response::Response,
    http::StatusCode,
    routing::{on, post, MethodFilter},
    Router,
};
use baton_delivery::continuation::CONTINUE_PATH;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{handlers, middleware::require_continue_token, AppState};

/// Path the provider calls for verification and event intake.
pub const WEBHOOK_PATH: &str = "/strava/webhook";

/// Creates the Axum router with all routes and middleware.
///
/// Sets up:
/// - `GET`/`POST` on the webhook path (`HEAD` is not answered)
/// - `POST` on the continuation path behind the shared-secret check
/// - 404 `{"Not found": null}` for everything else
/// - Request tracing, timeout and body limit
pub fn create_router(state: AppState) -> Router {
    let webhook_routes = Router::new().route(
        WEBHOOK_PATH,
        on(MethodFilter::HEAD, handlers::not_found)
            .get(handlers::verify_subscription)
            .post(handlers::accept_event)
            .fallback(handlers::not_found),
    );

    let continuation_routes = Router::new().route(
        CONTINUE_PATH,
        post(handlers::continue_relay)
            .route_layer(middleware::from_fn_with_state(state.clone(), require_continue_token))
            .fallback(handlers::not_found),
    );

    let request_timeout = Duration::from_secs(state.config.request_timeout);
    let body_limit = state.config.max_body_bytes;

    Router::new()
        .merge(webhook_routes)
        .merge(continuation_routes)
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(inject_request_id))
        .with_state(state)
}

/// Middleware to inject request ID into all responses.
///
/// Adds X-Request-Id header for correlating provider calls with log lines.
async fn inject_request_id(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();

    let mut req = req;
    req.extensions_mut().insert(request_id.clone());

    let mut response = next.run(req).await;

    if let Ok(header_value) = request_id.parse() {
        response.headers_mut().insert("X-Request-Id", header_value);
    }

    response
}

/// Serves the relay on an already bound listener until `shutdown` resolves.
///
/// # Errors
///
/// Returns `std::io::Error` if the listener fails.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    info!("HTTP server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

    info!("HTTP server stopped gracefully");
    Ok(())
}

/// Starts the HTTP server with graceful shutdown support.
///
/// Binds to `addr` and serves requests until CTRL+C or SIGTERM.
///
/// # Errors
///
/// Returns `std::io::Error` if the port is already in use or the network
/// interface is unavailable.
pub async fn start_server(state: AppState, addr: SocketAddr) -> std::io::Result<()> {
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    serve(listener, state, shutdown_signal()).await
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received CTRL+C, starting graceful shutdown");
        },
        () = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    warn!("Draining in-flight requests before stopping");
}
