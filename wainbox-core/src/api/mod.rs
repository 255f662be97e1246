// File: src/api/mod.rs
//
// HTTP + websocket surface for the inbox frontend and the provider webhook.

pub mod error;
pub mod realtime;
pub mod routes;
pub mod webhook;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use wainbox_common::traits::repository_traits::MessageRepository;

use crate::eventbus::EventBus;
use crate::ingest::IngestionDriver;
use crate::services::MessageService;
use crate::Error;

#[derive(Clone)]
pub struct AppState {
    pub message_service: Arc<MessageService>,
    pub driver: Arc<IngestionDriver>,
    pub event_bus: Arc<EventBus>,
    /// Token Meta must echo in the webhook handshake. `None` rejects all.
    pub verify_token: Option<String>,
}

impl AppState {
    pub fn new(
        repo: Arc<dyn MessageRepository>,
        event_bus: Arc<EventBus>,
        verify_token: Option<String>,
    ) -> Self {
        Self {
            message_service: Arc::new(MessageService::new(repo.clone(), event_bus.clone())),
            driver: Arc::new(IngestionDriver::new(repo, event_bus.clone())),
            event_bus,
            verify_token,
        }
    }
}

fn cors_layer(frontend_url: Option<&str>) -> CorsLayer {
    let origin = match frontend_url.map(HeaderValue::from_str) {
        Some(Ok(v)) => AllowOrigin::exact(v),
        Some(Err(e)) => {
            warn!("Ignoring invalid frontend URL for CORS: {}", e);
            AllowOrigin::any()
        }
        None => AllowOrigin::any(),
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn router(state: AppState, frontend_url: Option<&str>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/messages", post(routes::send_message))
        .route("/api/messages/conversations", get(routes::list_conversations))
        .route("/api/messages/{wa_id}", get(routes::list_messages))
        .route("/webhook", get(webhook::verify).post(webhook::receive))
        .route("/ws", get(realtime::ws_handler))
        .with_state(state)
        .layer(cors_layer(frontend_url))
        .layer(TraceLayer::new_for_http())
}

/// Bind `addr` and serve `app` until `shutdown` resolves.
pub async fn serve<F>(addr: SocketAddr, app: Router, shutdown: F) -> Result<(), Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("API server shut down.");
    Ok(())
}
