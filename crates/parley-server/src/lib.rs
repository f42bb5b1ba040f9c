//! HTTP surface for the Parley agent.
//!
//! Accepts Twilio WhatsApp webhooks, routes each message through the
//! [`LifecycleManager`] and hands the reply to an [`OutboundTransport`].

pub mod error;
pub mod outbound;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use chrono::Utc;
use parley_core::{BucketPolicy, ConversationId, LifecycleManager};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

pub use error::{Result, ServerError};
pub use outbound::{LogTransport, OutboundTransport, TwilioTransport};

const WHATSAPP_PREFIX: &str = "whatsapp:";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub enable_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            enable_logging: true,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    pub fn with_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }
}

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<LifecycleManager>,
    pub transport: Arc<dyn OutboundTransport>,
    pub bucket: BucketPolicy,
}

impl AppState {
    pub fn new(manager: Arc<LifecycleManager>, transport: Arc<dyn OutboundTransport>) -> Self {
        let bucket = manager.config().conversation.bucket;
        Self {
            manager,
            transport,
            bucket,
        }
    }
}

/// Twilio posts inbound messages as `application/x-www-form-urlencoded`.
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "Body")]
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub agent_ready: bool,
    pub timestamp: String,
    pub version: String,
}

/// Sender address without its channel prefix.
pub fn sender_of(from: &str) -> &str {
    let from = from.trim();
    from.strip_prefix(WHATSAPP_PREFIX).unwrap_or(from)
}

pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let router = Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    if config.enable_logging {
        router
            .layer(middleware::from_fn(log_requests))
            .layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

async fn webhook_handler(
    State(state): State<AppState>,
    Form(message): Form<InboundMessage>,
) -> StatusCode {
    let conversation_id = ConversationId::for_sender(sender_of(&message.from), Utc::now(), state.bucket);
    log::info!("Message from {} ({} chars)", conversation_id, message.body.chars().count());

    let reply = state.manager.process(&conversation_id, &message.body).await;

    let transport = state.transport.clone();
    let recipient = message.from;
    tokio::spawn(async move {
        if let Err(e) = transport.send(&recipient, &reply).await {
            log::error!("Failed to deliver reply to {}: {}", recipient, e);
        }
    });

    StatusCode::OK
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.manager.is_ready().await;
    Json(HealthResponse {
        status: if ready { "healthy" } else { "starting" }.to_string(),
        agent_ready: ready,
        timestamp: Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn log_requests(request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    log::debug!("[{}] {} {}", request_id, method, uri);
    let response = next.run(request).await;
    log::info!(
        "[{}] {} {} -> {} in {}ms",
        request_id,
        method,
        uri,
        response.status(),
        start.elapsed().as_millis()
    );
    response
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("Received Ctrl+C, shutting down"),
        _ = terminate => log::info!("Received SIGTERM, shutting down"),
    }
}
