//! Main Gateway implementation
//!
//! Thin HTTP plumbing over the engine: one chat route that forwards
//! the question to `Engine::process` and returns whatever envelope
//! comes back. The engine never raises, so every chat response is a
//! 200 carrying a `Data`, `Chart`, `Error` or `Unknown` envelope.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use tabletalk_core::{Engine, ResultEnvelope};

use crate::config::GatewayConfig;
use crate::{GatewayError, Result};

/// Gateway state shared across handlers
#[derive(Clone)]
pub struct GatewayState {
    pub config: GatewayConfig,
    pub engine: Arc<Engine>,
}

/// Chat request body
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// Chat response body
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: ResultEnvelope,
}

/// Main Gateway
pub struct Gateway {
    state: Arc<GatewayState>,
}

impl Gateway {
    /// Create a new gateway around an engine
    pub fn new(config: GatewayConfig, engine: Arc<Engine>) -> Self {
        let state = Arc::new(GatewayState { config, engine });
        Self { state }
    }

    /// Get gateway state
    pub fn state(&self) -> Arc<GatewayState> {
        self.state.clone()
    }

    /// Build the Axum router
    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/", get(Self::handle_index))
            .route("/health", get(Self::handle_index))
            .route("/chat", post(Self::handle_chat))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the gateway server
    pub async fn start(&self) -> Result<()> {
        let addr = self.state.config.socket_addr()?;
        let router = self.build_router();

        tracing::info!("Tabletalk gateway starting on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(GatewayError::Io)?;

        axum::serve(listener, router)
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        Ok(())
    }

    async fn handle_index() -> Json<serde_json::Value> {
        Json(serde_json::json!({
            "status": "ok",
            "message": "tabletalk is running",
        }))
    }

    async fn handle_chat(
        State(state): State<Arc<GatewayState>>,
        Json(request): Json<ChatRequest>,
    ) -> Json<ChatResponse> {
        tracing::info!(message = %request.message, "chat request");
        let response = state.engine.process(&request.message).await;
        Json(ChatResponse { response })
    }
}
