// HTTP endpoint for Orangepay payment notifications

use crate::gateway::{Gateway, WebhookResponse};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

pub const WEBHOOK_PATH: &str = "/orangepay/webhook";

#[derive(Clone)]
pub struct WebhookState {
    pub gateway: Arc<Gateway>,
}

pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(handle_orangepay_webhook))
        .route("/health", get(health_check))
        .with_state(WebhookState { gateway })
}

pub async fn run_webhook_server(port: u16, gateway: Arc<Gateway>) -> anyhow::Result<()> {
    let app = router(gateway);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting webhook HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

// Always 200: the body alone tells the notifier whether it was accepted.
async fn handle_orangepay_webhook(
    State(state): State<WebhookState>,
    body: Bytes,
) -> impl IntoResponse {
    let response = state.gateway.receive_webhook(&body).await;
    if response == WebhookResponse::Accepted {
        info!("Webhook processed successfully");
    }
    (StatusCode::OK, response.body())
}
