// Orangepay provider module

pub mod errors;
pub mod log;
pub mod rest;
pub mod types;
pub mod webhook;

use reqwest::Client;

use self::errors::ApiError;

pub const GATEWAY_ID: &str = "orangepay";

/// Host hook that receives payment notifications.
pub const WEBHOOK_HOOK: &str = "orangepay_webhook";

const USER_AGENT: &str = concat!("orangepay-gateway/", env!("CARGO_PKG_VERSION"));

// Shared reqwest client with rustls. Per-request timeouts are set by the
// REST client since charges and refunds use different budgets.
pub fn http_client() -> Result<Client, ApiError> {
    Client::builder()
        .use_rustls_tls()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ApiError::Http(e.to_string()))
}
