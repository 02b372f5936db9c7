// Orangepay-specific error types

use thiserror::Error;

/// A response envelope lacked a path the caller needs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("response is missing `{0}`")]
pub struct MissingField(pub &'static str);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http error: {0}")]
    Http(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("unexpected response status={status} body={body}")]
    Status { status: u16, body: String },
    #[error(transparent)]
    Missing(#[from] MissingField),
    #[error("invalid endpoint: {0}")]
    Endpoint(String),
}

impl ApiError {
    /// Name of the category, for structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Http(_) => "transport",
            ApiError::Decode(_) => "decode",
            ApiError::Status { .. } => "status",
            ApiError::Missing(_) => "missing_field",
            ApiError::Endpoint(_) => "endpoint",
        }
    }
}

// Webhook rejection paths. Every one of them answers the caller with the
// same sentinel body.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("payload has no charge reference: {0}")]
    MissingReference(MissingField),
    #[error("no order for reference {0}")]
    UnknownOrder(String),
    #[error("order {order_id} is {status}, not pending")]
    NotPending { order_id: String, status: String },
    #[error("charge lookup failed: {0}")]
    ChargeLookup(#[source] ApiError),
    #[error("charge status is {0:?}, not successful")]
    NotSuccessful(Option<String>),
    #[error("order {0} was settled concurrently")]
    AlreadySettled(String),
    #[error("host failure: {0}")]
    Host(#[source] anyhow::Error),
}

impl WebhookError {
    /// Body written back to the notifier on rejection.
    pub fn response_body(&self) -> &'static str {
        "-1"
    }
}
