//! The gateway facade: every operation the host calls.
//!
//! Remote work goes through [`OrangepayRestClient`]; order side effects go
//! through the host traits. Nothing here panics or lets an error escape
//! untyped. Each operation returns a result whose error carries the cause.

use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::host::{Order, OrderId, OrderStore, Storefront};
use crate::orangepay::errors::{ApiError, WebhookError};
use crate::orangepay::log::RequestLog;
use crate::orangepay::rest::{Checkout, OrangepayRestClient};
use crate::orangepay::webhook::{self, WebhookAck};
use crate::orangepay::{http_client, GATEWAY_ID, WEBHOOK_HOOK};
use crate::settings::GatewaySettings;

// ASCII digits only: no sign, no exponent, optional fraction.
static REFUND_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+(\.[0-9]+)?$").expect("valid refund amount pattern"));

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid gateway configuration: {0}")]
    Config(#[source] ApiError),
    #[error("Orangepay - Could not initialize transaction.")]
    TransactionInit(#[source] ApiError),
    #[error("Refund failed: refunds are disabled in test mode.")]
    RefundsDisabled,
    #[error("Refund failed: {0:?} is not a valid amount.")]
    InvalidRefundAmount(String),
    #[error("Refund failed: order {0} not found.")]
    OrderNotFound(OrderId),
    #[error("Orangepay - Refund failed.")]
    RefundFailed(#[source] ApiError),
    #[error("host failure: {0}")]
    Host(#[source] anyhow::Error),
}

/// Host services the gateway works against.
#[derive(Clone)]
pub struct HostServices {
    pub orders: Arc<dyn OrderStore>,
    pub storefront: Arc<dyn Storefront>,
}

impl HostServices {
    /// Both services from one host object.
    pub fn from_host<H>(host: Arc<H>) -> Self
    where
        H: OrderStore + Storefront + 'static,
    {
        Self {
            orders: host.clone(),
            storefront: host,
        }
    }
}

/// Redirect instruction for the checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentRedirect {
    pub result: &'static str,
    pub redirect: Url,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundOutcome {
    pub refund_id: String,
    pub amount: Decimal,
}

/// What the webhook endpoint writes back. The notifier should not parse it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookResponse {
    Accepted,
    Rejected,
}

impl WebhookResponse {
    pub fn body(&self) -> &'static str {
        match self {
            WebhookResponse::Accepted => "",
            WebhookResponse::Rejected => "-1",
        }
    }
}

pub struct Gateway {
    settings: Arc<GatewaySettings>,
    rest: OrangepayRestClient,
    orders: Arc<dyn OrderStore>,
    storefront: Arc<dyn Storefront>,
    log: RequestLog,
    enabled: bool,
}

impl Gateway {
    pub fn new(settings: GatewaySettings, host: HostServices) -> Result<Self, GatewayError> {
        let settings = Arc::new(settings);
        let log = RequestLog::new(settings.debug);
        let notify_url = host.storefront.api_request_url(WEBHOOK_HOOK);
        let http = http_client().map_err(GatewayError::Config)?;
        let rest = OrangepayRestClient::new(http, Arc::clone(&settings), notify_url, log)
            .map_err(GatewayError::Config)?;

        let mut gateway = Self {
            enabled: settings.enabled,
            settings,
            rest,
            orders: host.orders,
            storefront: host.storefront,
            log,
        };
        if gateway.enabled && !gateway.rest.is_configured() {
            warn!("Orangepay API URL not configured; gateway disabled");
            gateway.enabled = false;
        }
        if gateway.enabled && !gateway.is_available() {
            warn!(
                currency = %gateway.storefront.currency(),
                "Store currency not supported by Orangepay; gateway disabled"
            );
            gateway.enabled = false;
        }
        Ok(gateway)
    }

    pub fn id(&self) -> &'static str {
        GATEWAY_ID
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    pub fn title(&self) -> &str {
        &self.settings.title
    }

    pub fn description(&self) -> &str {
        &self.settings.description
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn request_log(&self) -> RequestLog {
        self.log
    }

    pub fn notify_url(&self) -> &Url {
        self.rest.notify_url()
    }

    /// True when the store's active currency is one Orangepay settles in.
    pub fn is_available(&self) -> bool {
        self.settings.supports_currency(&self.storefront.currency())
    }

    /// Notice for the admin settings screen, if the gateway cannot be used.
    pub fn admin_notice(&self) -> Option<&'static str> {
        (!self.is_available())
            .then_some("Gateway disabled: Orangepay does not support your store currency.")
    }

    pub async fn initiate_payment(&self, order: &Order) -> Result<PaymentRedirect, GatewayError> {
        let checkout = Checkout {
            currency: self.storefront.currency(),
            return_url: self.storefront.return_url(order),
            cancel_url: self.storefront.cancel_order_url(order),
        };
        let request = self
            .storefront
            .filter_charge_request(self.rest.charge_request(order, &checkout), order);

        let redirect = self.rest.create_charge(order, &request).await.map_err(|e| {
            warn!(order_id = %order.id, cause = e.kind(), error = %e, "Could not initialize transaction");
            GatewayError::TransactionInit(e)
        })?;

        // The charge exists upstream; a cart failure must not hide the redirect.
        if let Err(e) = self.storefront.empty_cart().await {
            warn!(order_id = %order.id, error = %e, "Failed to empty cart after charge creation");
        }
        info!(order_id = %order.id, "Redirecting to Orangepay");
        Ok(PaymentRedirect {
            result: "success",
            redirect,
        })
    }

    /// Refunds are switched off in test mode, whatever the order's state.
    pub fn can_refund(&self, _order: &Order) -> bool {
        !self.settings.testmode
    }

    pub async fn process_refund(
        &self,
        order_id: OrderId,
        amount: &str,
        reason: &str,
    ) -> Result<RefundOutcome, GatewayError> {
        let order = self
            .orders
            .order(order_id)
            .await
            .map_err(GatewayError::Host)?
            .ok_or(GatewayError::OrderNotFound(order_id))?;

        if !self.can_refund(&order) {
            return Err(GatewayError::RefundsDisabled);
        }
        let value = parse_refund_amount(amount)?;

        let refund_id = self.rest.create_refund(&order, value).await.map_err(|e| {
            warn!(order_id = %order_id, cause = e.kind(), error = %e, "Refund failed");
            GatewayError::RefundFailed(e)
        })?;

        self.orders
            .add_note(order_id, &format!("Refunded {amount} - Refund ID: {refund_id}"))
            .await
            .map_err(GatewayError::Host)?;
        info!(order_id = %order_id, refund_id = %refund_id, reason = %reason, "Refund created");

        Ok(RefundOutcome {
            refund_id,
            amount: value,
        })
    }

    /// Webhook entry point. Every rejection collapses to the `-1` body.
    pub async fn receive_webhook(&self, body: &[u8]) -> WebhookResponse {
        match self.handle_webhook(body).await {
            Ok(_) => WebhookResponse::Accepted,
            Err(e) => {
                warn!(error = %e, "Webhook rejected");
                WebhookResponse::Rejected
            }
        }
    }

    /// Same as [`Gateway::receive_webhook`] but keeps the rejection cause.
    pub async fn handle_webhook(&self, body: &[u8]) -> Result<WebhookAck, WebhookError> {
        webhook::handle_webhook(body, &self.rest, self.orders.as_ref()).await
    }
}

fn parse_refund_amount(amount: &str) -> Result<Decimal, GatewayError> {
    if !REFUND_AMOUNT.is_match(amount) {
        return Err(GatewayError::InvalidRefundAmount(amount.to_string()));
    }
    Decimal::from_str(amount).map_err(|_| GatewayError::InvalidRefundAmount(amount.to_string()))
}
