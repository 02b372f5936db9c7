//! Services the gateway borrows from the order-management host.
//!
//! The host owns orders, the cart and URL routing. The gateway only sees the
//! narrow surface below; [`memory::MemoryHost`] is a self-contained
//! implementation used by the sandbox binary and the test suite.

pub mod memory;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::orangepay::types::ChargeRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub u64);

impl From<u64> for OrderId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum OrderStatus {
    Pending,
    Paid,
    Cancelled,
    Refunded,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a host order at the time it was loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub key: String,
    pub number: String,
    pub status: OrderStatus,
    pub total: Decimal,
    pub billing_email: String,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn order_id_by_key(&self, key: &str) -> anyhow::Result<Option<OrderId>>;

    async fn order(&self, id: OrderId) -> anyhow::Result<Option<Order>>;

    /// Moves the order to `to` only if its status is still `from`.
    /// Returns whether the transition happened.
    async fn compare_and_set_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> anyhow::Result<bool>;

    async fn add_note(&self, id: OrderId, note: &str) -> anyhow::Result<()>;

    async fn reduce_stock(&self, id: OrderId) -> anyhow::Result<()>;
}

#[async_trait]
pub trait Storefront: Send + Sync {
    /// ISO 4217 code of the store's active currency.
    fn currency(&self) -> String;

    async fn empty_cart(&self) -> anyhow::Result<()>;

    /// Public URL the host routes to the named API hook.
    fn api_request_url(&self, hook: &str) -> Url;

    /// Thank-you page for a paid order.
    fn return_url(&self, order: &Order) -> Url;

    fn cancel_order_url(&self, order: &Order) -> Url;

    /// Last chance for the host to adjust an outbound charge.
    fn filter_charge_request(&self, request: ChargeRequest, _order: &Order) -> ChargeRequest {
        request
    }
}
