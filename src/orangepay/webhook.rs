// Orangepay webhook handling: locate the order, re-fetch the charge, settle

use tracing::{debug, info, instrument, warn};

use crate::host::{Order, OrderId, OrderStatus, OrderStore};
use crate::orangepay::errors::WebhookError;
use crate::orangepay::rest::OrangepayRestClient;
use crate::orangepay::types::Envelope;

/// What a successful notification did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookAck {
    pub order_id: OrderId,
    pub transaction_id: String,
}

/// Reconcile one notification with the local order.
///
/// The payload only locates the order. Settlement is decided by a fresh
/// `GET /charges/{key}`, and only a `pending` order is ever touched. No
/// signature is checked.
#[instrument(skip(payload, rest, orders))]
pub async fn handle_webhook(
    payload: &[u8],
    rest: &OrangepayRestClient,
    orders: &dyn OrderStore,
) -> Result<WebhookAck, WebhookError> {
    let envelope: Envelope = serde_json::from_slice(payload)
        .map_err(|e| WebhookError::MalformedPayload(format!("JSON parse error: {e}")))?;
    let (reference, notified_charge_id) = envelope
        .charge_reference()
        .map_err(WebhookError::MissingReference)?;

    let order = find_order(orders, &reference).await?;
    if order.status != OrderStatus::Pending {
        return Err(WebhookError::NotPending {
            order_id: order.id.to_string(),
            status: order.status.to_string(),
        });
    }

    let charge = rest
        .fetch_charge(&order.key)
        .await
        .map_err(WebhookError::ChargeLookup)?;
    if !charge.is_successful() {
        return Err(WebhookError::NotSuccessful(charge.status().map(str::to_string)));
    }

    let transaction_id = notified_charge_id.or(charge.id).unwrap_or_default();
    settle(orders, &order, &transaction_id).await?;

    info!(order_id = %order.id, transaction_id = %transaction_id, "Order paid");
    Ok(WebhookAck {
        order_id: order.id,
        transaction_id,
    })
}

async fn find_order(orders: &dyn OrderStore, key: &str) -> Result<Order, WebhookError> {
    let id = orders
        .order_id_by_key(key)
        .await
        .map_err(WebhookError::Host)?
        .ok_or_else(|| WebhookError::UnknownOrder(key.to_string()))?;
    orders
        .order(id)
        .await
        .map_err(WebhookError::Host)?
        .ok_or_else(|| WebhookError::UnknownOrder(key.to_string()))
}

// The status swap is the commit point: a second notification racing this one
// loses the compare-and-set and leaves notes and stock alone. Once the swap is
// won the order is paid; a failing note or stock call is logged, not undone.
async fn settle(orders: &dyn OrderStore, order: &Order, transaction_id: &str) -> Result<(), WebhookError> {
    let won = orders
        .compare_and_set_status(order.id, OrderStatus::Pending, OrderStatus::Paid)
        .await
        .map_err(WebhookError::Host)?;
    if !won {
        debug!(order_id = %order.id, "lost settlement race");
        return Err(WebhookError::AlreadySettled(order.id.to_string()));
    }

    if let Err(e) = orders
        .add_note(order.id, &format!("Transaction has been paid - ID: {transaction_id}"))
        .await
    {
        warn!(order_id = %order.id, error = %e, "Failed to record payment note");
    }
    if let Err(e) = orders.reduce_stock(order.id).await {
        warn!(order_id = %order.id, error = %e, "Failed to reduce stock for paid order");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::MemoryHost;
    use crate::orangepay::{http_client, log::RequestLog};
    use crate::settings::GatewaySettings;
    use crate::test_support::{MockApi, Reply};
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::sync::Arc;
    use url::Url;

    const PAID_NOTICE: &str =
        r#"{"data":{"charge":{"id":"c1","attributes":{"reference_id":"ORD-1"}}}}"#;

    async fn fixture(status: OrderStatus) -> (MockApi, OrangepayRestClient, MemoryHost) {
        let api = MockApi::start().await;
        let settings = GatewaySettings {
            api_url: api.base_url(),
            ..Default::default()
        };
        let rest = OrangepayRestClient::new(
            http_client().unwrap(),
            Arc::new(settings),
            Url::parse("https://shop.example/orangepay/webhook").unwrap(),
            RequestLog::disabled(),
        )
        .unwrap();
        let host = MemoryHost::new(Url::parse("https://shop.example").unwrap(), "EUR");
        host.insert(Order {
            id: OrderId(1),
            key: "ORD-1".into(),
            number: "1".into(),
            status,
            total: Decimal::new(1000, 2),
            billing_email: "buyer@example.com".into(),
        })
        .await;
        (api, rest, host)
    }

    async fn charge_status(api: &MockApi, status: &str) {
        api.reply(
            "GET /charges/ORD-1",
            Reply::ok(json!({"data": {"charge": {"id": "c1", "attributes": {"status": status}}}})),
        )
        .await;
    }

    #[tokio::test]
    async fn successful_charge_marks_order_paid() {
        let (api, rest, host) = fixture(OrderStatus::Pending).await;
        charge_status(&api, "successful").await;

        let ack = handle_webhook(PAID_NOTICE.as_bytes(), &rest, &host).await.unwrap();

        assert_eq!(ack.transaction_id, "c1");
        assert_eq!(host.status(OrderId(1)).await, Some(OrderStatus::Paid));
        let notes = host.notes(OrderId(1)).await;
        assert_eq!(notes.len(), 1);
        assert!(notes[0].contains("c1"));
        assert_eq!(host.stock_reductions(OrderId(1)).await, 1);
    }

    #[tokio::test]
    async fn pending_charge_leaves_order_alone() {
        let (api, rest, host) = fixture(OrderStatus::Pending).await;
        charge_status(&api, "pending").await;

        let err = handle_webhook(PAID_NOTICE.as_bytes(), &rest, &host).await.unwrap_err();

        assert!(matches!(err, WebhookError::NotSuccessful(Some(ref s)) if s == "pending"));
        assert_eq!(err.response_body(), "-1");
        assert_eq!(host.status(OrderId(1)).await, Some(OrderStatus::Pending));
        assert!(host.notes(OrderId(1)).await.is_empty());
        assert_eq!(host.stock_reductions(OrderId(1)).await, 0);
    }

    #[tokio::test]
    async fn settled_orders_are_not_refetched() {
        let (api, rest, host) = fixture(OrderStatus::Cancelled).await;
        charge_status(&api, "successful").await;

        let err = handle_webhook(PAID_NOTICE.as_bytes(), &rest, &host).await.unwrap_err();

        assert!(matches!(err, WebhookError::NotPending { .. }));
        assert!(api.requests().await.is_empty());
        assert_eq!(host.status(OrderId(1)).await, Some(OrderStatus::Cancelled));
    }

    #[tokio::test]
    async fn rejects_garbage_and_unknown_orders() {
        let (api, rest, host) = fixture(OrderStatus::Pending).await;

        let err = handle_webhook(b"not json", &rest, &host).await.unwrap_err();
        assert!(matches!(err, WebhookError::MalformedPayload(_)));

        let err = handle_webhook(br#"{"data":{"charge":{"id":"c1"}}}"#, &rest, &host)
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::MissingReference(_)));

        let other = r#"{"data":{"charge":{"id":"c2","attributes":{"reference_id":"ORD-404"}}}}"#;
        let err = handle_webhook(other.as_bytes(), &rest, &host).await.unwrap_err();
        assert!(matches!(err, WebhookError::UnknownOrder(ref k) if k == "ORD-404"));

        assert!(api.requests().await.is_empty());
        assert_eq!(host.status(OrderId(1)).await, Some(OrderStatus::Pending));
    }

    #[tokio::test]
    async fn failed_lookup_is_rejected() {
        let (_api, rest, host) = fixture(OrderStatus::Pending).await;
        // No canned reply: the mock answers 404.
        let err = handle_webhook(PAID_NOTICE.as_bytes(), &rest, &host).await.unwrap_err();
        assert!(matches!(err, WebhookError::ChargeLookup(_)));
        assert_eq!(host.status(OrderId(1)).await, Some(OrderStatus::Pending));
    }

    #[tokio::test]
    async fn duplicate_notification_settles_once() {
        let (api, rest, host) = fixture(OrderStatus::Pending).await;
        charge_status(&api, "successful").await;

        let (a, b) = tokio::join!(
            handle_webhook(PAID_NOTICE.as_bytes(), &rest, &host),
            handle_webhook(PAID_NOTICE.as_bytes(), &rest, &host),
        );

        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert_eq!(host.notes(OrderId(1)).await.len(), 1);
        assert_eq!(host.stock_reductions(OrderId(1)).await, 1);
    }

    struct NoteFails(MemoryHost);

    #[async_trait::async_trait]
    impl OrderStore for NoteFails {
        async fn order_id_by_key(&self, key: &str) -> anyhow::Result<Option<OrderId>> {
            self.0.order_id_by_key(key).await
        }
        async fn order(&self, id: OrderId) -> anyhow::Result<Option<Order>> {
            self.0.order(id).await
        }
        async fn compare_and_set_status(
            &self,
            id: OrderId,
            from: OrderStatus,
            to: OrderStatus,
        ) -> anyhow::Result<bool> {
            self.0.compare_and_set_status(id, from, to).await
        }
        async fn add_note(&self, _id: OrderId, _note: &str) -> anyhow::Result<()> {
            anyhow::bail!("db down")
        }
        async fn reduce_stock(&self, id: OrderId) -> anyhow::Result<()> {
            self.0.reduce_stock(id).await
        }
    }

    #[tokio::test]
    async fn note_failure_after_settlement_still_acks() {
        let (api, rest, host) = fixture(OrderStatus::Pending).await;
        charge_status(&api, "successful").await;
        let host = NoteFails(host);

        let ack = handle_webhook(PAID_NOTICE.as_bytes(), &rest, &host).await.unwrap();

        assert_eq!(ack.order_id, OrderId(1));
        assert_eq!(host.0.status(OrderId(1)).await, Some(OrderStatus::Paid));
        assert_eq!(host.0.stock_reductions(OrderId(1)).await, 1);
    }
}
