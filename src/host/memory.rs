// In-memory host used by the sandbox binary and tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use super::{Order, OrderId, OrderStatus, OrderStore, Storefront};

struct StoredOrder {
    order: Order,
    notes: Vec<String>,
    stock_reductions: u32,
}

pub struct MemoryHost {
    orders: RwLock<HashMap<OrderId, StoredOrder>>,
    currency: String,
    base_url: Url,
    cart_clears: AtomicUsize,
}

impl MemoryHost {
    pub fn new(base_url: Url, currency: impl Into<String>) -> Self {
        Self {
            orders: RwLock::new(HashMap::new()),
            currency: currency.into(),
            base_url,
            cart_clears: AtomicUsize::new(0),
        }
    }

    pub async fn insert(&self, order: Order) {
        let mut orders = self.orders.write().await;
        orders.insert(
            order.id,
            StoredOrder {
                order,
                notes: Vec::new(),
                stock_reductions: 0,
            },
        );
    }

    pub async fn status(&self, id: OrderId) -> Option<OrderStatus> {
        let orders = self.orders.read().await;
        orders.get(&id).map(|s| s.order.status.clone())
    }

    pub async fn notes(&self, id: OrderId) -> Vec<String> {
        let orders = self.orders.read().await;
        orders.get(&id).map(|s| s.notes.clone()).unwrap_or_default()
    }

    pub async fn stock_reductions(&self, id: OrderId) -> u32 {
        let orders = self.orders.read().await;
        orders.get(&id).map_or(0, |s| s.stock_reductions)
    }

    pub fn cart_clears(&self) -> usize {
        self.cart_clears.load(Ordering::SeqCst)
    }

    fn url_with_path(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(path);
        url
    }
}

#[async_trait]
impl OrderStore for MemoryHost {
    async fn order_id_by_key(&self, key: &str) -> anyhow::Result<Option<OrderId>> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .find(|s| s.order.key == key)
            .map(|s| s.order.id))
    }

    async fn order(&self, id: OrderId) -> anyhow::Result<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.get(&id).map(|s| s.order.clone()))
    }

    async fn compare_and_set_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> anyhow::Result<bool> {
        let mut orders = self.orders.write().await;
        let stored = orders
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("order {id} not found"))?;
        if stored.order.status != from {
            debug!(order_id = %id, current = %stored.order.status, expected = %from, "status changed underneath");
            return Ok(false);
        }
        stored.order.status = to;
        Ok(true)
    }

    async fn add_note(&self, id: OrderId, note: &str) -> anyhow::Result<()> {
        let mut orders = self.orders.write().await;
        let stored = orders
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("order {id} not found"))?;
        stored.notes.push(note.to_string());
        Ok(())
    }

    async fn reduce_stock(&self, id: OrderId) -> anyhow::Result<()> {
        let mut orders = self.orders.write().await;
        let stored = orders
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("order {id} not found"))?;
        stored.stock_reductions += 1;
        Ok(())
    }
}

#[async_trait]
impl Storefront for MemoryHost {
    fn currency(&self) -> String {
        self.currency.clone()
    }

    async fn empty_cart(&self) -> anyhow::Result<()> {
        self.cart_clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    // Hooks are routed as path segments: `orangepay_webhook` -> `/orangepay/webhook`.
    fn api_request_url(&self, hook: &str) -> Url {
        self.url_with_path(&format!("/{}", hook.replace('_', "/")))
    }

    fn return_url(&self, order: &Order) -> Url {
        let mut url = self.url_with_path(&format!("/checkout/order-received/{}/", order.id));
        url.query_pairs_mut().append_pair("key", &order.key);
        url
    }

    fn cancel_order_url(&self, order: &Order) -> Url {
        let mut url = self.url_with_path("/cart/");
        url.query_pairs_mut()
            .append_pair("cancel_order", "true")
            .append_pair("order", &order.key)
            .append_pair("order_id", &order.id.to_string());
        url
    }
}
