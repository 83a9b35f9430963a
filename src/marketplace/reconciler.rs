//! Turns inbound marketplace order notifications into internal sales
//! orders and stock decrements.
//!
//! Known gap: the pipeline carries no deduplication key tied to the
//! external order id. If a worker commits the sales order but dies before
//! acknowledging the queue message, redelivery creates a second sales
//! order and double-decrements stock. Closing this needs an idempotency
//! table keyed by external order id or exactly-once queue semantics.

use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::product::{self, Entity as ProductEntity};
use crate::errors::ServiceError;
use crate::marketplace::client::MarketplaceApi;
use crate::message_queue::MessageQueue;
use crate::services::fulfillment::{CreateSalesOrderInput, FulfillmentService, SalesOrderItemInput};
use crate::services::integrations::IntegrationService;

/// Platform identifier for credential lookups.
pub const PLATFORM: &str = "mercadolibre";

const ORDER_TOPICS: &[&str] = &["orders", "orders_v2"];

/// Inbound webhook notification as published onto the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceNotification {
    #[serde(rename = "_id", default)]
    pub id: i64,
    /// Resource locator, e.g. "/orders/123456789"
    pub resource: String,
    /// The marketplace's id for the seller account
    pub user_id: i64,
    pub topic: String,
    #[serde(default)]
    pub application_id: i64,
    #[serde(default)]
    pub attempts: i32,
    #[serde(default)]
    pub sent: Option<String>,
    #[serde(default)]
    pub received: Option<String>,
}

/// Terminal outcome for one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processed (or deliberately skipped); remove from the queue.
    Ack,
    /// Transient failure; redeliver.
    Requeue,
    /// Permanently unprocessable; discard without redelivery.
    Drop,
}

/// Consumes marketplace notifications and reconciles them into sales
/// orders through the fulfillment engine.
#[derive(Clone)]
pub struct Reconciler {
    db_pool: Arc<DbPool>,
    integrations: IntegrationService,
    fulfillment: FulfillmentService,
    marketplace: Arc<dyn MarketplaceApi>,
}

impl Reconciler {
    pub fn new(
        db_pool: Arc<DbPool>,
        integrations: IntegrationService,
        fulfillment: FulfillmentService,
        marketplace: Arc<dyn MarketplaceApi>,
    ) -> Self {
        Self {
            db_pool,
            integrations,
            fulfillment,
            marketplace,
        }
    }

    /// Runs the full state machine for one notification payload.
    #[instrument(skip(self, payload))]
    pub async fn process_notification(&self, payload: &serde_json::Value) -> Disposition {
        // Malformed payloads can never succeed; drop, don't requeue.
        let notification: MarketplaceNotification =
            match serde_json::from_value(payload.clone()) {
                Ok(n) => n,
                Err(e) => {
                    warn!(error = %e, "unparseable notification payload, dropping");
                    return Disposition::Drop;
                }
            };

        // 1. Topic filter: everything that isn't an order notification is
        //    acknowledged and discarded immediately.
        if !ORDER_TOPICS.contains(&notification.topic.as_str()) {
            debug!(topic = %notification.topic, "ignoring non-order topic");
            return Disposition::Ack;
        }

        // 2. External order id from the resource locator.
        let order_id = match extract_order_id(&notification.resource) {
            Some(id) => id,
            None => {
                warn!(resource = %notification.resource, "malformed resource locator, dropping");
                return Disposition::Drop;
            }
        };

        // 3. Tenant resolution. Integration setup can race with webhook
        //    delivery, so a missing mapping is transient, not fatal.
        let external_user_id = notification.user_id.to_string();
        let tenant_id = match self
            .integrations
            .resolve_tenant(&external_user_id, PLATFORM)
            .await
        {
            Ok(tenant_id) => tenant_id,
            Err(ServiceError::NotFound(_)) => {
                warn!(
                    external_user_id = %external_user_id,
                    "no tenant mapped for external user yet, requeueing"
                );
                return Disposition::Requeue;
            }
            Err(e) => {
                warn!(error = %e, "tenant resolution failed, requeueing");
                return Disposition::Requeue;
            }
        };

        // 4. Stored credentials, decrypted.
        let integration = match self.integrations.get_for_tenant(tenant_id, PLATFORM).await {
            Ok(integration) => integration,
            Err(e) => {
                warn!(tenant_id = %tenant_id, error = %e, "credential lookup failed, requeueing");
                return Disposition::Requeue;
            }
        };

        // 5. Full order detail from the marketplace; network and 5xx
        //    failures are transient.
        let order = match self
            .marketplace
            .get_order(order_id, &integration.access_token)
            .await
        {
            Ok(order) => order,
            Err(e) => {
                warn!(order_id, error = %e, "marketplace fetch failed, requeueing");
                return Disposition::Requeue;
            }
        };

        // 6. Status filter: skipping a cancelled or unpaid order is not an
        //    error.
        if !order.is_processable() {
            info!(order_id, status = %order.status, "order status not processable, skipping");
            return Disposition::Ack;
        }

        // 7. Map lines onto the tenant catalog by SKU.
        let items = match self.map_order_items(tenant_id, &order).await {
            Ok(items) => items,
            Err(e) => {
                warn!(order_id, error = %e, "SKU mapping failed, requeueing");
                return Disposition::Requeue;
            }
        };

        // 8. Nothing matched: nothing useful can be recorded.
        if items.is_empty() {
            warn!(order_id, tenant_id = %tenant_id, "no order lines matched the catalog, requeueing");
            return Disposition::Requeue;
        }

        // 9. Record the sale.
        let input = CreateSalesOrderInput {
            customer_id: None,
            customer_name: Some(order.buyer_label()),
            items,
        };
        match self.fulfillment.create_sales_order(tenant_id, input).await {
            Ok(response) => {
                info!(
                    order_id,
                    sales_order_id = %response.id,
                    tenant_id = %tenant_id,
                    total = %response.total_amount,
                    "marketplace sale reconciled"
                );
                Disposition::Ack
            }
            Err(e) => {
                warn!(order_id, tenant_id = %tenant_id, error = %e, "sales order creation failed, requeueing");
                Disposition::Requeue
            }
        }
    }

    /// Maps marketplace order lines to internal products by SKU within the
    /// tenant's catalog. Unmatched lines are dropped individually with a
    /// warning, not treated as fatal.
    async fn map_order_items(
        &self,
        tenant_id: Uuid,
        order: &crate::marketplace::client::MarketplaceOrder,
    ) -> Result<Vec<SalesOrderItemInput>, ServiceError> {
        let db = &*self.db_pool;
        let mut items = Vec::new();

        for line in &order.order_items {
            let sku = match line.item.seller_sku.as_deref() {
                Some(sku) if !sku.is_empty() => sku,
                _ => {
                    warn!(item_id = %line.item.id, title = %line.item.title, "line has no seller SKU, skipping");
                    continue;
                }
            };

            let product = ProductEntity::find()
                .filter(product::Column::Sku.eq(sku))
                .filter(product::Column::TenantId.eq(tenant_id))
                .one(db)
                .await?;

            match product {
                Some(product) => {
                    debug!(sku = %sku, product_id = %product.id, quantity = line.quantity, "line mapped");
                    items.push(SalesOrderItemInput {
                        product_id: product.id,
                        quantity: line.quantity,
                        unit_price: line.unit_price,
                    });
                }
                None => {
                    warn!(sku = %sku, tenant_id = %tenant_id, "no product for SKU, skipping line");
                }
            }
        }

        Ok(items)
    }
}

/// Extracts the numeric order id from a resource locator like
/// "/orders/123456789".
pub fn extract_order_id(resource: &str) -> Option<i64> {
    let parts: Vec<&str> = resource.split('/').collect();
    if parts.len() < 3 {
        return None;
    }
    parts[2].parse::<i64>().ok()
}

/// Consumer loop: one unacknowledged message in flight at a time, the
/// async equivalent of an AMQP prefetch limit of one. Runs until the task
/// is aborted.
pub async fn run_consumer(
    queue: Arc<dyn MessageQueue>,
    topic: String,
    reconciler: Arc<Reconciler>,
    idle_delay: Duration,
) {
    info!(topic = %topic, "marketplace reconciler consumer started");

    loop {
        let message = match queue.consume(&topic).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                tokio::time::sleep(idle_delay).await;
                continue;
            }
            Err(e) => {
                warn!(error = %e, "queue consume failed");
                tokio::time::sleep(idle_delay).await;
                continue;
            }
        };

        let disposition = reconciler.process_notification(&message.payload).await;

        let result = match disposition {
            Disposition::Ack => queue.ack(&message.id).await,
            Disposition::Requeue => queue.nack(&message.id, true).await,
            Disposition::Drop => queue.nack(&message.id, false).await,
        };
        if let Err(e) = result {
            warn!(message_id = %message.id, error = %e, "failed to settle message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_order_id_from_resource() {
        assert_eq!(extract_order_id("/orders/123456789"), Some(123_456_789));
        assert_eq!(extract_order_id("/orders/12/extra"), Some(12));
    }

    #[test]
    fn rejects_malformed_resources() {
        assert_eq!(extract_order_id("/orders"), None);
        assert_eq!(extract_order_id(""), None);
        assert_eq!(extract_order_id("/orders/not-a-number"), None);
    }

    #[test]
    fn notification_deserializes_from_webhook_shape() {
        let payload = serde_json::json!({
            "_id": 101,
            "resource": "/orders/555",
            "user_id": 998877,
            "topic": "orders_v2",
            "application_id": 1,
            "attempts": 1,
            "sent": "2024-01-01T00:00:00Z",
            "received": "2024-01-01T00:00:01Z"
        });
        let n: MarketplaceNotification = serde_json::from_value(payload).unwrap();
        assert_eq!(n.resource, "/orders/555");
        assert_eq!(n.user_id, 998_877);
    }
}
