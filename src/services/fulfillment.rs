use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::purchase_order::{self, Entity as PurchaseOrderEntity, PurchaseOrderStatus};
use crate::entities::purchase_order_item::{self, Entity as PurchaseOrderItemEntity};
use crate::entities::sales_order;
use crate::entities::sales_order_item;
use crate::entities::stock_movement::MovementReason;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::stock_ledger::StockLedger;

/// Request/response types for the fulfillment engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesOrderItemInput {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSalesOrderInput {
    pub customer_id: Option<Uuid>,
    pub customer_name: Option<String>,
    pub items: Vec<SalesOrderItemInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrderItemInput {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_cost: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePurchaseOrderInput {
    pub supplier_id: Option<Uuid>,
    pub items: Vec<PurchaseOrderItemInput>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SalesOrderResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub status: String,
    pub total_amount: Decimal,
    pub order_date: DateTime<Utc>,
    pub item_count: usize,
}

/// Order fulfillment engine: sales-order creation, purchase-order receipt
/// and manual adjustment as atomic, tenant-scoped operations on top of the
/// stock ledger.
#[derive(Clone)]
pub struct FulfillmentService {
    db_pool: Arc<DbPool>,
    ledger: StockLedger,
    event_sender: Option<EventSender>,
}

impl FulfillmentService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<EventSender>) -> Self {
        Self {
            db_pool,
            ledger: StockLedger::new(),
            event_sender,
        }
    }

    /// Creates a sales order: header, line items and one ledger decrement
    /// per line, all in a single transaction. Sales orders are
    /// all-or-nothing across every line — if any decrement fails with
    /// `InsufficientStock`, the whole order rolls back.
    #[instrument(skip(self, input), fields(tenant_id = %tenant_id, item_count = input.items.len()))]
    pub async fn create_sales_order(
        &self,
        tenant_id: Uuid,
        input: CreateSalesOrderInput,
    ) -> Result<SalesOrderResponse, ServiceError> {
        validate_quantities(input.items.iter().map(|i| i.quantity))?;

        let db = &*self.db_pool;
        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let total: Decimal = input
            .items
            .iter()
            .map(|i| i.unit_price * Decimal::from(i.quantity))
            .sum();

        let txn = db.begin().await?;

        let header = sales_order::ActiveModel {
            id: Set(order_id),
            tenant_id: Set(tenant_id),
            customer_id: Set(input.customer_id),
            customer_name: Set(input.customer_name),
            status: Set("pending".to_string()),
            total_amount: Set(total),
            order_date: Set(now),
            created_at: Set(now),
        };
        let header = header.insert(&txn).await?;

        for item in &input.items {
            let line = sales_order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                quantity: Set(item.quantity),
                unit_price: Set(item.unit_price),
            };
            line.insert(&txn).await?;

            // Dropping the transaction on the error path rolls everything
            // back, including decrements already applied for earlier lines.
            self.ledger
                .apply_movement(
                    &txn,
                    item.product_id,
                    tenant_id,
                    -item.quantity,
                    MovementReason::SalesOrder,
                    Some(order_id.to_string()),
                )
                .await
                .map_err(|e| {
                    warn!(order_id = %order_id, product_id = %item.product_id, error = %e, "sales order line failed, rolling back");
                    e
                })?;
        }

        txn.commit().await?;

        info!(order_id = %order_id, tenant_id = %tenant_id, total = %total, "sales order created");

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender
                .send(Event::SalesOrderCreated {
                    order_id,
                    tenant_id,
                    item_count: input.items.len(),
                })
                .await
            {
                warn!(error = %e, order_id = %order_id, "failed to send sales order created event");
            }
        }

        Ok(SalesOrderResponse {
            id: header.id,
            tenant_id: header.tenant_id,
            status: header.status,
            total_amount: header.total_amount,
            order_date: header.order_date,
            item_count: input.items.len(),
        })
    }

    /// Creates a purchase order in `pending` state. Stock is untouched
    /// until the order is completed.
    #[instrument(skip(self, input), fields(tenant_id = %tenant_id, item_count = input.items.len()))]
    pub async fn create_purchase_order(
        &self,
        tenant_id: Uuid,
        input: CreatePurchaseOrderInput,
    ) -> Result<Uuid, ServiceError> {
        validate_quantities(input.items.iter().map(|i| i.quantity))?;

        let db = &*self.db_pool;
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let txn = db.begin().await?;

        let header = purchase_order::ActiveModel {
            id: Set(order_id),
            tenant_id: Set(tenant_id),
            supplier_id: Set(input.supplier_id),
            status: Set(PurchaseOrderStatus::Pending.to_string()),
            order_date: Set(now),
            created_at: Set(now),
        };
        header.insert(&txn).await?;

        for item in &input.items {
            let line = purchase_order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                quantity: Set(item.quantity),
                unit_cost: Set(item.unit_cost),
            };
            line.insert(&txn).await?;
        }

        txn.commit().await?;

        info!(order_id = %order_id, tenant_id = %tenant_id, "purchase order created");

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender
                .send(Event::PurchaseOrderCreated {
                    order_id,
                    tenant_id,
                })
                .await
            {
                warn!(error = %e, order_id = %order_id, "failed to send purchase order created event");
            }
        }

        Ok(order_id)
    }

    /// Completes a purchase order, receiving its stock.
    ///
    /// The order row is locked exclusively for the duration of the
    /// transaction so concurrent completion attempts on the same order
    /// serialize. Completing an already-completed order is a no-op that
    /// returns success — stock is received exactly once per order.
    #[instrument(skip(self), fields(order_id = %order_id, tenant_id = %tenant_id))]
    pub async fn complete_purchase_order(
        &self,
        order_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await?;

        // Row lock scoped to this transaction, released on commit/rollback.
        // We must branch on current status before deciding whether to touch
        // stock at all, so a conditional update alone is not enough.
        let order = PurchaseOrderEntity::find_by_id(order_id)
            .filter(purchase_order::Column::TenantId.eq(tenant_id))
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("purchase order {order_id} not found"))
            })?;

        if order.status == PurchaseOrderStatus::Completed.to_string() {
            info!(order_id = %order_id, "purchase order already completed, skipping");
            txn.commit().await?;
            return Ok(());
        }

        let items = PurchaseOrderItemEntity::find()
            .filter(purchase_order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;

        for item in &items {
            self.ledger
                .apply_movement(
                    &txn,
                    item.product_id,
                    tenant_id,
                    item.quantity,
                    MovementReason::PurchaseOrder,
                    Some(order_id.to_string()),
                )
                .await
                .map_err(|e| {
                    error!(order_id = %order_id, product_id = %item.product_id, error = %e, "failed to receive purchase order line");
                    e
                })?;
        }

        let mut active: purchase_order::ActiveModel = order.into();
        active.status = Set(PurchaseOrderStatus::Completed.to_string());
        active.update(&txn).await?;

        txn.commit().await?;

        info!(order_id = %order_id, tenant_id = %tenant_id, lines = items.len(), "purchase order completed");

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender
                .send(Event::PurchaseOrderCompleted {
                    order_id,
                    tenant_id,
                })
                .await
            {
                warn!(error = %e, order_id = %order_id, "failed to send purchase order completed event");
            }
        }

        Ok(())
    }

    /// Manual stock correction: a thin pass-through to the ledger. A zero
    /// delta is rejected at the boundary — a no-op adjustment is
    /// meaningless.
    #[instrument(skip(self), fields(product_id = %product_id, tenant_id = %tenant_id, delta))]
    pub async fn adjust_stock(
        &self,
        product_id: Uuid,
        tenant_id: Uuid,
        delta: i32,
        reason: MovementReason,
    ) -> Result<i32, ServiceError> {
        if delta == 0 {
            return Err(ServiceError::InvalidInput(
                "adjustment delta must be non-zero".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let txn = db.begin().await?;

        let new_quantity = self
            .ledger
            .apply_movement(&txn, product_id, tenant_id, delta, reason, None)
            .await?;

        txn.commit().await?;

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender
                .send(Event::StockAdjusted {
                    product_id,
                    tenant_id,
                    quantity_change: delta,
                    new_quantity,
                    timestamp: Utc::now(),
                })
                .await
            {
                warn!(error = %e, product_id = %product_id, "failed to send stock adjusted event");
            }
        }

        Ok(new_quantity)
    }
}

fn validate_quantities(quantities: impl Iterator<Item = i32>) -> Result<(), ServiceError> {
    let mut any = false;
    for quantity in quantities {
        any = true;
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "item quantity must be positive".to_string(),
            ));
        }
    }
    if !any {
        return Err(ServiceError::ValidationError(
            "order must contain at least one item".to_string(),
        ));
    }
    Ok(())
}
