use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::entities::product::{self, Entity as ProductEntity};
use crate::entities::stock_movement::{self, MovementReason};
use crate::errors::ServiceError;

/// The stock ledger: sole mutator of `products.quantity` and owner of the
/// append-only movement log.
///
/// Every write is a single conditional UPDATE — quantity changes by `delta`
/// only if the tenant owns the product and the result stays non-negative —
/// followed by one movement insert. There is never a separate
/// read-then-check step; that pattern races under concurrent decrements.
/// The movement log is the audit trail, not the write path: quantity is
/// never re-derived from it at write time.
#[derive(Debug, Clone, Copy, Default)]
pub struct StockLedger;

impl StockLedger {
    pub fn new() -> Self {
        Self
    }

    /// Applies a signed quantity change to a product and appends the
    /// matching movement row. Callers wrap this in their own transaction;
    /// `conn` is expected to be a `DatabaseTransaction` whenever the
    /// movement is part of a larger operation.
    ///
    /// Returns the post-update quantity.
    ///
    /// # Errors
    /// - `NotFound` when no product matches (wrong id or wrong tenant)
    /// - `InsufficientStock` when a negative `delta` would drive the
    ///   quantity below zero
    #[instrument(skip(self, conn), fields(product_id = %product_id, tenant_id = %tenant_id, delta))]
    pub async fn apply_movement<C>(
        &self,
        conn: &C,
        product_id: Uuid,
        tenant_id: Uuid,
        delta: i32,
        reason: MovementReason,
        reference_id: Option<String>,
    ) -> Result<i32, ServiceError>
    where
        C: ConnectionTrait,
    {
        let mut update = ProductEntity::update_many()
            .col_expr(
                product::Column::Quantity,
                Expr::col(product::Column::Quantity).add(delta),
            )
            .col_expr(
                product::Column::UpdatedAt,
                Expr::value(Some(Utc::now())),
            )
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::TenantId.eq(tenant_id));

        // The non-negativity guard lives inside the UPDATE itself, so the
        // check and the write are one atomic statement.
        if delta < 0 {
            update = update.filter(product::Column::Quantity.gte(-delta));
        }

        let result = update.exec(conn).await?;

        if result.rows_affected == 0 {
            // Zero rows means either the product is missing for this tenant
            // or the guard refused the decrement. Disambiguate with a read;
            // this read is only for error reporting, never for the write.
            let exists = ProductEntity::find_by_id(product_id)
                .filter(product::Column::TenantId.eq(tenant_id))
                .one(conn)
                .await?
                .is_some();

            return if exists {
                warn!(product_id = %product_id, delta, "decrement refused, would go negative");
                Err(ServiceError::InsufficientStock(format!(
                    "insufficient stock for product {product_id}"
                )))
            } else {
                Err(ServiceError::NotFound(format!(
                    "product {product_id} not found"
                )))
            };
        }

        let movement = stock_movement::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            tenant_id: Set(tenant_id),
            quantity_change: Set(delta),
            reason: Set(reason.to_string()),
            reference_id: Set(reference_id),
            created_at: Set(Utc::now()),
        };
        movement.insert(conn).await?;

        let updated = ProductEntity::find_by_id(product_id)
            .filter(product::Column::TenantId.eq(tenant_id))
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "product {product_id} vanished after update"
                ))
            })?;

        debug!(
            product_id = %product_id,
            new_quantity = updated.quantity,
            reason = %reason,
            "stock movement applied"
        );

        Ok(updated.quantity)
    }
}
