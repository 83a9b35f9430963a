use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Why a movement touched stock. Stored as its string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
pub enum MovementReason {
    #[strum(serialize = "SALES_ORDER")]
    SalesOrder,
    #[strum(serialize = "PURCHASE_ORDER")]
    PurchaseOrder,
    #[strum(serialize = "MANUAL_ADJUSTMENT")]
    ManualAdjustment,
}

/// Append-only stock movement entity: the audit trail for every quantity
/// change. Rows are never updated or deleted after insert.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Uuid,
    pub tenant_id: Uuid,
    /// Signed change: positive for receipts, negative for sales
    pub quantity_change: i32,
    pub reason: String,
    /// Associated order id, when the movement came from one
    pub reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
