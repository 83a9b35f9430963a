//! SeaORM entities for the stock ledger core.

pub mod integration;
pub mod product;
pub mod purchase_order;
pub mod purchase_order_item;
pub mod sales_order;
pub mod sales_order_item;
pub mod stock_movement;
