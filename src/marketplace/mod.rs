//! Marketplace integration: outbound order-detail client and the inbound
//! notification reconciliation pipeline.

pub mod client;
pub mod reconciler;

pub use client::{MarketplaceApi, MarketplaceOrder, MercadoLibreClient};
pub use reconciler::{Disposition, Reconciler};
