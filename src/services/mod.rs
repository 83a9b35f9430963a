pub mod fulfillment;
pub mod integrations;
pub mod stock_ledger;
