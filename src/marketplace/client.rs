use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::errors::ServiceError;

/// Buyer identity attached to a marketplace order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketplaceBuyer {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketplaceItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Seller-assigned SKU; the key used to map lines onto the tenant's
    /// own catalog.
    #[serde(rename = "seller_custom_field", default)]
    pub seller_sku: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceOrderItem {
    pub item: MarketplaceItem,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Order detail as returned by the marketplace order API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceOrder {
    pub id: i64,
    /// confirmed, payment_required, payment_in_process, partially_paid,
    /// paid, cancelled
    pub status: String,
    #[serde(default)]
    pub buyer: MarketplaceBuyer,
    #[serde(default)]
    pub order_items: Vec<MarketplaceOrderItem>,
    #[serde(default)]
    pub total_amount: Decimal,
    #[serde(default)]
    pub currency_id: Option<String>,
}

impl MarketplaceOrder {
    /// Only confirmed or (partially) paid orders are worth recording.
    pub fn is_processable(&self) -> bool {
        matches!(self.status.as_str(), "confirmed" | "paid" | "partially_paid")
    }

    pub fn buyer_label(&self) -> String {
        format!(
            "{} {} ({})",
            self.buyer.first_name, self.buyer.last_name, self.buyer.nickname
        )
    }
}

/// Outbound marketplace API surface consumed by the reconciler.
#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    /// Fetches full order detail by the marketplace's numeric order id,
    /// authenticating with the given access token.
    async fn get_order(
        &self,
        order_id: i64,
        access_token: &str,
    ) -> Result<MarketplaceOrder, ServiceError>;
}

/// Mercado Libre order API client.
#[derive(Debug, Clone)]
pub struct MercadoLibreClient {
    http: reqwest::Client,
    base_url: String,
}

impl MercadoLibreClient {
    /// Builds a client with a bounded per-request timeout. A marketplace
    /// call with no timeout can stall a consumer indefinitely.
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))?;
        Ok(Self { http, base_url })
    }
}

#[async_trait]
impl MarketplaceApi for MercadoLibreClient {
    #[instrument(skip(self, access_token), fields(order_id))]
    async fn get_order(
        &self,
        order_id: i64,
        access_token: &str,
    ) -> Result<MarketplaceOrder, ServiceError> {
        let url = format!("{}/orders/{}", self.base_url.trim_end_matches('/'), order_id);
        debug!(url = %url, "fetching marketplace order");

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("order request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::ExternalServiceError(format!(
                "marketplace API error (status {status}): {body}"
            )));
        }

        response.json::<MarketplaceOrder>().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("failed to parse order: {e}"))
        })
    }
}
