#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ActiveValue::NotSet, Set};
use tokio::task::JoinHandle;
use uuid::Uuid;

use stockflow_api::config::AppConfig;
use stockflow_api::db::{self, DbPool};
use stockflow_api::entities::product;
use stockflow_api::events;
use stockflow_api::services::fulfillment::FulfillmentService;
use stockflow_api::services::integrations::{IntegrationService, UpsertIntegrationInput};

/// Test harness backed by an in-memory SQLite database.
///
/// The pool is pinned to a single connection because each SQLite
/// `:memory:` connection is its own database.
pub struct TestApp {
    pub db: Arc<DbPool>,
    pub config: AppConfig,
    pub fulfillment: FulfillmentService,
    pub integrations: IntegrationService,
    _event_task: JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "test vault passphrase for unit tests".to_string(),
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool).await.expect("migrations failed");

        let db = Arc::new(pool);
        let (event_sender, event_rx) = events::channel(64);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let fulfillment = FulfillmentService::new(db.clone(), Some(event_sender));
        let integrations = IntegrationService::new(db.clone(), cfg.derived_encryption_key());

        Self {
            db,
            config: cfg,
            fulfillment,
            integrations,
            _event_task: event_task,
        }
    }

    /// Inserts a product and returns its id.
    pub async fn seed_product(&self, tenant_id: Uuid, sku: &str, quantity: i32) -> Uuid {
        let id = Uuid::new_v4();
        let model = product::ActiveModel {
            id: Set(id),
            tenant_id: Set(tenant_id),
            name: Set(format!("Product {sku}")),
            sku: Set(sku.to_string()),
            quantity: Set(quantity),
            created_at: NotSet,
            updated_at: NotSet,
        };
        model.insert(&*self.db).await.expect("failed to seed product");
        id
    }

    /// Stores encrypted credentials for a tenant, keyed to an external
    /// marketplace user id.
    pub async fn seed_integration(
        &self,
        tenant_id: Uuid,
        platform: &str,
        external_user_id: &str,
        access_token: &str,
    ) {
        self.integrations
            .upsert(
                tenant_id,
                platform,
                UpsertIntegrationInput {
                    external_user_id: Some(external_user_id.to_string()),
                    access_token: access_token.to_string(),
                    refresh_token: Some("test-refresh-token".to_string()),
                    expires_at: Utc::now() + Duration::hours(6),
                },
            )
            .await
            .expect("failed to seed integration");
    }

    /// Current on-hand quantity for a product, read directly.
    pub async fn product_quantity(&self, product_id: Uuid) -> i32 {
        use sea_orm::EntityTrait;
        product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await
            .expect("query failed")
            .expect("product missing")
            .quantity
    }
}
