use std::{sync::Arc, time::Duration};

use tokio::signal;
use tracing::{error, info};

use stockflow_api as api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    api::db::check_connection(&db_pool).await?;

    let db_arc = Arc::new(db_pool);

    // Init events
    let (event_sender, event_rx) = api::events::channel(cfg.event_channel_capacity);
    tokio::spawn(api::events::process_events(event_rx));

    // Build services
    let encryption_key = cfg.derived_encryption_key();
    let fulfillment_service =
        api::services::fulfillment::FulfillmentService::new(db_arc.clone(), Some(event_sender.clone()));
    let integration_service =
        api::services::integrations::IntegrationService::new(db_arc.clone(), encryption_key);

    let message_queue: Arc<dyn api::message_queue::MessageQueue> = Arc::new(
        api::message_queue::InMemoryMessageQueue::new()
            .with_max_attempts(cfg.max_delivery_attempts),
    );

    // Marketplace reconciliation pipeline
    let marketplace_client = api::marketplace::MercadoLibreClient::new(
        cfg.marketplace_base_url.clone(),
        Duration::from_secs(cfg.marketplace_timeout_secs),
    )?;
    let reconciler = Arc::new(api::marketplace::Reconciler::new(
        db_arc.clone(),
        integration_service.clone(),
        fulfillment_service.clone(),
        Arc::new(marketplace_client),
    ));

    let consumer = tokio::spawn(api::marketplace::reconciler::run_consumer(
        message_queue.clone(),
        cfg.notification_topic.clone(),
        reconciler,
        Duration::from_millis(500),
    ));

    info!(
        environment = %cfg.environment,
        topic = %cfg.notification_topic,
        "stockflow engine started"
    );

    signal::ctrl_c().await?;
    info!("shutdown signal received, stopping consumer");
    consumer.abort();

    Ok(())
}
