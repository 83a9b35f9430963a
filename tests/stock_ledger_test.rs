mod common;

use assert_matches::assert_matches;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use common::TestApp;
use stockflow_api::entities::stock_movement::{self, MovementReason};
use stockflow_api::errors::ServiceError;
use stockflow_api::services::stock_ledger::StockLedger;

#[tokio::test]
async fn movement_updates_quantity_and_appends_audit_row() {
    let app = TestApp::new().await;
    let tenant = Uuid::new_v4();
    let product = app.seed_product(tenant, "SKU-1", 10).await;
    let ledger = StockLedger::new();

    let qty = ledger
        .apply_movement(&*app.db, product, tenant, -3, MovementReason::SalesOrder, None)
        .await
        .unwrap();
    assert_eq!(qty, 7);

    let qty = ledger
        .apply_movement(
            &*app.db,
            product,
            tenant,
            5,
            MovementReason::PurchaseOrder,
            Some("po-1".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(qty, 12);
    assert_eq!(app.product_quantity(product).await, 12);

    let movements = stock_movement::Entity::find()
        .filter(stock_movement::Column::ProductId.eq(product))
        .all(&*app.db)
        .await
        .unwrap();
    assert_eq!(movements.len(), 2);
    let total: i32 = movements.iter().map(|m| m.quantity_change).sum();
    assert_eq!(total, 2);
    assert!(movements.iter().any(|m| m.reason == "SALES_ORDER"));
    assert!(movements
        .iter()
        .any(|m| m.reference_id.as_deref() == Some("po-1")));
}

#[tokio::test]
async fn decrement_below_zero_is_refused() {
    let app = TestApp::new().await;
    let tenant = Uuid::new_v4();
    let product = app.seed_product(tenant, "SKU-1", 2).await;
    let ledger = StockLedger::new();

    let err = ledger
        .apply_movement(&*app.db, product, tenant, -3, MovementReason::SalesOrder, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    // The refused decrement left no trace.
    assert_eq!(app.product_quantity(product).await, 2);
    let movements = stock_movement::Entity::find()
        .filter(stock_movement::Column::ProductId.eq(product))
        .all(&*app.db)
        .await
        .unwrap();
    assert!(movements.is_empty());

    // Draining to exactly zero is allowed.
    let qty = ledger
        .apply_movement(&*app.db, product, tenant, -2, MovementReason::SalesOrder, None)
        .await
        .unwrap();
    assert_eq!(qty, 0);
}

#[tokio::test]
async fn wrong_tenant_is_indistinguishable_from_missing_product() {
    let app = TestApp::new().await;
    let owner = Uuid::new_v4();
    let intruder = Uuid::new_v4();
    let product = app.seed_product(owner, "SKU-1", 10).await;
    let ledger = StockLedger::new();

    let err = ledger
        .apply_movement(&*app.db, product, intruder, -1, MovementReason::SalesOrder, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    let err = ledger
        .apply_movement(
            &*app.db,
            Uuid::new_v4(),
            owner,
            -1,
            MovementReason::SalesOrder,
            None,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    assert_eq!(app.product_quantity(product).await, 10);
}

#[tokio::test]
async fn concurrent_decrements_never_oversell() {
    let app = TestApp::new().await;
    let tenant = Uuid::new_v4();
    let product = app.seed_product(tenant, "SKU-1", 10).await;
    let ledger = StockLedger::new();

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let db = app.db.clone();
        tasks.push(tokio::spawn(async move {
            ledger
                .apply_movement(&*db, product, tenant, -1, MovementReason::SalesOrder, None)
                .await
                .is_ok()
        }));
    }

    let mut successes = 0;
    for task in tasks {
        if task.await.unwrap() {
            successes += 1;
        }
    }

    assert_eq!(successes, 10);
    assert_eq!(app.product_quantity(product).await, 0);
}
