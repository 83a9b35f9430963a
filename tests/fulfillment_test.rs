mod common;

use assert_matches::assert_matches;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use common::TestApp;
use stockflow_api::entities::{sales_order, sales_order_item, stock_movement};
use stockflow_api::entities::stock_movement::MovementReason;
use stockflow_api::errors::ServiceError;
use stockflow_api::services::fulfillment::{
    CreatePurchaseOrderInput, CreateSalesOrderInput, PurchaseOrderItemInput, SalesOrderItemInput,
};

#[tokio::test]
async fn sales_order_decrements_every_line() {
    let app = TestApp::new().await;
    let tenant = Uuid::new_v4();
    let widget = app.seed_product(tenant, "WIDGET", 10).await;
    let gadget = app.seed_product(tenant, "GADGET", 4).await;

    let response = app
        .fulfillment
        .create_sales_order(
            tenant,
            CreateSalesOrderInput {
                customer_id: None,
                customer_name: Some("Ana Gomez".to_string()),
                items: vec![
                    SalesOrderItemInput {
                        product_id: widget,
                        quantity: 2,
                        unit_price: dec!(10.50),
                    },
                    SalesOrderItemInput {
                        product_id: gadget,
                        quantity: 1,
                        unit_price: dec!(3.00),
                    },
                ],
            },
        )
        .await
        .unwrap();

    assert_eq!(response.status, "pending");
    assert_eq!(response.total_amount, dec!(24.00));
    assert_eq!(app.product_quantity(widget).await, 8);
    assert_eq!(app.product_quantity(gadget).await, 3);

    // Both decrements reference the order.
    let movements = stock_movement::Entity::find()
        .filter(stock_movement::Column::ReferenceId.eq(response.id.to_string()))
        .all(&*app.db)
        .await
        .unwrap();
    assert_eq!(movements.len(), 2);
    assert!(movements.iter().all(|m| m.reason == "SALES_ORDER"));
}

#[tokio::test]
async fn sales_order_rolls_back_whole_order_on_insufficient_stock() {
    let app = TestApp::new().await;
    let tenant = Uuid::new_v4();
    let plenty = app.seed_product(tenant, "PLENTY", 3).await;
    let scarce = app.seed_product(tenant, "SCARCE", 1).await;

    let err = app
        .fulfillment
        .create_sales_order(
            tenant,
            CreateSalesOrderInput {
                customer_id: None,
                customer_name: None,
                items: vec![
                    SalesOrderItemInput {
                        product_id: plenty,
                        quantity: 2,
                        unit_price: dec!(1.00),
                    },
                    SalesOrderItemInput {
                        product_id: scarce,
                        quantity: 5,
                        unit_price: dec!(1.00),
                    },
                ],
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    // The first line's decrement was rolled back along with the header.
    assert_eq!(app.product_quantity(plenty).await, 3);
    assert_eq!(app.product_quantity(scarce).await, 1);

    let orders = sales_order::Entity::find()
        .filter(sales_order::Column::TenantId.eq(tenant))
        .all(&*app.db)
        .await
        .unwrap();
    assert!(orders.is_empty());

    let lines = sales_order_item::Entity::find().all(&*app.db).await.unwrap();
    assert!(lines.is_empty());

    let movements = stock_movement::Entity::find()
        .filter(stock_movement::Column::TenantId.eq(tenant))
        .all(&*app.db)
        .await
        .unwrap();
    assert!(movements.is_empty());
}

#[tokio::test]
async fn sales_order_validation_rejects_bad_input() {
    let app = TestApp::new().await;
    let tenant = Uuid::new_v4();
    let product = app.seed_product(tenant, "SKU-1", 10).await;

    let err = app
        .fulfillment
        .create_sales_order(
            tenant,
            CreateSalesOrderInput {
                customer_id: None,
                customer_name: None,
                items: vec![],
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = app
        .fulfillment
        .create_sales_order(
            tenant,
            CreateSalesOrderInput {
                customer_id: None,
                customer_name: None,
                items: vec![SalesOrderItemInput {
                    product_id: product,
                    quantity: 0,
                    unit_price: Decimal::ONE,
                }],
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    assert_eq!(app.product_quantity(product).await, 10);
}

#[tokio::test]
async fn purchase_order_receives_stock_exactly_once() {
    let app = TestApp::new().await;
    let tenant = Uuid::new_v4();
    let product = app.seed_product(tenant, "SKU-1", 5).await;

    let order_id = app
        .fulfillment
        .create_purchase_order(
            tenant,
            CreatePurchaseOrderInput {
                supplier_id: None,
                items: vec![PurchaseOrderItemInput {
                    product_id: product,
                    quantity: 20,
                    unit_cost: dec!(2.50),
                }],
            },
        )
        .await
        .unwrap();

    // Creation alone leaves stock untouched.
    assert_eq!(app.product_quantity(product).await, 5);

    app.fulfillment
        .complete_purchase_order(order_id, tenant)
        .await
        .unwrap();
    assert_eq!(app.product_quantity(product).await, 25);

    // Completing again is a no-op, not a second receipt.
    app.fulfillment
        .complete_purchase_order(order_id, tenant)
        .await
        .unwrap();
    assert_eq!(app.product_quantity(product).await, 25);

    let movements = stock_movement::Entity::find()
        .filter(stock_movement::Column::ReferenceId.eq(order_id.to_string()))
        .all(&*app.db)
        .await
        .unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].quantity_change, 20);
}

#[tokio::test]
async fn purchase_order_is_tenant_scoped() {
    let app = TestApp::new().await;
    let owner = Uuid::new_v4();
    let intruder = Uuid::new_v4();
    let product = app.seed_product(owner, "SKU-1", 0).await;

    let order_id = app
        .fulfillment
        .create_purchase_order(
            owner,
            CreatePurchaseOrderInput {
                supplier_id: None,
                items: vec![PurchaseOrderItemInput {
                    product_id: product,
                    quantity: 10,
                    unit_cost: Decimal::ONE,
                }],
            },
        )
        .await
        .unwrap();

    let err = app
        .fulfillment
        .complete_purchase_order(order_id, intruder)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
    assert_eq!(app.product_quantity(product).await, 0);
}

#[tokio::test]
async fn manual_adjustment_rejects_zero_delta() {
    let app = TestApp::new().await;
    let tenant = Uuid::new_v4();
    let product = app.seed_product(tenant, "SKU-1", 7).await;

    let err = app
        .fulfillment
        .adjust_stock(product, tenant, 0, MovementReason::ManualAdjustment)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidInput(_));

    let qty = app
        .fulfillment
        .adjust_stock(product, tenant, -2, MovementReason::ManualAdjustment)
        .await
        .unwrap();
    assert_eq!(qty, 5);
}
