mod common;

use common::{dec, seed_customer, seed_product, seed_warehouse, TestApp};
use rust_decimal::Decimal;
use sea_orm::EntityTrait;
use std::collections::HashMap;
use uuid::Uuid;
use warehouse_api::{
    entities::{financial_transaction, inventory_level, stock_movement::MovementType},
    errors::ServiceError,
    services::{
        purchase_orders::AllocationInput,
        sales_orders::{CreateSalesOrder, FulfillSalesOrder, SalesOrderItemInput},
        stock_ledger::NewMovement,
    },
};

fn item(product_id: Uuid, qty: i64, price: i64) -> SalesOrderItemInput {
    SalesOrderItemInput {
        product_id,
        qty: dec(qty),
        unit_price: dec(price),
        discount: None,
        allocations: Vec::new(),
    }
}

async fn stock_in(app: &TestApp, product_id: Uuid, warehouse_id: Uuid, qty: i64) {
    app.state
        .stock_ledger
        .record_movement(NewMovement::new(
            product_id,
            warehouse_id,
            MovementType::In,
            dec(qty),
        ))
        .await
        .expect("stocking failed");
}

async fn level_quantity(app: &TestApp, product_id: Uuid, warehouse_id: Uuid) -> Decimal {
    inventory_level::find_by_pair(product_id, warehouse_id)
        .one(app.db.as_ref())
        .await
        .expect("level query failed")
        .map(|l| l.quantity)
        .unwrap_or(Decimal::ZERO)
}

#[tokio::test]
async fn confirm_without_plan_is_a_pure_status_change() {
    let app = TestApp::new().await;
    let customer = seed_customer(&app.db, "Globex").await;
    let product = seed_product(&app.db, "SKU-1").await;
    let wh = seed_warehouse(&app.db, "Main").await;
    stock_in(&app, product.id, wh.id, 10).await;

    let view = app
        .state
        .sales_orders
        .create(CreateSalesOrder {
            customer_id: customer.id,
            items: vec![item(product.id, 5, 4)],
        })
        .await
        .expect("create failed");
    assert_eq!(view.order.status, "DRAFT");

    let view = app
        .state
        .sales_orders
        .confirm(view.order.id, None)
        .await
        .expect("confirm failed");
    assert_eq!(view.order.status, "CONFIRMED");
    assert_eq!(level_quantity(&app, product.id, wh.id).await, dec(10));

    let err = app
        .state
        .sales_orders
        .confirm(view.order.id, None)
        .await
        .expect_err("second confirm should fail");
    assert!(matches!(err, ServiceError::InvalidStatus(_)));
}

#[tokio::test]
async fn legacy_single_warehouse_fulfillment_draws_every_line() {
    let app = TestApp::new().await;
    let customer = seed_customer(&app.db, "Globex").await;
    let product = seed_product(&app.db, "SKU-1").await;
    let wh = seed_warehouse(&app.db, "Main").await;
    stock_in(&app, product.id, wh.id, 10).await;

    let view = app
        .state
        .sales_orders
        .create(CreateSalesOrder {
            customer_id: customer.id,
            items: vec![item(product.id, 3, 4)],
        })
        .await
        .expect("create failed");
    let order_id = view.order.id;
    app.state
        .sales_orders
        .confirm(order_id, None)
        .await
        .expect("confirm failed");

    let view = app
        .state
        .sales_orders
        .fulfill(
            order_id,
            FulfillSalesOrder {
                allocations: None,
                warehouse_id: Some(wh.id),
            },
            Some("clerk-7".into()),
        )
        .await
        .expect("fulfill failed");
    assert_eq!(view.order.status, "FULFILLED");
    assert_eq!(level_quantity(&app, product.id, wh.id).await, dec(7));

    let transactions = financial_transaction::Entity::find()
        .all(app.db.as_ref())
        .await
        .expect("transaction query failed");
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].kind, "INCOME");
    assert_eq!(transactions[0].amount, dec(12));
    assert_eq!(transactions[0].sales_order_id, Some(order_id));
    assert_eq!(transactions[0].created_by.as_deref(), Some("clerk-7"));

    let err = app
        .state
        .sales_orders
        .fulfill(order_id, FulfillSalesOrder::default(), None)
        .await
        .expect_err("second fulfill should fail");
    assert!(matches!(err, ServiceError::InvalidStatus(_)));
}

#[tokio::test]
async fn insufficient_stock_fails_before_any_line_is_applied() {
    let app = TestApp::new().await;
    let customer = seed_customer(&app.db, "Globex").await;
    let plenty = seed_product(&app.db, "SKU-1").await;
    let scarce = seed_product(&app.db, "SKU-2").await;
    let wh = seed_warehouse(&app.db, "Main").await;
    stock_in(&app, plenty.id, wh.id, 100).await;
    stock_in(&app, scarce.id, wh.id, 1).await;

    let view = app
        .state
        .sales_orders
        .create(CreateSalesOrder {
            customer_id: customer.id,
            items: vec![item(plenty.id, 5, 1), item(scarce.id, 5, 1)],
        })
        .await
        .expect("create failed");

    let err = app
        .state
        .sales_orders
        .fulfill(
            view.order.id,
            FulfillSalesOrder {
                allocations: None,
                warehouse_id: Some(wh.id),
            },
            None,
        )
        .await
        .expect_err("short stock should fail");
    assert!(matches!(err, ServiceError::InsufficientStock(_)));

    // Neither line was applied.
    assert_eq!(level_quantity(&app, plenty.id, wh.id).await, dec(100));
    assert_eq!(level_quantity(&app, scarce.id, wh.id).await, dec(1));
}

#[tokio::test]
async fn stored_plan_short_circuits_confirm_to_fulfilled() {
    let app = TestApp::new().await;
    let customer = seed_customer(&app.db, "Globex").await;
    let product = seed_product(&app.db, "SKU-1").await;
    let wh_a = seed_warehouse(&app.db, "A").await;
    let wh_b = seed_warehouse(&app.db, "B").await;
    stock_in(&app, product.id, wh_a.id, 10).await;
    stock_in(&app, product.id, wh_b.id, 10).await;

    let view = app
        .state
        .sales_orders
        .create(CreateSalesOrder {
            customer_id: customer.id,
            items: vec![SalesOrderItemInput {
                product_id: product.id,
                qty: dec(6),
                unit_price: dec(2),
                discount: Some(dec(2)),
                allocations: vec![
                    AllocationInput {
                        warehouse_id: wh_a.id,
                        qty: dec(4),
                    },
                    AllocationInput {
                        warehouse_id: wh_b.id,
                        qty: dec(2),
                    },
                ],
            }],
        })
        .await
        .expect("create failed");

    let view = app
        .state
        .sales_orders
        .confirm(view.order.id, None)
        .await
        .expect("confirm failed");
    assert_eq!(view.order.status, "FULFILLED");
    assert_eq!(level_quantity(&app, product.id, wh_a.id).await, dec(6));
    assert_eq!(level_quantity(&app, product.id, wh_b.id).await, dec(8));

    // qty * price - discount
    let transactions = financial_transaction::Entity::find()
        .all(app.db.as_ref())
        .await
        .expect("transaction query failed");
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].amount, dec(10));
}

#[tokio::test]
async fn request_allocations_take_precedence_over_stored_plan() {
    let app = TestApp::new().await;
    let customer = seed_customer(&app.db, "Globex").await;
    let product = seed_product(&app.db, "SKU-1").await;
    let wh_a = seed_warehouse(&app.db, "A").await;
    let wh_b = seed_warehouse(&app.db, "B").await;
    stock_in(&app, product.id, wh_b.id, 10).await;

    // Stored plan points at warehouse A, which holds no stock.
    let view = app
        .state
        .sales_orders
        .create(CreateSalesOrder {
            customer_id: customer.id,
            items: vec![SalesOrderItemInput {
                product_id: product.id,
                qty: dec(5),
                unit_price: dec(1),
                discount: None,
                allocations: vec![AllocationInput {
                    warehouse_id: wh_a.id,
                    qty: dec(5),
                }],
            }],
        })
        .await
        .expect("create failed");
    let item_id = view.items[0].item.id;

    let view = app
        .state
        .sales_orders
        .fulfill(
            view.order.id,
            FulfillSalesOrder {
                allocations: Some(HashMap::from([(
                    item_id,
                    vec![AllocationInput {
                        warehouse_id: wh_b.id,
                        qty: dec(5),
                    }],
                )])),
                warehouse_id: None,
            },
            None,
        )
        .await
        .expect("fulfill failed");
    assert_eq!(view.order.status, "FULFILLED");
    assert_eq!(level_quantity(&app, product.id, wh_b.id).await, dec(5));
    assert_eq!(level_quantity(&app, product.id, wh_a.id).await, Decimal::ZERO);
}

#[tokio::test]
async fn fulfill_without_any_allocation_source_is_rejected() {
    let app = TestApp::new().await;
    let customer = seed_customer(&app.db, "Globex").await;
    let product = seed_product(&app.db, "SKU-1").await;

    let view = app
        .state
        .sales_orders
        .create(CreateSalesOrder {
            customer_id: customer.id,
            items: vec![item(product.id, 2, 1)],
        })
        .await
        .expect("create failed");

    let err = app
        .state
        .sales_orders
        .fulfill(view.order.id, FulfillSalesOrder::default(), None)
        .await
        .expect_err("missing allocation source should fail");
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn partial_request_coverage_is_rejected() {
    let app = TestApp::new().await;
    let customer = seed_customer(&app.db, "Globex").await;
    let product = seed_product(&app.db, "SKU-1").await;
    let wh = seed_warehouse(&app.db, "Main").await;
    stock_in(&app, product.id, wh.id, 10).await;

    let view = app
        .state
        .sales_orders
        .create(CreateSalesOrder {
            customer_id: customer.id,
            items: vec![item(product.id, 5, 1)],
        })
        .await
        .expect("create failed");
    let item_id = view.items[0].item.id;

    let err = app
        .state
        .sales_orders
        .fulfill(
            view.order.id,
            FulfillSalesOrder {
                allocations: Some(HashMap::from([(
                    item_id,
                    vec![AllocationInput {
                        warehouse_id: wh.id,
                        qty: dec(3),
                    }],
                )])),
                warehouse_id: None,
            },
            None,
        )
        .await
        .expect_err("partial coverage should fail");
    assert!(matches!(err, ServiceError::ValidationError(_)));
    assert_eq!(level_quantity(&app, product.id, wh.id).await, dec(10));
}

#[tokio::test]
async fn overlapping_fulfillments_cannot_double_decrement_stock() {
    let app = TestApp::new().await;
    let customer = seed_customer(&app.db, "Globex").await;
    let product = seed_product(&app.db, "SKU-1").await;
    let wh = seed_warehouse(&app.db, "Main").await;
    stock_in(&app, product.id, wh.id, 10).await;

    let view = app
        .state
        .sales_orders
        .create(CreateSalesOrder {
            customer_id: customer.id,
            items: vec![item(product.id, 4, 3)],
        })
        .await
        .expect("create failed");
    let order_id = view.order.id;

    // Two fulfillments race; the FULFILLED guard and the stock check read
    // inside the transaction, so exactly one may ship the order.
    let svc_a = app.state.sales_orders.clone();
    let svc_b = app.state.sales_orders.clone();
    let single_warehouse = || FulfillSalesOrder {
        allocations: None,
        warehouse_id: Some(wh.id),
    };
    let (first, second) = tokio::join!(
        svc_a.fulfill(order_id, single_warehouse(), None),
        svc_b.fulfill(order_id, single_warehouse(), None),
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    let err = outcomes
        .iter()
        .find_map(|r| r.as_ref().err())
        .expect("one fulfillment should fail");
    assert!(matches!(err, ServiceError::InvalidStatus(_)));

    assert_eq!(level_quantity(&app, product.id, wh.id).await, dec(6));
    let transactions = financial_transaction::Entity::find()
        .all(app.db.as_ref())
        .await
        .expect("transaction query failed");
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].kind, "INCOME");
    assert_eq!(transactions[0].amount, dec(12));
}

#[tokio::test]
async fn create_rejects_unknown_customer() {
    let app = TestApp::new().await;
    let product = seed_product(&app.db, "SKU-1").await;

    let err = app
        .state
        .sales_orders
        .create(CreateSalesOrder {
            customer_id: Uuid::new_v4(),
            items: vec![item(product.id, 1, 1)],
        })
        .await
        .expect_err("unknown customer should fail");
    assert!(matches!(err, ServiceError::NotFound(_)));
}
