mod common;

use common::{dec, seed_product, seed_supplier, seed_warehouse, TestApp};
use rust_decimal::Decimal;
use sea_orm::EntityTrait;
use std::collections::HashMap;
use uuid::Uuid;
use warehouse_api::{
    entities::{financial_transaction, inventory_level, stock_movement},
    errors::ServiceError,
    services::purchase_orders::{
        AllocationInput, CreatePurchaseOrder, PurchaseOrderItemInput, ReceivePurchaseOrder,
    },
};

fn order_input(
    supplier_id: Uuid,
    items: Vec<PurchaseOrderItemInput>,
) -> CreatePurchaseOrder {
    CreatePurchaseOrder {
        supplier_id,
        expected_at: None,
        items,
    }
}

fn item(product_id: Uuid, qty: i64, price: i64) -> PurchaseOrderItemInput {
    PurchaseOrderItemInput {
        product_id,
        qty_ordered: dec(qty),
        unit_price: dec(price),
        allocations: Vec::new(),
    }
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
async fn created_order_starts_as_draft_with_nothing_received() {
    let app = TestApp::new().await;
    let supplier = seed_supplier(&app.db, "Acme").await;
    let product = seed_product(&app.db, "SKU-1").await;

    let view = app
        .state
        .purchase_orders
        .create(order_input(supplier.id, vec![item(product.id, 10, 5)]))
        .await
        .expect("create failed");

    assert_eq!(view.order.status, "DRAFT");
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].item.qty_received, Decimal::ZERO);
}

#[tokio::test]
async fn create_rejects_unknown_supplier_and_products() {
    let app = TestApp::new().await;
    let supplier = seed_supplier(&app.db, "Acme").await;
    let product = seed_product(&app.db, "SKU-1").await;

    let err = app
        .state
        .purchase_orders
        .create(order_input(Uuid::new_v4(), vec![item(product.id, 1, 1)]))
        .await
        .expect_err("unknown supplier should fail");
    assert!(matches!(err, ServiceError::NotFound(_)));

    let err = app
        .state
        .purchase_orders
        .create(order_input(supplier.id, vec![item(Uuid::new_v4(), 1, 1)]))
        .await
        .expect_err("unknown product should fail");
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn mark_ordered_without_plan_is_a_pure_status_change() {
    let app = TestApp::new().await;
    let supplier = seed_supplier(&app.db, "Acme").await;
    let product = seed_product(&app.db, "SKU-1").await;
    let wh = seed_warehouse(&app.db, "Main").await;

    let view = app
        .state
        .purchase_orders
        .create(order_input(supplier.id, vec![item(product.id, 10, 5)]))
        .await
        .expect("create failed");

    let view = app
        .state
        .purchase_orders
        .mark_ordered(view.order.id, None)
        .await
        .expect("mark_ordered failed");
    assert_eq!(view.order.status, "ORDERED");
    assert_eq!(level_quantity(&app, product.id, wh.id).await, Decimal::ZERO);

    // Only DRAFT orders can be marked.
    let err = app
        .state
        .purchase_orders
        .mark_ordered(view.order.id, None)
        .await
        .expect_err("second mark_ordered should fail");
    assert!(matches!(err, ServiceError::InvalidStatus(_)));
}

#[tokio::test]
async fn partial_receipts_accumulate_until_fully_received() {
    let app = TestApp::new().await;
    let supplier = seed_supplier(&app.db, "Acme").await;
    let product = seed_product(&app.db, "SKU-1").await;
    let wh = seed_warehouse(&app.db, "Main").await;

    let view = app
        .state
        .purchase_orders
        .create(order_input(supplier.id, vec![item(product.id, 10, 5)]))
        .await
        .expect("create failed");
    let order_id = view.order.id;
    let item_id = view.items[0].item.id;
    app.state
        .purchase_orders
        .mark_ordered(order_id, None)
        .await
        .expect("mark_ordered failed");

    let view = app
        .state
        .purchase_orders
        .receive(
            order_id,
            ReceivePurchaseOrder {
                warehouse_id: wh.id,
                received_quantities: HashMap::from([(item_id, dec(4))]),
            },
            None,
        )
        .await
        .expect("first receipt failed");
    assert_eq!(view.order.status, "ORDERED");
    assert_eq!(view.items[0].item.qty_received, dec(4));
    assert_eq!(level_quantity(&app, product.id, wh.id).await, dec(4));

    let view = app
        .state
        .purchase_orders
        .receive(
            order_id,
            ReceivePurchaseOrder {
                warehouse_id: wh.id,
                received_quantities: HashMap::from([(item_id, dec(6))]),
            },
            Some("buyer-1".into()),
        )
        .await
        .expect("second receipt failed");
    assert_eq!(view.order.status, "RECEIVED");
    assert_eq!(view.items[0].item.qty_received, dec(10));
    assert_eq!(level_quantity(&app, product.id, wh.id).await, dec(10));

    // Completing the order books the expense for the full ordered value.
    let transactions = financial_transaction::Entity::find()
        .all(app.db.as_ref())
        .await
        .expect("transaction query failed");
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].kind, "EXPENSE");
    assert_eq!(transactions[0].amount, dec(50));
    assert_eq!(transactions[0].purchase_order_id, Some(order_id));
    assert_eq!(transactions[0].created_by.as_deref(), Some("buyer-1"));
}

#[tokio::test]
async fn over_receipt_is_rejected_before_any_write() {
    let app = TestApp::new().await;
    let supplier = seed_supplier(&app.db, "Acme").await;
    let product = seed_product(&app.db, "SKU-1").await;
    let wh = seed_warehouse(&app.db, "Main").await;

    let view = app
        .state
        .purchase_orders
        .create(order_input(supplier.id, vec![item(product.id, 5, 2)]))
        .await
        .expect("create failed");
    let order_id = view.order.id;
    let item_id = view.items[0].item.id;
    app.state
        .purchase_orders
        .mark_ordered(order_id, None)
        .await
        .expect("mark_ordered failed");

    let err = app
        .state
        .purchase_orders
        .receive(
            order_id,
            ReceivePurchaseOrder {
                warehouse_id: wh.id,
                received_quantities: HashMap::from([(item_id, dec(6))]),
            },
            None,
        )
        .await
        .expect_err("over-receipt should fail");
    assert!(matches!(err, ServiceError::InvalidOperation(_)));
    assert_eq!(level_quantity(&app, product.id, wh.id).await, Decimal::ZERO);
}

#[tokio::test]
async fn receiving_unknown_items_or_received_orders_is_rejected() {
    let app = TestApp::new().await;
    let supplier = seed_supplier(&app.db, "Acme").await;
    let product = seed_product(&app.db, "SKU-1").await;
    let wh = seed_warehouse(&app.db, "Main").await;

    let view = app
        .state
        .purchase_orders
        .create(order_input(supplier.id, vec![item(product.id, 5, 2)]))
        .await
        .expect("create failed");
    let order_id = view.order.id;
    let item_id = view.items[0].item.id;

    let err = app
        .state
        .purchase_orders
        .receive(
            order_id,
            ReceivePurchaseOrder {
                warehouse_id: wh.id,
                received_quantities: HashMap::from([(Uuid::new_v4(), dec(1))]),
            },
            None,
        )
        .await
        .expect_err("unknown item should fail");
    assert!(matches!(err, ServiceError::ValidationError(_)));

    app.state
        .purchase_orders
        .receive(
            order_id,
            ReceivePurchaseOrder {
                warehouse_id: wh.id,
                received_quantities: HashMap::from([(item_id, dec(5))]),
            },
            None,
        )
        .await
        .expect("full receipt failed");

    let err = app
        .state
        .purchase_orders
        .receive(
            order_id,
            ReceivePurchaseOrder {
                warehouse_id: wh.id,
                received_quantities: HashMap::from([(item_id, dec(1))]),
            },
            None,
        )
        .await
        .expect_err("receipt on RECEIVED order should fail");
    assert!(matches!(err, ServiceError::InvalidStatus(_)));
}

#[tokio::test]
async fn receipt_without_quantities_is_rejected() {
    let app = TestApp::new().await;
    let supplier = seed_supplier(&app.db, "Acme").await;
    let product = seed_product(&app.db, "SKU-1").await;
    let wh = seed_warehouse(&app.db, "Main").await;

    let view = app
        .state
        .purchase_orders
        .create(order_input(supplier.id, vec![item(product.id, 5, 2)]))
        .await
        .expect("create failed");

    let err = app
        .state
        .purchase_orders
        .receive(
            view.order.id,
            ReceivePurchaseOrder {
                warehouse_id: wh.id,
                received_quantities: HashMap::new(),
            },
            None,
        )
        .await
        .expect_err("empty receipt should fail");
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn overlapping_receipts_cannot_double_book_stock() {
    let app = TestApp::new().await;
    let supplier = seed_supplier(&app.db, "Acme").await;
    let product = seed_product(&app.db, "SKU-1").await;
    let wh = seed_warehouse(&app.db, "Main").await;

    let view = app
        .state
        .purchase_orders
        .create(order_input(supplier.id, vec![item(product.id, 10, 5)]))
        .await
        .expect("create failed");
    let order_id = view.order.id;
    let item_id = view.items[0].item.id;
    app.state
        .purchase_orders
        .mark_ordered(order_id, None)
        .await
        .expect("mark_ordered failed");

    // Two full receipts race; the guards read inside the transaction, so
    // exactly one may win and the loser sees the committed state.
    let svc_a = app.state.purchase_orders.clone();
    let svc_b = app.state.purchase_orders.clone();
    let full_receipt = || ReceivePurchaseOrder {
        warehouse_id: wh.id,
        received_quantities: HashMap::from([(item_id, dec(10))]),
    };
    let (first, second) = tokio::join!(
        svc_a.receive(order_id, full_receipt(), None),
        svc_b.receive(order_id, full_receipt(), None),
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    let err = outcomes
        .iter()
        .find_map(|r| r.as_ref().err())
        .expect("one receipt should fail");
    assert!(matches!(
        err,
        ServiceError::InvalidStatus(_) | ServiceError::InvalidOperation(_)
    ));

    assert_eq!(level_quantity(&app, product.id, wh.id).await, dec(10));
    let view = app
        .state
        .purchase_orders
        .get(order_id)
        .await
        .expect("get failed");
    assert_eq!(view.items[0].item.qty_received, dec(10));
    let movements = stock_movement::Entity::find()
        .all(app.db.as_ref())
        .await
        .expect("movement query failed");
    assert_eq!(movements.len(), 1);
}

#[tokio::test]
async fn full_allocation_plan_short_circuits_to_received() {
    let app = TestApp::new().await;
    let supplier = seed_supplier(&app.db, "Acme").await;
    let product = seed_product(&app.db, "SKU-1").await;
    let wh_a = seed_warehouse(&app.db, "A").await;
    let wh_b = seed_warehouse(&app.db, "B").await;

    let view = app
        .state
        .purchase_orders
        .create(order_input(
            supplier.id,
            vec![PurchaseOrderItemInput {
                product_id: product.id,
                qty_ordered: dec(10),
                unit_price: dec(3),
                allocations: vec![
                    AllocationInput {
                        warehouse_id: wh_a.id,
                        qty: dec(6),
                    },
                    AllocationInput {
                        warehouse_id: wh_b.id,
                        qty: dec(4),
                    },
                ],
            }],
        ))
        .await
        .expect("create failed");

    let view = app
        .state
        .purchase_orders
        .mark_ordered(view.order.id, None)
        .await
        .expect("mark_ordered failed");

    assert_eq!(view.order.status, "RECEIVED");
    assert_eq!(view.items[0].item.qty_received, dec(10));
    assert_eq!(level_quantity(&app, product.id, wh_a.id).await, dec(6));
    assert_eq!(level_quantity(&app, product.id, wh_b.id).await, dec(4));

    let transactions = financial_transaction::Entity::find()
        .all(app.db.as_ref())
        .await
        .expect("transaction query failed");
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].amount, dec(30));
}

#[tokio::test]
async fn plan_that_does_not_cover_the_order_is_rejected() {
    let app = TestApp::new().await;
    let supplier = seed_supplier(&app.db, "Acme").await;
    let product = seed_product(&app.db, "SKU-1").await;
    let wh = seed_warehouse(&app.db, "Main").await;

    let view = app
        .state
        .purchase_orders
        .create(order_input(
            supplier.id,
            vec![PurchaseOrderItemInput {
                product_id: product.id,
                qty_ordered: dec(10),
                unit_price: dec(3),
                allocations: vec![AllocationInput {
                    warehouse_id: wh.id,
                    qty: dec(7),
                }],
            }],
        ))
        .await
        .expect("create failed");

    let err = app
        .state
        .purchase_orders
        .mark_ordered(view.order.id, None)
        .await
        .expect_err("short plan should fail");
    assert!(matches!(err, ServiceError::ValidationError(_)));
    assert_eq!(level_quantity(&app, product.id, wh.id).await, Decimal::ZERO);
}
