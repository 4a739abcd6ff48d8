mod common;

use common::{dec, seed_product, seed_warehouse, soft_delete_product, TestApp};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use warehouse_api::{
    entities::stock_movement,
    errors::ServiceError,
    services::stock_ledger::NewMovement,
};
use warehouse_api::entities::stock_movement::MovementType;

#[tokio::test]
async fn adjustment_sets_level_to_counted_value() {
    let app = TestApp::new().await;
    let product = seed_product(&app.db, "SKU-1").await;
    let wh = seed_warehouse(&app.db, "Main").await;

    app.state
        .stock_ledger
        .record_movement(NewMovement::new(product.id, wh.id, MovementType::In, dec(20)))
        .await
        .expect("inbound failed");

    // Count came back short.
    let level = app
        .state
        .inventory
        .adjust(product.id, wh.id, dec(17), Some("stocktake".into()))
        .await
        .expect("adjust failed");
    assert_eq!(level.quantity, dec(17));

    let adjust_rows = stock_movement::Entity::find()
        .filter(stock_movement::Column::MovementType.eq("ADJUST"))
        .all(app.db.as_ref())
        .await
        .expect("movement query failed");
    assert_eq!(adjust_rows.len(), 1);
    assert_eq!(adjust_rows[0].quantity, dec(-3));
    assert_eq!(adjust_rows[0].reason.as_deref(), Some("stocktake"));
}

#[tokio::test]
async fn adjustment_creates_level_when_absent() {
    let app = TestApp::new().await;
    let product = seed_product(&app.db, "SKU-1").await;
    let wh = seed_warehouse(&app.db, "Main").await;

    let level = app
        .state
        .inventory
        .adjust(product.id, wh.id, dec(9), None)
        .await
        .expect("adjust failed");
    assert_eq!(level.quantity, dec(9));

    let movements = stock_movement::Entity::find()
        .all(app.db.as_ref())
        .await
        .expect("movement query failed");
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].quantity, dec(9));
}

#[tokio::test]
async fn zero_delta_is_still_recorded() {
    let app = TestApp::new().await;
    let product = seed_product(&app.db, "SKU-1").await;
    let wh = seed_warehouse(&app.db, "Main").await;

    app.state
        .inventory
        .adjust(product.id, wh.id, dec(5), None)
        .await
        .expect("first adjust failed");
    app.state
        .inventory
        .adjust(product.id, wh.id, dec(5), None)
        .await
        .expect("second adjust failed");

    let movements = stock_movement::Entity::find()
        .order_by_asc(stock_movement::Column::CreatedAt)
        .all(app.db.as_ref())
        .await
        .expect("movement query failed");
    assert_eq!(movements.len(), 2);
    assert_eq!(movements[1].quantity, Decimal::ZERO);
}

#[tokio::test]
async fn repeating_the_same_count_changes_nothing() {
    let app = TestApp::new().await;
    let product = seed_product(&app.db, "SKU-1").await;
    let wh = seed_warehouse(&app.db, "Main").await;

    let first = app
        .state
        .inventory
        .adjust(product.id, wh.id, dec(12), None)
        .await
        .expect("first adjust failed");
    let second = app
        .state
        .inventory
        .adjust(product.id, wh.id, dec(12), None)
        .await
        .expect("second adjust failed");
    assert_eq!(first.quantity, second.quantity);
    assert_eq!(second.quantity, dec(12));
}

#[tokio::test]
async fn negative_counted_quantity_is_rejected() {
    let app = TestApp::new().await;
    let product = seed_product(&app.db, "SKU-1").await;
    let wh = seed_warehouse(&app.db, "Main").await;

    let err = app
        .state
        .inventory
        .adjust(product.id, wh.id, dec(-1), None)
        .await
        .expect_err("negative count should be rejected");
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn adjustment_of_soft_deleted_product_is_not_found() {
    let app = TestApp::new().await;
    let product = seed_product(&app.db, "SKU-1").await;
    let wh = seed_warehouse(&app.db, "Main").await;
    let product_id = product.id;
    soft_delete_product(&app.db, product).await;

    let err = app
        .state
        .inventory
        .adjust(product_id, wh.id, dec(1), None)
        .await
        .expect_err("soft-deleted product should be invisible");
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn per_product_and_per_warehouse_views() {
    let app = TestApp::new().await;
    let product = seed_product(&app.db, "SKU-1").await;
    let other = seed_product(&app.db, "SKU-2").await;
    let wh_a = seed_warehouse(&app.db, "A").await;
    let wh_b = seed_warehouse(&app.db, "B").await;

    app.state
        .inventory
        .adjust(product.id, wh_a.id, dec(3), None)
        .await
        .expect("adjust failed");
    app.state
        .inventory
        .adjust(product.id, wh_b.id, dec(4), None)
        .await
        .expect("adjust failed");
    app.state
        .inventory
        .adjust(other.id, wh_a.id, dec(5), None)
        .await
        .expect("adjust failed");

    let by_product = app
        .state
        .inventory
        .levels_by_product(product.id)
        .await
        .expect("levels failed");
    assert_eq!(by_product.len(), 2);

    let by_warehouse = app
        .state
        .inventory
        .levels_by_warehouse(wh_a.id)
        .await
        .expect("levels failed");
    assert_eq!(by_warehouse.len(), 2);
}
