mod common;

use common::{dec, TestApp};
use uuid::Uuid;
use warehouse_api::{
    entities::financial_transaction::TransactionKind,
    errors::ServiceError,
    services::finance::TransactionQuery,
};

#[tokio::test]
async fn transactions_filter_by_kind_and_order() {
    let app = TestApp::new().await;
    let po_id = Uuid::new_v4();
    let so_id = Uuid::new_v4();

    app.state
        .finance
        .record_expense(dec(50), Some("stock purchase".into()), Some(po_id), None)
        .await
        .expect("expense failed");
    app.state
        .finance
        .record_income(dec(80), Some("order revenue".into()), Some(so_id), Some("clerk-1".into()))
        .await
        .expect("income failed");

    let (rows, total) = app
        .state
        .finance
        .list_transactions(TransactionQuery {
            kind: Some(TransactionKind::Income),
            ..Default::default()
        })
        .await
        .expect("list failed");
    assert_eq!(total, 1);
    assert_eq!(rows[0].amount, dec(80));
    assert_eq!(rows[0].created_by.as_deref(), Some("clerk-1"));

    let (rows, total) = app
        .state
        .finance
        .list_transactions(TransactionQuery {
            purchase_order_id: Some(po_id),
            ..Default::default()
        })
        .await
        .expect("list failed");
    assert_eq!(total, 1);
    assert_eq!(rows[0].kind, "EXPENSE");

    let (_, total) = app
        .state
        .finance
        .list_transactions(TransactionQuery::default())
        .await
        .expect("list failed");
    assert_eq!(total, 2);
}

#[tokio::test]
async fn negative_amounts_are_rejected() {
    let app = TestApp::new().await;
    let err = app
        .state
        .finance
        .record_income(dec(-5), None, None, None)
        .await
        .expect_err("negative amount should fail");
    assert!(matches!(err, ServiceError::ValidationError(_)));
}
