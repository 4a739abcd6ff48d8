mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use common::{dec, seed_product, seed_warehouse, TestApp};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use warehouse_api::{app, entities::stock_movement::MovementType, services::stock_ledger::NewMovement};

struct ApiHarness {
    app: TestApp,
    router: Router,
}

impl ApiHarness {
    async fn new() -> Self {
        let test_app = TestApp::new().await;
        let router = app(test_app.state.clone());
        Self {
            app: test_app,
            router,
        }
    }

    fn token(&self, roles: &[&str]) -> String {
        self.app
            .state
            .auth_service
            .issue_token("user-1", roles)
            .expect("token issuance failed")
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to read body")
            .to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }
}

#[tokio::test]
async fn health_endpoint_is_open() {
    let harness = ApiHarness::new().await;
    let (status, body) = harness.request(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "up");
    assert_eq!(body["database"], "up");
}

#[tokio::test]
async fn api_requires_a_bearer_token() {
    let harness = ApiHarness::new().await;
    let (status, _) = harness
        .request(Method::GET, "/api/v1/inventory/levels", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = harness
        .request(
            Method::GET,
            "/api/v1/inventory/levels",
            Some("garbage"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn viewers_can_read_but_not_mutate() {
    let harness = ApiHarness::new().await;
    let product = seed_product(&harness.app.db, "SKU-1").await;
    let wh = seed_warehouse(&harness.app.db, "Main").await;
    let viewer = harness.token(&["viewer"]);

    let (status, body) = harness
        .request(
            Method::GET,
            "/api/v1/inventory/levels",
            Some(&viewer),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _) = harness
        .request(
            Method::POST,
            "/api/v1/inventory/adjust",
            Some(&viewer),
            Some(json!({
                "product_id": product.id,
                "warehouse_id": wh.id,
                "counted_quantity": "5",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn managers_can_adjust_inventory() {
    let harness = ApiHarness::new().await;
    let product = seed_product(&harness.app.db, "SKU-1").await;
    let wh = seed_warehouse(&harness.app.db, "Main").await;
    let manager = harness.token(&["manager"]);

    let (status, body) = harness
        .request(
            Method::POST,
            "/api/v1/inventory/adjust",
            Some(&manager),
            Some(json!({
                "product_id": product.id,
                "warehouse_id": wh.id,
                "counted_quantity": "14",
                "reason": "stocktake",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let quantity: rust_decimal::Decimal = body["data"]["quantity"]
        .as_str()
        .expect("quantity should be a string")
        .parse()
        .expect("quantity should parse");
    assert_eq!(quantity, dec(14));
}

#[tokio::test]
async fn adjust_accepts_quantity_as_field_name() {
    let harness = ApiHarness::new().await;
    let product = seed_product(&harness.app.db, "SKU-1").await;
    let wh = seed_warehouse(&harness.app.db, "Main").await;
    let manager = harness.token(&["manager"]);

    let (status, body) = harness
        .request(
            Method::POST,
            "/api/v1/inventory/adjust",
            Some(&manager),
            Some(json!({
                "product_id": product.id,
                "warehouse_id": wh.id,
                "quantity": "9",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let quantity: rust_decimal::Decimal = body["data"]["quantity"]
        .as_str()
        .expect("quantity should be a string")
        .parse()
        .expect("quantity should parse");
    assert_eq!(quantity, dec(9));
}

#[tokio::test]
async fn insufficient_stock_maps_to_bad_request() {
    let harness = ApiHarness::new().await;
    let product = seed_product(&harness.app.db, "SKU-1").await;
    let wh = seed_warehouse(&harness.app.db, "Main").await;
    harness
        .app
        .state
        .stock_ledger
        .record_movement(NewMovement::new(product.id, wh.id, MovementType::In, dec(2)))
        .await
        .expect("stocking failed");
    let manager = harness.token(&["manager"]);

    let (status, _) = harness
        .request(
            Method::POST,
            "/api/v1/stock-movements/out",
            Some(&manager),
            Some(json!({
                "product_id": product.id,
                "warehouse_id": wh.id,
                "quantity": "5",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_order_maps_to_not_found() {
    let harness = ApiHarness::new().await;
    let manager = harness.token(&["manager"]);
    let (status, _) = harness
        .request(
            Method::GET,
            &format!("/api/v1/purchase-orders/{}", uuid::Uuid::new_v4()),
            Some(&manager),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
