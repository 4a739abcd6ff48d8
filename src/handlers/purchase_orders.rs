use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{require_staff, AuthUser},
    entities::purchase_order,
    handlers::common::{validate_input, PaginationParams},
    services::purchase_orders::{
        AllocationInput, CreatePurchaseOrder, PurchaseOrderItemInput, PurchaseOrderView,
        ReceivePurchaseOrder,
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AllocationRequest {
    pub warehouse_id: Uuid,
    #[schema(example = "5.0")]
    pub qty: Decimal,
}

impl From<AllocationRequest> for AllocationInput {
    fn from(req: AllocationRequest) -> Self {
        Self {
            warehouse_id: req.warehouse_id,
            qty: req.qty,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PurchaseOrderItemRequest {
    pub product_id: Uuid,
    #[schema(example = "10.0")]
    pub qty_ordered: Decimal,
    #[schema(example = "4.99")]
    pub unit_price: Decimal,
    /// Optional delivery plan; when every item carries one, marking the
    /// order as ordered books the stock immediately
    #[serde(default)]
    pub allocations: Vec<AllocationRequest>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePurchaseOrderRequest {
    pub supplier_id: Uuid,
    pub expected_at: Option<DateTime<Utc>>,
    #[validate(length(min = 1))]
    pub items: Vec<PurchaseOrderItemRequest>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReceivePurchaseOrderRequest {
    pub warehouse_id: Uuid,
    /// item id -> quantity delivered in this receipt; must not be empty
    pub received_quantities: HashMap<Uuid, Decimal>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PurchaseOrderSummary {
    pub id: Uuid,
    pub supplier_id: Uuid,
    #[schema(example = "DRAFT")]
    pub status: String,
    pub expected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<purchase_order::Model> for PurchaseOrderSummary {
    fn from(model: purchase_order::Model) -> Self {
        Self {
            id: model.id,
            supplier_id: model.supplier_id,
            status: model.status,
            expected_at: model.expected_at,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders",
    request_body = CreatePurchaseOrderRequest,
    responses(
        (status = 200, description = "Purchase order created", body = serde_json::Value),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown supplier", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn create_purchase_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreatePurchaseOrderRequest>,
) -> ApiResult<PurchaseOrderView> {
    require_staff(&user)?;
    validate_input(&payload)?;

    let input = CreatePurchaseOrder {
        supplier_id: payload.supplier_id,
        expected_at: payload.expected_at,
        items: payload
            .items
            .into_iter()
            .map(|item| PurchaseOrderItemInput {
                product_id: item.product_id,
                qty_ordered: item.qty_ordered,
                unit_price: item.unit_price,
                allocations: item.allocations.into_iter().map(Into::into).collect(),
            })
            .collect(),
    };
    let view = state.purchase_orders.create(input).await?;
    Ok(Json(ApiResponse::success(view)))
}

#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders",
    params(PaginationParams),
    responses(
        (status = 200, description = "Purchase orders listed", body = ApiResponse<PaginatedResponse<PurchaseOrderSummary>>)
    ),
    tag = "purchase-orders"
)]
pub async fn list_purchase_orders(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(params): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<PurchaseOrderSummary>> {
    let (page, per_page) = params.clamped();
    let (orders, total) = state.purchase_orders.list(page, per_page).await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        orders.into_iter().map(PurchaseOrderSummary::from).collect(),
        page,
        per_page,
        total,
    ))))
}

#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders/{id}",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    responses(
        (status = 200, description = "Purchase order fetched", body = serde_json::Value),
        (status = 404, description = "Purchase order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn get_purchase_order(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<PurchaseOrderView> {
    let view = state.purchase_orders.get(id).await?;
    Ok(Json(ApiResponse::success(view)))
}

#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/order",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    responses(
        (status = 200, description = "Order placed with the supplier", body = serde_json::Value),
        (status = 400, description = "Order is not in DRAFT", body = crate::errors::ErrorResponse),
        (status = 404, description = "Purchase order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn mark_ordered(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<PurchaseOrderView> {
    require_staff(&user)?;
    let view = state
        .purchase_orders
        .mark_ordered(id, Some(user.user_id))
        .await?;
    Ok(Json(ApiResponse::success(view)))
}

#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/receive",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    request_body = ReceivePurchaseOrderRequest,
    responses(
        (status = 200, description = "Delivery booked", body = serde_json::Value),
        (status = 400, description = "Invalid receipt", body = crate::errors::ErrorResponse),
        (status = 404, description = "Purchase order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn receive_purchase_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReceivePurchaseOrderRequest>,
) -> ApiResult<PurchaseOrderView> {
    require_staff(&user)?;
    let input = ReceivePurchaseOrder {
        warehouse_id: payload.warehouse_id,
        received_quantities: payload.received_quantities,
    };
    let view = state
        .purchase_orders
        .receive(id, input, Some(user.user_id))
        .await?;
    Ok(Json(ApiResponse::success(view)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn create_request_rejects_empty_items() {
        let request = CreatePurchaseOrderRequest {
            supplier_id: Uuid::new_v4(),
            expected_at: None,
            items: Vec::new(),
        };
        assert!(validate_input(&request).is_err());
    }

    #[test]
    fn create_request_accepts_item_with_allocations() {
        let request = CreatePurchaseOrderRequest {
            supplier_id: Uuid::new_v4(),
            expected_at: None,
            items: vec![PurchaseOrderItemRequest {
                product_id: Uuid::new_v4(),
                qty_ordered: dec!(10),
                unit_price: dec!(4.99),
                allocations: vec![AllocationRequest {
                    warehouse_id: Uuid::new_v4(),
                    qty: dec!(10),
                }],
            }],
        };
        assert!(validate_input(&request).is_ok());
    }
}
