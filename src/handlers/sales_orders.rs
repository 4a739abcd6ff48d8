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
    entities::sales_order,
    handlers::common::{validate_input, PaginationParams},
    handlers::purchase_orders::AllocationRequest,
    services::sales_orders::{
        CreateSalesOrder, FulfillSalesOrder, SalesOrderItemInput, SalesOrderView,
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SalesOrderItemRequest {
    pub product_id: Uuid,
    #[schema(example = "3.0")]
    pub qty: Decimal,
    #[schema(example = "19.99")]
    pub unit_price: Decimal,
    /// Absolute discount on the line total
    pub discount: Option<Decimal>,
    /// Optional sourcing plan; when every item carries one, confirming the
    /// order fulfills it immediately
    #[serde(default)]
    pub allocations: Vec<AllocationRequest>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateSalesOrderRequest {
    pub customer_id: Uuid,
    #[validate(length(min = 1))]
    pub items: Vec<SalesOrderItemRequest>,
}

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct FulfillSalesOrderRequest {
    /// item id -> warehouse splits; takes precedence over the stored plan
    pub allocations: Option<HashMap<Uuid, Vec<AllocationRequest>>>,
    /// Fallback: draw every line from this single warehouse
    pub warehouse_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SalesOrderSummary {
    pub id: Uuid,
    pub customer_id: Uuid,
    #[schema(example = "DRAFT")]
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<sales_order::Model> for SalesOrderSummary {
    fn from(model: sales_order::Model) -> Self {
        Self {
            id: model.id,
            customer_id: model.customer_id,
            status: model.status,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/sales-orders",
    request_body = CreateSalesOrderRequest,
    responses(
        (status = 200, description = "Sales order created", body = serde_json::Value),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown customer", body = crate::errors::ErrorResponse)
    ),
    tag = "sales-orders"
)]
pub async fn create_sales_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateSalesOrderRequest>,
) -> ApiResult<SalesOrderView> {
    require_staff(&user)?;
    validate_input(&payload)?;

    let input = CreateSalesOrder {
        customer_id: payload.customer_id,
        items: payload
            .items
            .into_iter()
            .map(|item| SalesOrderItemInput {
                product_id: item.product_id,
                qty: item.qty,
                unit_price: item.unit_price,
                discount: item.discount,
                allocations: item.allocations.into_iter().map(Into::into).collect(),
            })
            .collect(),
    };
    let view = state.sales_orders.create(input).await?;
    Ok(Json(ApiResponse::success(view)))
}

#[utoipa::path(
    get,
    path = "/api/v1/sales-orders",
    params(PaginationParams),
    responses(
        (status = 200, description = "Sales orders listed", body = ApiResponse<PaginatedResponse<SalesOrderSummary>>)
    ),
    tag = "sales-orders"
)]
pub async fn list_sales_orders(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(params): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<SalesOrderSummary>> {
    let (page, per_page) = params.clamped();
    let (orders, total) = state.sales_orders.list(page, per_page).await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        orders.into_iter().map(SalesOrderSummary::from).collect(),
        page,
        per_page,
        total,
    ))))
}

#[utoipa::path(
    get,
    path = "/api/v1/sales-orders/{id}",
    params(("id" = Uuid, Path, description = "Sales order ID")),
    responses(
        (status = 200, description = "Sales order fetched", body = serde_json::Value),
        (status = 404, description = "Sales order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "sales-orders"
)]
pub async fn get_sales_order(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<SalesOrderView> {
    let view = state.sales_orders.get(id).await?;
    Ok(Json(ApiResponse::success(view)))
}

#[utoipa::path(
    post,
    path = "/api/v1/sales-orders/{id}/confirm",
    params(("id" = Uuid, Path, description = "Sales order ID")),
    responses(
        (status = 200, description = "Sales order confirmed", body = serde_json::Value),
        (status = 400, description = "Order is not in DRAFT or stock is insufficient", body = crate::errors::ErrorResponse),
        (status = 404, description = "Sales order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "sales-orders"
)]
pub async fn confirm_sales_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<SalesOrderView> {
    require_staff(&user)?;
    let view = state.sales_orders.confirm(id, Some(user.user_id)).await?;
    Ok(Json(ApiResponse::success(view)))
}

#[utoipa::path(
    post,
    path = "/api/v1/sales-orders/{id}/fulfill",
    params(("id" = Uuid, Path, description = "Sales order ID")),
    request_body = FulfillSalesOrderRequest,
    responses(
        (status = 200, description = "Sales order fulfilled", body = serde_json::Value),
        (status = 400, description = "Invalid allocations or insufficient stock", body = crate::errors::ErrorResponse),
        (status = 404, description = "Sales order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "sales-orders"
)]
pub async fn fulfill_sales_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<FulfillSalesOrderRequest>,
) -> ApiResult<SalesOrderView> {
    require_staff(&user)?;
    let input = FulfillSalesOrder {
        allocations: payload.allocations.map(|map| {
            map.into_iter()
                .map(|(item_id, allocs)| {
                    (item_id, allocs.into_iter().map(Into::into).collect())
                })
                .collect()
        }),
        warehouse_id: payload.warehouse_id,
    };
    let view = state
        .sales_orders
        .fulfill(id, input, Some(user.user_id))
        .await?;
    Ok(Json(ApiResponse::success(view)))
}
