use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{require_staff, AuthUser},
    entities::inventory_level,
    handlers::common::validate_input,
    services::stock_ledger::LevelsQuery,
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AdjustInventoryRequest {
    /// Product UUID
    pub product_id: Uuid,
    /// Warehouse UUID
    pub warehouse_id: Uuid,
    /// Absolute counted quantity from the stocktake
    #[serde(alias = "quantity")]
    #[schema(example = "42.0")]
    pub counted_quantity: Decimal,
    /// Optional free-text reason
    #[validate(length(min = 1, max = 512))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LevelsParams {
    pub product_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InventoryLevelView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    #[schema(example = "42.0")]
    pub quantity: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl From<inventory_level::Model> for InventoryLevelView {
    fn from(model: inventory_level::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            warehouse_id: model.warehouse_id,
            quantity: model.quantity,
            updated_at: model.updated_at,
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory/adjust",
    request_body = AdjustInventoryRequest,
    responses(
        (status = 200, description = "Inventory adjusted", body = ApiResponse<InventoryLevelView>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown product or warehouse", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn adjust_inventory(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AdjustInventoryRequest>,
) -> ApiResult<InventoryLevelView> {
    require_staff(&user)?;
    validate_input(&payload)?;

    let level = state
        .inventory
        .adjust(
            payload.product_id,
            payload.warehouse_id,
            payload.counted_quantity,
            payload.reason,
        )
        .await?;
    Ok(Json(ApiResponse::success(level.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/levels",
    params(LevelsParams),
    responses(
        (status = 200, description = "Levels listed", body = ApiResponse<Vec<InventoryLevelView>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn get_levels(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(params): Query<LevelsParams>,
) -> ApiResult<Vec<InventoryLevelView>> {
    let levels = state
        .stock_ledger
        .get_levels(LevelsQuery {
            product_id: params.product_id,
            warehouse_id: params.warehouse_id,
        })
        .await?;
    Ok(Json(ApiResponse::success(
        levels.into_iter().map(InventoryLevelView::from).collect(),
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/products/{id}",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Levels for product", body = ApiResponse<Vec<InventoryLevelView>>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn get_product_levels(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<InventoryLevelView>> {
    let levels = state.inventory.levels_by_product(id).await?;
    Ok(Json(ApiResponse::success(
        levels.into_iter().map(InventoryLevelView::from).collect(),
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/warehouses/{id}",
    params(("id" = Uuid, Path, description = "Warehouse ID")),
    responses(
        (status = 200, description = "Levels in warehouse", body = ApiResponse<Vec<InventoryLevelView>>),
        (status = 404, description = "Warehouse not found", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn get_warehouse_levels(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<InventoryLevelView>> {
    let levels = state.inventory.levels_by_warehouse(id).await?;
    Ok(Json(ApiResponse::success(
        levels.into_iter().map(InventoryLevelView::from).collect(),
    )))
}
