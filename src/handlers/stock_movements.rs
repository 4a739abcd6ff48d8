use axum::{
    extract::{Query, State},
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
    entities::stock_movement::{self, MovementType},
    errors::ServiceError,
    handlers::common::validate_input,
    services::stock_ledger::{MovementQuery, NewMovement},
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RecordMovementRequest {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    /// Positive quantity to move
    #[schema(example = "10.0")]
    pub quantity: Decimal,
    #[validate(length(min = 1, max = 512))]
    pub reason: Option<String>,
    /// External document reference, e.g. a delivery note number
    #[validate(length(min = 1, max = 128))]
    pub ref_document: Option<String>,
}

#[derive(Debug, Deserialize, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MovementListParams {
    pub product_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    /// IN, OUT or ADJUST
    pub movement_type: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StockMovementView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    #[schema(example = "IN")]
    pub movement_type: String,
    #[schema(example = "10.0")]
    pub quantity: Decimal,
    pub reason: Option<String>,
    pub ref_document: Option<String>,
    pub purchase_order_id: Option<Uuid>,
    pub sales_order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<stock_movement::Model> for StockMovementView {
    fn from(model: stock_movement::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            warehouse_id: model.warehouse_id,
            movement_type: model.movement_type,
            quantity: model.quantity,
            reason: model.reason,
            ref_document: model.ref_document,
            purchase_order_id: model.purchase_order_id,
            sales_order_id: model.sales_order_id,
            created_at: model.created_at,
        }
    }
}

async fn record(
    state: AppState,
    payload: RecordMovementRequest,
    movement_type: MovementType,
) -> ApiResult<StockMovementView> {
    let mut movement = NewMovement::new(
        payload.product_id,
        payload.warehouse_id,
        movement_type,
        payload.quantity,
    );
    movement.reason = payload.reason;
    movement.ref_document = payload.ref_document;

    let created = state.stock_ledger.record_movement(movement).await?;
    Ok(Json(ApiResponse::success(created.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/stock-movements/in",
    request_body = RecordMovementRequest,
    responses(
        (status = 200, description = "Inbound movement recorded", body = ApiResponse<StockMovementView>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown product or warehouse", body = crate::errors::ErrorResponse)
    ),
    tag = "stock-movements"
)]
pub async fn record_inbound(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<RecordMovementRequest>,
) -> ApiResult<StockMovementView> {
    require_staff(&user)?;
    validate_input(&payload)?;
    record(state, payload, MovementType::In).await
}

#[utoipa::path(
    post,
    path = "/api/v1/stock-movements/out",
    request_body = RecordMovementRequest,
    responses(
        (status = 200, description = "Outbound movement recorded", body = ApiResponse<StockMovementView>),
        (status = 400, description = "Invalid request or insufficient stock", body = crate::errors::ErrorResponse)
    ),
    tag = "stock-movements"
)]
pub async fn record_outbound(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<RecordMovementRequest>,
) -> ApiResult<StockMovementView> {
    require_staff(&user)?;
    validate_input(&payload)?;
    record(state, payload, MovementType::Out).await
}

#[utoipa::path(
    get,
    path = "/api/v1/stock-movements",
    params(MovementListParams),
    responses(
        (status = 200, description = "Ledger history", body = ApiResponse<PaginatedResponse<StockMovementView>>),
        (status = 400, description = "Invalid filter", body = crate::errors::ErrorResponse)
    ),
    tag = "stock-movements"
)]
pub async fn list_movements(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(params): Query<MovementListParams>,
) -> ApiResult<PaginatedResponse<StockMovementView>> {
    let movement_type = params
        .movement_type
        .as_deref()
        .map(|raw| {
            raw.parse::<MovementType>().map_err(|_| {
                ServiceError::ValidationError(format!("unknown movement type: {raw}"))
            })
        })
        .transpose()?;

    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(20).clamp(1, 100);
    let (movements, total) = state
        .stock_ledger
        .list_movements(MovementQuery {
            product_id: params.product_id,
            warehouse_id: params.warehouse_id,
            movement_type,
            page,
            per_page,
        })
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        movements.into_iter().map(StockMovementView::from).collect(),
        page,
        per_page,
        total,
    ))))
}
