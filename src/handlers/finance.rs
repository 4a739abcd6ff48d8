use axum::{
    extract::{Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::financial_transaction::{self, TransactionKind},
    errors::ServiceError,
    services::finance::TransactionQuery,
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Deserialize, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TransactionListParams {
    /// INCOME or EXPENSE
    pub kind: Option<String>,
    pub purchase_order_id: Option<Uuid>,
    pub sales_order_id: Option<Uuid>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionView {
    pub id: Uuid,
    #[schema(example = "INCOME")]
    pub kind: String,
    #[schema(example = "59.97")]
    pub amount: Decimal,
    pub description: Option<String>,
    pub purchase_order_id: Option<Uuid>,
    pub sales_order_id: Option<Uuid>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<financial_transaction::Model> for TransactionView {
    fn from(model: financial_transaction::Model) -> Self {
        Self {
            id: model.id,
            kind: model.kind,
            amount: model.amount,
            description: model.description,
            purchase_order_id: model.purchase_order_id,
            sales_order_id: model.sales_order_id,
            created_by: model.created_by,
            created_at: model.created_at,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/finances/transactions",
    params(TransactionListParams),
    responses(
        (status = 200, description = "Transactions listed", body = ApiResponse<PaginatedResponse<TransactionView>>),
        (status = 400, description = "Invalid filter", body = crate::errors::ErrorResponse)
    ),
    tag = "finances"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(params): Query<TransactionListParams>,
) -> ApiResult<PaginatedResponse<TransactionView>> {
    let kind = params
        .kind
        .as_deref()
        .map(|raw| {
            raw.parse::<TransactionKind>().map_err(|_| {
                ServiceError::ValidationError(format!("unknown transaction kind: {raw}"))
            })
        })
        .transpose()?;

    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(20).clamp(1, 100);
    let (rows, total) = state
        .finance
        .list_transactions(TransactionQuery {
            kind,
            purchase_order_id: params.purchase_order_id,
            sales_order_id: params.sales_order_id,
            page,
            per_page,
        })
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        rows.into_iter().map(TransactionView::from).collect(),
        page,
        per_page,
        total,
    ))))
}
