use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    entities::financial_transaction::{self, TransactionKind},
    errors::ServiceError,
};

/// Typed filter for the transaction listing.
#[derive(Debug, Clone)]
pub struct TransactionQuery {
    pub kind: Option<TransactionKind>,
    pub purchase_order_id: Option<Uuid>,
    pub sales_order_id: Option<Uuid>,
    pub page: u64,
    pub per_page: u64,
}

impl Default for TransactionQuery {
    fn default() -> Self {
        Self {
            kind: None,
            purchase_order_id: None,
            sales_order_id: None,
            page: 1,
            per_page: 20,
        }
    }
}

/// Bookkeeping side of receipts and fulfillments. The order services call
/// the record methods after their ledger transaction commits and only log
/// when a write fails, so the books can lag the ledger but the ledger is
/// never held hostage by the books.
#[derive(Clone)]
pub struct FinanceService {
    db: Arc<DatabaseConnection>,
}

impl FinanceService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn record_expense(
        &self,
        amount: Decimal,
        description: Option<String>,
        purchase_order_id: Option<Uuid>,
        created_by: Option<String>,
    ) -> Result<financial_transaction::Model, ServiceError> {
        self.record(
            TransactionKind::Expense,
            amount,
            description,
            purchase_order_id,
            None,
            created_by,
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn record_income(
        &self,
        amount: Decimal,
        description: Option<String>,
        sales_order_id: Option<Uuid>,
        created_by: Option<String>,
    ) -> Result<financial_transaction::Model, ServiceError> {
        self.record(
            TransactionKind::Income,
            amount,
            description,
            None,
            sales_order_id,
            created_by,
        )
        .await
    }

    async fn record(
        &self,
        kind: TransactionKind,
        amount: Decimal,
        description: Option<String>,
        purchase_order_id: Option<Uuid>,
        sales_order_id: Option<Uuid>,
        created_by: Option<String>,
    ) -> Result<financial_transaction::Model, ServiceError> {
        if amount < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "transaction amount cannot be negative".to_string(),
            ));
        }
        let row = financial_transaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            kind: Set(kind.to_string()),
            amount: Set(amount),
            description: Set(description),
            purchase_order_id: Set(purchase_order_id),
            sales_order_id: Set(sales_order_id),
            created_by: Set(created_by),
            ..Default::default()
        };
        row.insert(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self))]
    pub async fn list_transactions(
        &self,
        query: TransactionQuery,
    ) -> Result<(Vec<financial_transaction::Model>, u64), ServiceError> {
        let mut select = financial_transaction::Entity::find();
        if let Some(kind) = query.kind {
            select = select.filter(financial_transaction::Column::Kind.eq(kind.as_ref()));
        }
        if let Some(po_id) = query.purchase_order_id {
            select = select.filter(financial_transaction::Column::PurchaseOrderId.eq(po_id));
        }
        if let Some(so_id) = query.sales_order_id {
            select = select.filter(financial_transaction::Column::SalesOrderId.eq(so_id));
        }
        let paginator = select
            .order_by_desc(financial_transaction::Column::CreatedAt)
            .paginate(self.db.as_ref(), query.per_page.max(1));
        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::db_error)?;
        let rows = paginator
            .fetch_page(query.page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((rows, total))
    }
}
