//! Sales order workflow: DRAFT -> CONFIRMED -> FULFILLED.
//!
//! Fulfillment sources stock from one of three places, in precedence order:
//! explicit allocations in the request, the allocation plan stored at order
//! creation, or a single warehouse applied to every line. Whatever the
//! source, every line is validated for coverage and stock sufficiency
//! before the first movement is written.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    DbBackend, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        customer, order_allocation,
        sales_order::{self, SalesOrderStatus},
        sales_order_item,
        stock_movement::MovementType,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        finance::FinanceService,
        purchase_orders::{allocation_tolerance, ensure_products_exist, AllocationInput},
        stock_ledger::{apply_allocations, ensure_warehouse_active, level_quantity, AllocationLine},
    },
};

#[derive(Debug, Clone)]
pub struct SalesOrderItemInput {
    pub product_id: Uuid,
    pub qty: Decimal,
    pub unit_price: Decimal,
    pub discount: Option<Decimal>,
    pub allocations: Vec<AllocationInput>,
}

#[derive(Debug, Clone)]
pub struct CreateSalesOrder {
    pub customer_id: Uuid,
    pub items: Vec<SalesOrderItemInput>,
}

/// Fulfillment request. `allocations` maps order item ids to warehouse
/// splits; when absent the stored plan, then `warehouse_id`, are consulted.
#[derive(Debug, Clone, Default)]
pub struct FulfillSalesOrder {
    pub allocations: Option<HashMap<Uuid, Vec<AllocationInput>>>,
    pub warehouse_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SalesOrderItemView {
    #[serde(flatten)]
    pub item: sales_order_item::Model,
    pub allocations: Vec<order_allocation::Model>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SalesOrderView {
    #[serde(flatten)]
    pub order: sales_order::Model,
    pub items: Vec<SalesOrderItemView>,
}

#[derive(Clone)]
pub struct SalesOrderService {
    db: Arc<DatabaseConnection>,
    finance: FinanceService,
    event_sender: EventSender,
}

impl SalesOrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        finance: FinanceService,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            finance,
            event_sender,
        }
    }

    #[instrument(skip(self, input))]
    pub async fn create(&self, input: CreateSalesOrder) -> Result<SalesOrderView, ServiceError> {
        if input.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "sales order must contain at least one item".to_string(),
            ));
        }
        for item in &input.items {
            if item.qty <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "item quantity must be positive".to_string(),
                ));
            }
            if item.unit_price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "unit price cannot be negative".to_string(),
                ));
            }
            if item.discount.unwrap_or(Decimal::ZERO) < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "discount cannot be negative".to_string(),
                ));
            }
            for alloc in &item.allocations {
                if alloc.qty <= Decimal::ZERO {
                    return Err(ServiceError::ValidationError(
                        "allocation quantity must be positive".to_string(),
                    ));
                }
            }
        }

        let db = self.db.as_ref();
        customer::find_active()
            .filter(customer::Column::Id.eq(input.customer_id))
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("customer {}", input.customer_id)))?;
        ensure_products_exist(db, input.items.iter().map(|i| i.product_id)).await?;

        let txn = db.begin().await.map_err(ServiceError::db_error)?;
        let order_id = Uuid::new_v4();
        let order = sales_order::ActiveModel {
            id: Set(order_id),
            customer_id: Set(input.customer_id),
            status: Set(SalesOrderStatus::Draft.to_string()),
            deleted_at: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        order.insert(&txn).await.map_err(ServiceError::db_error)?;

        for item in &input.items {
            let item_id = Uuid::new_v4();
            let row = sales_order_item::ActiveModel {
                id: Set(item_id),
                sales_order_id: Set(order_id),
                product_id: Set(item.product_id),
                qty: Set(item.qty),
                unit_price: Set(item.unit_price),
                discount: Set(item.discount.unwrap_or(Decimal::ZERO)),
            };
            row.insert(&txn).await.map_err(ServiceError::db_error)?;
            for alloc in &item.allocations {
                let row = order_allocation::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    purchase_order_item_id: Set(None),
                    sales_order_item_id: Set(Some(item_id)),
                    warehouse_id: Set(alloc.warehouse_id),
                    qty: Set(alloc.qty),
                };
                row.insert(&txn).await.map_err(ServiceError::db_error)?;
            }
        }
        txn.commit().await.map_err(ServiceError::db_error)?;

        if let Err(e) = self.event_sender.send(Event::SalesOrderCreated(order_id)).await {
            warn!(error = %e, "failed to publish sales order event");
        }
        self.get(order_id).await
    }

    /// DRAFT -> CONFIRMED, or straight to FULFILLED when a stored plan
    /// fully covers the order and stock suffices everywhere.
    #[instrument(skip(self))]
    pub async fn confirm(
        &self,
        id: Uuid,
        actor: Option<String>,
    ) -> Result<SalesOrderView, ServiceError> {
        // The locking read serializes concurrent transitions on the same
        // order; an early error drops the transaction and rolls it back.
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let order = load_order_for_update(&txn, id).await?;
        match order.status() {
            Some(SalesOrderStatus::Draft) => {}
            Some(other) => {
                return Err(ServiceError::InvalidStatus(format!(
                    "sales order {id} is {other}, expected DRAFT"
                )))
            }
            None => {
                return Err(ServiceError::InternalError(format!(
                    "sales order {id} carries unknown status {}",
                    order.status
                )))
            }
        }

        let items = load_items(&txn, id).await?;
        let allocations = load_so_allocations(&txn, &items).await?;

        if allocations.is_empty() {
            let mut active: sales_order::ActiveModel = order.into();
            active.status = Set(SalesOrderStatus::Confirmed.to_string());
            active.updated_at = Set(Utc::now());
            active.update(&txn).await.map_err(ServiceError::db_error)?;
            txn.commit().await.map_err(ServiceError::db_error)?;

            if let Err(e) = self.event_sender.send(Event::SalesOrderConfirmed(id)).await {
                warn!(error = %e, "failed to publish sales order event");
            }
            return self.get(id).await;
        }

        let mut lines = Vec::new();
        for item in &items {
            let item_allocs: Vec<AllocationInput> = allocations
                .iter()
                .filter(|a| a.sales_order_item_id == Some(item.id))
                .map(|a| AllocationInput {
                    warehouse_id: a.warehouse_id,
                    qty: a.qty,
                })
                .collect();
            check_coverage(item, &item_allocs)?;
            for alloc in item_allocs {
                lines.push(AllocationLine {
                    product_id: item.product_id,
                    warehouse_id: alloc.warehouse_id,
                    qty: alloc.qty,
                });
            }
        }
        validate_stock(&txn, &lines).await?;
        self.commit_fulfillment(txn, order, &items, &lines, actor)
            .await?;
        self.get(id).await
    }

    #[instrument(skip(self, input))]
    pub async fn fulfill(
        &self,
        id: Uuid,
        input: FulfillSalesOrder,
        actor: Option<String>,
    ) -> Result<SalesOrderView, ServiceError> {
        // Status check, stock validation and the outbound movements share
        // one transaction, so two overlapping fulfillments cannot both pass
        // the FULFILLED guard and double-decrement stock.
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let order = load_order_for_update(&txn, id).await?;
        if order.status() == Some(SalesOrderStatus::Fulfilled) {
            return Err(ServiceError::InvalidStatus(format!(
                "sales order {id} is already FULFILLED"
            )));
        }

        let items = load_items(&txn, id).await?;
        let lines = resolve_lines(&txn, &items, &input).await?;
        validate_stock(&txn, &lines).await?;
        self.commit_fulfillment(txn, order, &items, &lines, actor)
            .await?;
        self.get(id).await
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<SalesOrderView, ServiceError> {
        let db = self.db.as_ref();
        let order = load_order(db, id).await?;
        let items = load_items(db, id).await?;
        let allocations = load_so_allocations(db, &items).await?;
        Ok(assemble_view(order, items, allocations))
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<sales_order::Model>, u64), ServiceError> {
        let paginator = sales_order::find_active()
            .order_by_desc(sales_order::Column::CreatedAt)
            .paginate(self.db.as_ref(), per_page.max(1));
        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::db_error)?;
        let orders = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((orders, total))
    }

    /// Writes the movements, flips the order to FULFILLED and commits, then
    /// records income and publishes the event best-effort.
    async fn commit_fulfillment(
        &self,
        txn: DatabaseTransaction,
        order: sales_order::Model,
        items: &[sales_order_item::Model],
        lines: &[AllocationLine],
        actor: Option<String>,
    ) -> Result<(), ServiceError> {
        let id = order.id;
        apply_allocations(
            &txn,
            lines,
            MovementType::Out,
            "Sales order fulfillment",
            &format!("SO-{id}"),
            None,
            Some(id),
        )
        .await?;
        let mut active: sales_order::ActiveModel = order.into();
        active.status = Set(SalesOrderStatus::Fulfilled.to_string());
        active.updated_at = Set(Utc::now());
        active.update(&txn).await.map_err(ServiceError::db_error)?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        let revenue: Decimal = items.iter().map(|i| i.net_amount()).sum();
        if let Err(e) = self
            .finance
            .record_income(
                revenue,
                Some(format!("Sales order {id} fulfilled")),
                Some(id),
                actor,
            )
            .await
        {
            warn!(order_id = %id, error = %e, "failed to record sales income");
        }
        if let Err(e) = self.event_sender.send(Event::SalesOrderFulfilled(id)).await {
            warn!(error = %e, "failed to publish sales order event");
        }
        Ok(())
    }
}

/// Allocations for one line must cover its quantity to within the shared
/// tolerance.
fn check_coverage(
    item: &sales_order_item::Model,
    allocations: &[AllocationInput],
) -> Result<(), ServiceError> {
    let covered: Decimal = allocations.iter().map(|a| a.qty).sum();
    if (covered - item.qty).abs() > allocation_tolerance() {
        return Err(ServiceError::ValidationError(format!(
            "allocations for product {} cover {covered}, item quantity is {}",
            item.product_id, item.qty
        )));
    }
    Ok(())
}

/// Picks the allocation source for a fulfillment and validates coverage.
async fn resolve_lines<C: ConnectionTrait>(
    conn: &C,
    items: &[sales_order_item::Model],
    input: &FulfillSalesOrder,
) -> Result<Vec<AllocationLine>, ServiceError> {
    if let Some(request_allocs) = input
        .allocations
        .as_ref()
        .filter(|map| !map.is_empty())
    {
        for item_id in request_allocs.keys() {
            if !items.iter().any(|i| i.id == *item_id) {
                return Err(ServiceError::ValidationError(format!(
                    "item {item_id} does not belong to this order"
                )));
            }
        }
        let mut lines = Vec::new();
        for item in items {
            let item_allocs = request_allocs
                .get(&item.id)
                .cloned()
                .unwrap_or_default();
            check_coverage(item, &item_allocs)?;
            for alloc in item_allocs {
                ensure_warehouse_active(conn, alloc.warehouse_id).await?;
                lines.push(AllocationLine {
                    product_id: item.product_id,
                    warehouse_id: alloc.warehouse_id,
                    qty: alloc.qty,
                });
            }
        }
        return Ok(lines);
    }

    let stored = load_so_allocations(conn, items).await?;
    if !stored.is_empty() {
        let mut lines = Vec::new();
        for item in items {
            let item_allocs: Vec<AllocationInput> = stored
                .iter()
                .filter(|a| a.sales_order_item_id == Some(item.id))
                .map(|a| AllocationInput {
                    warehouse_id: a.warehouse_id,
                    qty: a.qty,
                })
                .collect();
            check_coverage(item, &item_allocs)?;
            for alloc in item_allocs {
                lines.push(AllocationLine {
                    product_id: item.product_id,
                    warehouse_id: alloc.warehouse_id,
                    qty: alloc.qty,
                });
            }
        }
        return Ok(lines);
    }

    if let Some(warehouse_id) = input.warehouse_id {
        ensure_warehouse_active(conn, warehouse_id).await?;
        return Ok(items
            .iter()
            .map(|item| AllocationLine {
                product_id: item.product_id,
                warehouse_id,
                qty: item.qty,
            })
            .collect());
    }

    Err(ServiceError::ValidationError(
        "no allocations supplied, no stored plan, and no warehouse given".to_string(),
    ))
}

/// Per (product, warehouse) pair the aggregated outbound quantity must fit
/// in the current level. Runs inside the fulfillment transaction so the
/// check and the movements see the same state.
async fn validate_stock<C: ConnectionTrait>(
    conn: &C,
    lines: &[AllocationLine],
) -> Result<(), ServiceError> {
    let mut wanted: HashMap<(Uuid, Uuid), Decimal> = HashMap::new();
    for line in lines {
        *wanted
            .entry((line.product_id, line.warehouse_id))
            .or_insert(Decimal::ZERO) += line.qty;
    }
    for ((product_id, warehouse_id), qty) in wanted {
        let available = level_quantity(conn, product_id, warehouse_id).await?;
        if available < qty {
            return Err(ServiceError::InsufficientStock(format!(
                "product {product_id} in warehouse {warehouse_id}: need {qty}, have {available}"
            )));
        }
    }
    Ok(())
}

async fn load_order<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<sales_order::Model, ServiceError> {
    sales_order::find_active()
        .filter(sales_order::Column::Id.eq(id))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("sales order {id}")))
}

/// Locking variant of [`load_order`] for workflow transactions, so two
/// overlapping transitions on one order serialize on its row.
async fn load_order_for_update<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<sales_order::Model, ServiceError> {
    let mut query = sales_order::find_active().filter(sales_order::Column::Id.eq(id));
    if conn.get_database_backend() == DbBackend::Postgres {
        query = query.lock_exclusive();
    }
    query
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("sales order {id}")))
}

async fn load_items<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Vec<sales_order_item::Model>, ServiceError> {
    sales_order_item::Entity::find()
        .filter(sales_order_item::Column::SalesOrderId.eq(order_id))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

async fn load_so_allocations<C: ConnectionTrait>(
    conn: &C,
    items: &[sales_order_item::Model],
) -> Result<Vec<order_allocation::Model>, ServiceError> {
    if items.is_empty() {
        return Ok(Vec::new());
    }
    let item_ids: Vec<Uuid> = items.iter().map(|i| i.id).collect();
    order_allocation::Entity::find()
        .filter(order_allocation::Column::SalesOrderItemId.is_in(item_ids))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

fn assemble_view(
    order: sales_order::Model,
    items: Vec<sales_order_item::Model>,
    mut allocations: Vec<order_allocation::Model>,
) -> SalesOrderView {
    let items = items
        .into_iter()
        .map(|item| {
            let (mine, rest): (Vec<_>, Vec<_>) = allocations
                .drain(..)
                .partition(|a| a.sales_order_item_id == Some(item.id));
            allocations = rest;
            SalesOrderItemView {
                item,
                allocations: mine,
            }
        })
        .collect();
    SalesOrderView { order, items }
}
