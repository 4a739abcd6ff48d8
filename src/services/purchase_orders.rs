//! Purchase order workflow: DRAFT -> ORDERED -> RECEIVED.
//!
//! An order created with a full allocation plan skips the manual receive
//! path entirely: `mark_ordered` applies the plan as `IN` movements and
//! lands directly on RECEIVED.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        order_allocation, product,
        purchase_order::{self, PurchaseOrderStatus},
        purchase_order_item,
        stock_movement::MovementType,
        supplier,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        finance::FinanceService,
        stock_ledger::{apply_allocations, ensure_warehouse_active, AllocationLine},
    },
};

/// Rounding slack tolerated when an allocation plan is checked against its
/// line quantity.
pub(crate) const ALLOCATION_TOLERANCE_CENTS: i64 = 1;

pub(crate) fn allocation_tolerance() -> Decimal {
    Decimal::new(ALLOCATION_TOLERANCE_CENTS, 2)
}

#[derive(Debug, Clone)]
pub struct AllocationInput {
    pub warehouse_id: Uuid,
    pub qty: Decimal,
}

#[derive(Debug, Clone)]
pub struct PurchaseOrderItemInput {
    pub product_id: Uuid,
    pub qty_ordered: Decimal,
    pub unit_price: Decimal,
    pub allocations: Vec<AllocationInput>,
}

#[derive(Debug, Clone)]
pub struct CreatePurchaseOrder {
    pub supplier_id: Uuid,
    pub expected_at: Option<DateTime<Utc>>,
    pub items: Vec<PurchaseOrderItemInput>,
}

#[derive(Debug, Clone)]
pub struct ReceivePurchaseOrder {
    pub warehouse_id: Uuid,
    pub received_quantities: HashMap<Uuid, Decimal>,
}

/// Order line together with its stored allocation plan.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseOrderItemView {
    #[serde(flatten)]
    pub item: purchase_order_item::Model,
    pub allocations: Vec<order_allocation::Model>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseOrderView {
    #[serde(flatten)]
    pub order: purchase_order::Model,
    pub items: Vec<PurchaseOrderItemView>,
}

#[derive(Clone)]
pub struct PurchaseOrderService {
    db: Arc<DatabaseConnection>,
    finance: FinanceService,
    event_sender: EventSender,
}

impl PurchaseOrderService {
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
    pub async fn create(
        &self,
        input: CreatePurchaseOrder,
    ) -> Result<PurchaseOrderView, ServiceError> {
        if input.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "purchase order must contain at least one item".to_string(),
            ));
        }
        for item in &input.items {
            if item.qty_ordered <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "ordered quantity must be positive".to_string(),
                ));
            }
            if item.unit_price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "unit price cannot be negative".to_string(),
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
        supplier::find_active()
            .filter(supplier::Column::Id.eq(input.supplier_id))
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("supplier {}", input.supplier_id)))?;
        ensure_products_exist(db, input.items.iter().map(|i| i.product_id)).await?;

        let txn = db.begin().await.map_err(ServiceError::db_error)?;
        let order_id = Uuid::new_v4();
        let order = purchase_order::ActiveModel {
            id: Set(order_id),
            supplier_id: Set(input.supplier_id),
            status: Set(PurchaseOrderStatus::Draft.to_string()),
            expected_at: Set(input.expected_at),
            deleted_at: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        order.insert(&txn).await.map_err(ServiceError::db_error)?;

        for item in &input.items {
            let item_id = Uuid::new_v4();
            let row = purchase_order_item::ActiveModel {
                id: Set(item_id),
                purchase_order_id: Set(order_id),
                product_id: Set(item.product_id),
                qty_ordered: Set(item.qty_ordered),
                unit_price: Set(item.unit_price),
                qty_received: Set(Decimal::ZERO),
            };
            row.insert(&txn).await.map_err(ServiceError::db_error)?;
            for alloc in &item.allocations {
                let row = order_allocation::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    purchase_order_item_id: Set(Some(item_id)),
                    sales_order_item_id: Set(None),
                    warehouse_id: Set(alloc.warehouse_id),
                    qty: Set(alloc.qty),
                };
                row.insert(&txn).await.map_err(ServiceError::db_error)?;
            }
        }
        txn.commit().await.map_err(ServiceError::db_error)?;

        if let Err(e) = self
            .event_sender
            .send(Event::PurchaseOrderCreated(order_id))
            .await
        {
            warn!(error = %e, "failed to publish purchase order event");
        }
        self.get(order_id).await
    }

    /// DRAFT -> ORDERED, or straight to RECEIVED when the stored allocation
    /// plan fully covers every line.
    #[instrument(skip(self))]
    pub async fn mark_ordered(
        &self,
        id: Uuid,
        actor: Option<String>,
    ) -> Result<PurchaseOrderView, ServiceError> {
        // Status check and writes share one transaction; the locking read
        // serializes concurrent calls on the same order. An early error
        // drops the transaction and rolls it back.
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let order = load_order_for_update(&txn, id).await?;
        match order.status() {
            Some(PurchaseOrderStatus::Draft) => {}
            Some(other) => {
                return Err(ServiceError::InvalidStatus(format!(
                    "purchase order {id} is {other}, expected DRAFT"
                )))
            }
            None => {
                return Err(ServiceError::InternalError(format!(
                    "purchase order {id} carries unknown status {}",
                    order.status
                )))
            }
        }

        let items = load_items(&txn, id).await?;
        let allocations = load_po_allocations(&txn, &items).await?;

        if allocations.is_empty() {
            let mut active: purchase_order::ActiveModel = order.into();
            active.status = Set(PurchaseOrderStatus::Ordered.to_string());
            active.updated_at = Set(Utc::now());
            active.update(&txn).await.map_err(ServiceError::db_error)?;
            txn.commit().await.map_err(ServiceError::db_error)?;

            if let Err(e) = self
                .event_sender
                .send(Event::PurchaseOrderMarkedOrdered(id))
                .await
            {
                warn!(error = %e, "failed to publish purchase order event");
            }
            return self.get(id).await;
        }

        // Validate the plan in full before any write.
        let mut lines = Vec::new();
        for item in &items {
            let item_allocs: Vec<&order_allocation::Model> = allocations
                .iter()
                .filter(|a| a.purchase_order_item_id == Some(item.id))
                .collect();
            let planned: Decimal = item_allocs.iter().map(|a| a.qty).sum();
            if (planned - item.qty_ordered).abs() > allocation_tolerance() {
                return Err(ServiceError::ValidationError(format!(
                    "allocations for product {} sum to {planned}, ordered {}",
                    item.product_id, item.qty_ordered
                )));
            }
            for alloc in item_allocs {
                ensure_warehouse_active(&txn, alloc.warehouse_id).await?;
                lines.push(AllocationLine {
                    product_id: item.product_id,
                    warehouse_id: alloc.warehouse_id,
                    qty: alloc.qty,
                });
            }
        }

        apply_allocations(
            &txn,
            &lines,
            MovementType::In,
            "Purchase order received per allocation plan",
            &format!("PO-{id}"),
            Some(id),
            None,
        )
        .await?;
        for item in &items {
            let qty_ordered = item.qty_ordered;
            let mut active: purchase_order_item::ActiveModel = item.clone().into();
            active.qty_received = Set(qty_ordered);
            active.update(&txn).await.map_err(ServiceError::db_error)?;
        }
        let mut active: purchase_order::ActiveModel = order.into();
        active.status = Set(PurchaseOrderStatus::Received.to_string());
        active.updated_at = Set(Utc::now());
        active.update(&txn).await.map_err(ServiceError::db_error)?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        self.record_order_expense(id, &items, actor).await;
        if let Err(e) = self
            .event_sender
            .send(Event::PurchaseOrderReceived {
                order_id: id,
                fully_received: true,
            })
            .await
        {
            warn!(error = %e, "failed to publish purchase order event");
        }
        self.get(id).await
    }

    /// Books a partial or complete delivery into one warehouse. Receipts
    /// accumulate; over-receipt on any line rejects the whole call before
    /// any write.
    #[instrument(skip(self, input))]
    pub async fn receive(
        &self,
        id: Uuid,
        input: ReceivePurchaseOrder,
        actor: Option<String>,
    ) -> Result<PurchaseOrderView, ServiceError> {
        if input.received_quantities.is_empty() {
            return Err(ServiceError::ValidationError(
                "no received quantities supplied".to_string(),
            ));
        }

        // The status and over-receipt guards must see `qty_received` as of
        // this transaction, not an earlier snapshot, or two overlapping
        // receipts of the same line could both pass and double-book stock.
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let order = load_order_for_update(&txn, id).await?;
        if order.status() == Some(PurchaseOrderStatus::Received) {
            return Err(ServiceError::InvalidStatus(format!(
                "purchase order {id} is already RECEIVED"
            )));
        }
        ensure_warehouse_active(&txn, input.warehouse_id).await?;

        let items = load_items(&txn, id).await?;
        let by_id: HashMap<Uuid, &purchase_order_item::Model> =
            items.iter().map(|i| (i.id, i)).collect();

        for (item_id, qty) in &input.received_quantities {
            let item = by_id.get(item_id).ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "item {item_id} does not belong to purchase order {id}"
                ))
            })?;
            if *qty <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "received quantity must be positive".to_string(),
                ));
            }
            if item.qty_received + *qty > item.qty_ordered {
                return Err(ServiceError::InvalidOperation(format!(
                    "cannot receive {qty} of product {}: ordered {}, already received {}",
                    item.product_id, item.qty_ordered, item.qty_received
                )));
            }
        }

        for (item_id, qty) in &input.received_quantities {
            // Validated above.
            let item = match by_id.get(item_id) {
                Some(item) => *item,
                None => continue,
            };
            let lines = [AllocationLine {
                product_id: item.product_id,
                warehouse_id: input.warehouse_id,
                qty: *qty,
            }];
            apply_allocations(
                &txn,
                &lines,
                MovementType::In,
                "Purchase order receipt",
                &format!("PO-{id}"),
                Some(id),
                None,
            )
            .await?;
            let new_received = item.qty_received + *qty;
            let mut active: purchase_order_item::ActiveModel = item.clone().into();
            active.qty_received = Set(new_received);
            active.update(&txn).await.map_err(ServiceError::db_error)?;
        }

        let updated_items = load_items(&txn, id).await?;
        let fully_received = updated_items.iter().all(|i| i.fully_received());
        let new_status = if fully_received {
            PurchaseOrderStatus::Received
        } else {
            PurchaseOrderStatus::Ordered
        };
        let mut active: purchase_order::ActiveModel = order.into();
        active.status = Set(new_status.to_string());
        active.updated_at = Set(Utc::now());
        active.update(&txn).await.map_err(ServiceError::db_error)?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        if fully_received {
            self.record_order_expense(id, &updated_items, actor).await;
        }
        if let Err(e) = self
            .event_sender
            .send(Event::PurchaseOrderReceived {
                order_id: id,
                fully_received,
            })
            .await
        {
            warn!(error = %e, "failed to publish purchase order event");
        }
        self.get(id).await
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<PurchaseOrderView, ServiceError> {
        let db = self.db.as_ref();
        let order = load_order(db, id).await?;
        let items = load_items(db, id).await?;
        let allocations = load_po_allocations(db, &items).await?;
        Ok(assemble_view(order, items, allocations))
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<purchase_order::Model>, u64), ServiceError> {
        let paginator = purchase_order::find_active()
            .order_by_desc(purchase_order::Column::CreatedAt)
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

    /// Best-effort expense for the full ordered value. A failed write is
    /// logged and the receipt stands.
    async fn record_order_expense(
        &self,
        order_id: Uuid,
        items: &[purchase_order_item::Model],
        actor: Option<String>,
    ) {
        let total: Decimal = items.iter().map(|i| i.qty_ordered * i.unit_price).sum();
        if let Err(e) = self
            .finance
            .record_expense(
                total,
                Some(format!("Purchase order {order_id} received")),
                Some(order_id),
                actor,
            )
            .await
        {
            warn!(%order_id, error = %e, "failed to record purchase expense");
        }
    }
}

async fn load_order<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<purchase_order::Model, ServiceError> {
    purchase_order::find_active()
        .filter(purchase_order::Column::Id.eq(id))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("purchase order {id}")))
}

/// Locking variant of [`load_order`] for workflow transactions, so two
/// overlapping transitions on one order serialize on its row.
async fn load_order_for_update<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<purchase_order::Model, ServiceError> {
    let mut query = purchase_order::find_active().filter(purchase_order::Column::Id.eq(id));
    if conn.get_database_backend() == DbBackend::Postgres {
        query = query.lock_exclusive();
    }
    query
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("purchase order {id}")))
}

async fn load_items<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Vec<purchase_order_item::Model>, ServiceError> {
    purchase_order_item::Entity::find()
        .filter(purchase_order_item::Column::PurchaseOrderId.eq(order_id))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

async fn load_po_allocations<C: ConnectionTrait>(
    conn: &C,
    items: &[purchase_order_item::Model],
) -> Result<Vec<order_allocation::Model>, ServiceError> {
    if items.is_empty() {
        return Ok(Vec::new());
    }
    let item_ids: Vec<Uuid> = items.iter().map(|i| i.id).collect();
    order_allocation::Entity::find()
        .filter(order_allocation::Column::PurchaseOrderItemId.is_in(item_ids))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

fn assemble_view(
    order: purchase_order::Model,
    items: Vec<purchase_order_item::Model>,
    mut allocations: Vec<order_allocation::Model>,
) -> PurchaseOrderView {
    let items = items
        .into_iter()
        .map(|item| {
            let (mine, rest): (Vec<_>, Vec<_>) = allocations
                .drain(..)
                .partition(|a| a.purchase_order_item_id == Some(item.id));
            allocations = rest;
            PurchaseOrderItemView {
                item,
                allocations: mine,
            }
        })
        .collect();
    PurchaseOrderView { order, items }
}

/// All referenced products must exist and be active; unresolved ids are
/// reported together.
pub(crate) async fn ensure_products_exist<I>(
    db: &DatabaseConnection,
    product_ids: I,
) -> Result<(), ServiceError>
where
    I: Iterator<Item = Uuid>,
{
    let wanted: Vec<Uuid> = product_ids.collect();
    let found = product::find_active()
        .filter(product::Column::Id.is_in(wanted.clone()))
        .all(db)
        .await
        .map_err(ServiceError::db_error)?;
    let missing: Vec<String> = wanted
        .iter()
        .filter(|id| !found.iter().any(|p| p.id == **id))
        .map(|id| id.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::ValidationError(format!(
            "unknown products: {}",
            missing.join(", ")
        )))
    }
}
