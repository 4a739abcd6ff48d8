//! The stock ledger: the only code path by which inventory levels change.
//!
//! Every mutation pairs an append-only `stock_movements` insert with the
//! matching `inventory_levels` upsert inside one transaction; the level row
//! is a projection that must always equal the signed sum of its movements.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        inventory_level, product,
        stock_movement::{self, MovementType},
        warehouse,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Input for a single ledger entry.
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub movement_type: MovementType,
    pub quantity: Decimal,
    pub reason: Option<String>,
    pub ref_document: Option<String>,
    pub purchase_order_id: Option<Uuid>,
    pub sales_order_id: Option<Uuid>,
}

impl NewMovement {
    pub fn new(
        product_id: Uuid,
        warehouse_id: Uuid,
        movement_type: MovementType,
        quantity: Decimal,
    ) -> Self {
        Self {
            product_id,
            warehouse_id,
            movement_type,
            quantity,
            reason: None,
            ref_document: None,
            purchase_order_id: None,
            sales_order_id: None,
        }
    }
}

/// Typed filter for the level projection query.
#[derive(Debug, Clone, Default)]
pub struct LevelsQuery {
    pub product_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
}

/// Typed filter for ledger history.
#[derive(Debug, Clone)]
pub struct MovementQuery {
    pub product_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    pub movement_type: Option<MovementType>,
    pub page: u64,
    pub per_page: u64,
}

impl Default for MovementQuery {
    fn default() -> Self {
        Self {
            product_id: None,
            warehouse_id: None,
            movement_type: None,
            page: 1,
            per_page: 20,
        }
    }
}

/// One (product, warehouse, qty) application unit; both order workflows
/// reduce their allocation plans to a list of these before touching the
/// ledger, so the plan short-circuit and the manual paths share one
/// implementation.
#[derive(Debug, Clone)]
pub struct AllocationLine {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub qty: Decimal,
}

#[derive(Clone)]
pub struct StockLedgerService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl StockLedgerService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Records one movement and applies its signed effect to the level
    /// projection atomically. For `OUT` the operation is rejected before any
    /// write when the current level cannot cover the quantity. `ADJUST` rows
    /// are written only by the stocktake path, which computes the delta from
    /// the current level itself.
    #[instrument(skip(self))]
    pub async fn record_movement(
        &self,
        movement: NewMovement,
    ) -> Result<stock_movement::Model, ServiceError> {
        if movement.movement_type == MovementType::Adjust {
            return Err(ServiceError::ValidationError(
                "adjustments are recorded through the inventory adjust operation".to_string(),
            ));
        }
        if movement.quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "movement quantity must be positive".to_string(),
            ));
        }

        let db = self.db.as_ref();
        ensure_product_active(db, movement.product_id).await?;
        ensure_warehouse_active(db, movement.warehouse_id).await?;

        let txn = db.begin().await.map_err(ServiceError::db_error)?;
        let created = apply_movement(&txn, &movement).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        let event = Event::MovementRecorded {
            movement_id: created.id,
            product_id: created.product_id,
            warehouse_id: created.warehouse_id,
            movement_type: created.movement_type.clone(),
            quantity: created.quantity,
        };
        if let Err(e) = self.event_sender.send(event).await {
            warn!(error = %e, "failed to publish movement event");
        }

        Ok(created)
    }

    /// Read-only projection query; no side effects.
    #[instrument(skip(self))]
    pub async fn get_levels(
        &self,
        query: LevelsQuery,
    ) -> Result<Vec<inventory_level::Model>, ServiceError> {
        let mut select = inventory_level::Entity::find();
        if let Some(product_id) = query.product_id {
            select = select.filter(inventory_level::Column::ProductId.eq(product_id));
        }
        if let Some(warehouse_id) = query.warehouse_id {
            select = select.filter(inventory_level::Column::WarehouseId.eq(warehouse_id));
        }
        select
            .order_by_asc(inventory_level::Column::WarehouseId)
            .order_by_asc(inventory_level::Column::ProductId)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Ledger history, newest first.
    #[instrument(skip(self))]
    pub async fn list_movements(
        &self,
        query: MovementQuery,
    ) -> Result<(Vec<stock_movement::Model>, u64), ServiceError> {
        let mut select = stock_movement::Entity::find();
        if let Some(product_id) = query.product_id {
            select = select.filter(stock_movement::Column::ProductId.eq(product_id));
        }
        if let Some(warehouse_id) = query.warehouse_id {
            select = select.filter(stock_movement::Column::WarehouseId.eq(warehouse_id));
        }
        if let Some(movement_type) = query.movement_type {
            select =
                select.filter(stock_movement::Column::MovementType.eq(movement_type.to_string()));
        }

        let paginator = select
            .order_by_desc(stock_movement::Column::CreatedAt)
            .paginate(self.db.as_ref(), query.per_page.max(1));
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let page = query.page.max(1);
        let movements = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::db_error)?;
        Ok((movements, total))
    }
}

/// Fails `NotFound` when the product does not exist or is soft-deleted.
pub(crate) async fn ensure_product_active<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<product::Model, ServiceError> {
    product::find_active()
        .filter(product::Column::Id.eq(product_id))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))
}

/// Fails `NotFound` when the warehouse does not exist or is soft-deleted.
pub(crate) async fn ensure_warehouse_active<C: ConnectionTrait>(
    conn: &C,
    warehouse_id: Uuid,
) -> Result<warehouse::Model, ServiceError> {
    warehouse::find_active()
        .filter(warehouse::Column::Id.eq(warehouse_id))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Warehouse {warehouse_id} not found")))
}

/// Reads the level row for a pair, taking a row lock on backends that
/// support locking reads so concurrent check-then-decrement sequences on the
/// same pair serialize.
pub(crate) async fn load_level_for_update<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    warehouse_id: Uuid,
) -> Result<Option<inventory_level::Model>, ServiceError> {
    let mut query = inventory_level::find_by_pair(product_id, warehouse_id);
    if conn.get_database_backend() == DbBackend::Postgres {
        query = query.lock_exclusive();
    }
    query.one(conn).await.map_err(ServiceError::db_error)
}

/// Current quantity for a pair; zero when no level row exists yet.
pub(crate) async fn level_quantity<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    warehouse_id: Uuid,
) -> Result<Decimal, ServiceError> {
    Ok(inventory_level::find_by_pair(product_id, warehouse_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .map(|level| level.quantity)
        .unwrap_or(Decimal::ZERO))
}

/// The ledger pairing: inserts the movement row and applies its signed
/// effect to the level, creating the row lazily on first inbound movement.
/// Must run inside an open transaction; any error leaves both halves
/// unwritten.
pub(crate) async fn apply_movement<C: ConnectionTrait>(
    conn: &C,
    movement: &NewMovement,
) -> Result<stock_movement::Model, ServiceError> {
    let existing = load_level_for_update(conn, movement.product_id, movement.warehouse_id).await?;
    let current = existing.as_ref().map(|l| l.quantity).unwrap_or(Decimal::ZERO);

    if movement.movement_type == MovementType::Out && current < movement.quantity {
        return Err(ServiceError::InsufficientStock(format!(
            "product {} in warehouse {}: available {}, requested {}",
            movement.product_id, movement.warehouse_id, current, movement.quantity
        )));
    }

    let effect = movement.movement_type.signed_effect(movement.quantity);
    let new_quantity = current + effect;

    let row = stock_movement::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(movement.product_id),
        warehouse_id: Set(movement.warehouse_id),
        movement_type: Set(movement.movement_type.to_string()),
        quantity: Set(movement.quantity),
        reason: Set(movement.reason.clone()),
        ref_document: Set(movement.ref_document.clone()),
        purchase_order_id: Set(movement.purchase_order_id),
        sales_order_id: Set(movement.sales_order_id),
        created_at: Set(Utc::now()),
    };
    let created = row.insert(conn).await.map_err(ServiceError::db_error)?;

    match existing {
        Some(level) => {
            let mut active: inventory_level::ActiveModel = level.into();
            active.quantity = Set(new_quantity);
            active.updated_at = Set(Utc::now());
            active.update(conn).await.map_err(ServiceError::db_error)?;
        }
        None => {
            let level = inventory_level::ActiveModel {
                id: Set(Uuid::new_v4()),
                product_id: Set(movement.product_id),
                warehouse_id: Set(movement.warehouse_id),
                quantity: Set(new_quantity),
                created_at: Set(Utc::now()),
                updated_at: Set(Utc::now()),
            };
            level.insert(conn).await.map_err(ServiceError::db_error)?;
        }
    }

    Ok(created)
}

/// Applies a batch of allocation lines as movements of one direction,
/// tagging each with the originating order. Callers validate coverage and
/// sufficiency up front; the per-line non-negativity check still runs here
/// so a concurrent decrement can never drive a level below zero.
pub(crate) async fn apply_allocations<C: ConnectionTrait>(
    conn: &C,
    lines: &[AllocationLine],
    movement_type: MovementType,
    reason: &str,
    ref_document: &str,
    purchase_order_id: Option<Uuid>,
    sales_order_id: Option<Uuid>,
) -> Result<Vec<stock_movement::Model>, ServiceError> {
    let mut created = Vec::with_capacity(lines.len());
    for line in lines {
        let movement = NewMovement {
            product_id: line.product_id,
            warehouse_id: line.warehouse_id,
            movement_type,
            quantity: line.qty,
            reason: Some(reason.to_string()),
            ref_document: Some(ref_document.to_string()),
            purchase_order_id,
            sales_order_id,
        };
        created.push(apply_movement(conn, &movement).await?);
    }
    Ok(created)
}
