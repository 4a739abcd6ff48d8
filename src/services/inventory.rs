//! Stocktake reconciliation: absolute counted quantity in, delta movement
//! out, so the ledger sum invariant survives corrections.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        inventory_level,
        stock_movement::{self, MovementType},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::stock_ledger::{
        ensure_product_active, ensure_warehouse_active, load_level_for_update,
    },
};

#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Reconciles a counted quantity against the recorded one. The level is
    /// set to the absolute counted value and an `ADJUST` movement carrying
    /// the signed delta is appended in the same transaction. A zero delta is
    /// still recorded for audit.
    #[instrument(skip(self))]
    pub async fn adjust(
        &self,
        product_id: Uuid,
        warehouse_id: Uuid,
        counted_quantity: Decimal,
        reason: Option<String>,
    ) -> Result<inventory_level::Model, ServiceError> {
        if counted_quantity < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "counted quantity cannot be negative".to_string(),
            ));
        }

        let db = self.db.as_ref();
        ensure_product_active(db, product_id).await?;
        ensure_warehouse_active(db, warehouse_id).await?;

        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        // The locking read serializes concurrent adjustments to the same pair.
        let existing = load_level_for_update(&txn, product_id, warehouse_id).await?;
        let old_quantity = existing.as_ref().map(|l| l.quantity).unwrap_or(Decimal::ZERO);
        let delta = counted_quantity - old_quantity;

        let level = match existing {
            Some(level) => {
                let mut active: inventory_level::ActiveModel = level.into();
                active.quantity = Set(counted_quantity);
                active.updated_at = Set(Utc::now());
                active.update(&txn).await.map_err(ServiceError::db_error)?
            }
            None => {
                let level = inventory_level::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    product_id: Set(product_id),
                    warehouse_id: Set(warehouse_id),
                    quantity: Set(counted_quantity),
                    created_at: Set(Utc::now()),
                    updated_at: Set(Utc::now()),
                };
                level.insert(&txn).await.map_err(ServiceError::db_error)?
            }
        };

        let movement = stock_movement::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            warehouse_id: Set(warehouse_id),
            movement_type: Set(MovementType::Adjust.to_string()),
            quantity: Set(delta),
            reason: Set(Some(reason.unwrap_or_else(|| {
                format!("Adjustment: {old_quantity} -> {counted_quantity}")
            }))),
            ref_document: Set(None),
            purchase_order_id: Set(None),
            sales_order_id: Set(None),
            created_at: Set(Utc::now()),
        };
        movement.insert(&txn).await.map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        let event = Event::InventoryAdjusted {
            product_id,
            warehouse_id,
            old_quantity,
            new_quantity: counted_quantity,
            delta,
        };
        if let Err(e) = self.event_sender.send(event).await {
            warn!(error = %e, "failed to publish adjustment event");
        }

        Ok(level)
    }

    /// Levels across all warehouses for one product.
    #[instrument(skip(self))]
    pub async fn levels_by_product(
        &self,
        product_id: Uuid,
    ) -> Result<Vec<inventory_level::Model>, ServiceError> {
        let db = self.db.as_ref();
        ensure_product_active(db, product_id).await?;
        inventory_level::Entity::find()
            .filter(inventory_level::Column::ProductId.eq(product_id))
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Levels across all products for one warehouse.
    #[instrument(skip(self))]
    pub async fn levels_by_warehouse(
        &self,
        warehouse_id: Uuid,
    ) -> Result<Vec<inventory_level::Model>, ServiceError> {
        let db = self.db.as_ref();
        ensure_warehouse_active(db, warehouse_id).await?;
        inventory_level::Entity::find()
            .filter(inventory_level::Column::WarehouseId.eq(warehouse_id))
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }
}
