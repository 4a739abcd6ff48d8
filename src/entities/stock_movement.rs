use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Movement direction. `Adjust` rows store the signed delta actually applied
/// during a stocktake, not the absolute counted quantity, so that the ledger
/// sum invariant holds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum MovementType {
    In,
    Out,
    Adjust,
}

impl MovementType {
    /// Signed effect this movement has on the level projection.
    pub fn signed_effect(&self, quantity: Decimal) -> Decimal {
        match self {
            MovementType::In => quantity,
            MovementType::Out => -quantity,
            MovementType::Adjust => quantity,
        }
    }
}

/// Append-only audit trail of every inventory-affecting event. Rows are
/// never updated or deleted.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub movement_type: String,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub quantity: Decimal,
    pub reason: Option<String>,
    pub ref_document: Option<String>,
    pub purchase_order_id: Option<Uuid>,
    pub sales_order_id: Option<Uuid>,
    pub created_at: DateTimeUtc,
}

impl Model {
    pub fn movement_type(&self) -> Option<MovementType> {
        self.movement_type.parse().ok()
    }

    /// Signed contribution of this row to its (product, warehouse) level.
    pub fn signed_quantity(&self) -> Decimal {
        match self.movement_type() {
            Some(t) => t.signed_effect(self.quantity),
            None => Decimal::ZERO,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
    #[sea_orm(
        belongs_to = "super::warehouse::Entity",
        from = "Column::WarehouseId",
        to = "super::warehouse::Column::Id"
    )]
    Warehouse,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::warehouse::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Warehouse.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, _insert: bool) -> Result<Self, DbErr> {
        let mut active_model = self;
        if let ActiveValue::NotSet = active_model.created_at {
            active_model.created_at = Set(Utc::now());
        }
        Ok(active_model)
    }
}
