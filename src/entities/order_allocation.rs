use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Persisted allocation plan declared at order creation: how much of one
/// order line is sourced from (sales) or delivered to (purchase) a specific
/// warehouse. Exactly one of the item references is set. Applying the plan at
/// a later state transition reads these rows back, so the plan survives
/// restarts and multiple server instances.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_allocations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub purchase_order_item_id: Option<Uuid>,
    pub sales_order_item_id: Option<Uuid>,
    pub warehouse_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub qty: Decimal,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::purchase_order_item::Entity",
        from = "Column::PurchaseOrderItemId",
        to = "super::purchase_order_item::Column::Id"
    )]
    PurchaseOrderItem,
    #[sea_orm(
        belongs_to = "super::sales_order_item::Entity",
        from = "Column::SalesOrderItemId",
        to = "super::sales_order_item::Column::Id"
    )]
    SalesOrderItem,
    #[sea_orm(
        belongs_to = "super::warehouse::Entity",
        from = "Column::WarehouseId",
        to = "super::warehouse::Column::Id"
    )]
    Warehouse,
}

impl Related<super::purchase_order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseOrderItem.def()
    }
}

impl Related<super::sales_order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SalesOrderItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
