use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_reference_tables::Migration),
            Box::new(m20240101_000002_create_inventory_tables::Migration),
            Box::new(m20240101_000003_create_purchase_order_tables::Migration),
            Box::new(m20240101_000004_create_sales_order_tables::Migration),
            Box::new(m20240101_000005_create_order_allocations_table::Migration),
            Box::new(m20240101_000006_create_financial_transactions_table::Migration),
        ]
    }
}

mod m20240101_000001_create_reference_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_reference_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::Sku).string().not_null().unique_key())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::CategoryId).uuid())
                        .col(ColumnDef::new(Products::Unit).string().not_null())
                        .col(
                            ColumnDef::new(Products::MinStock)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Products::DeletedAt).timestamp_with_time_zone())
                        .col(ColumnDef::new(Products::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Products::UpdatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Warehouses::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Warehouses::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Warehouses::Name)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Warehouses::Address).string())
                        .col(ColumnDef::new(Warehouses::DeletedAt).timestamp_with_time_zone())
                        .col(ColumnDef::new(Warehouses::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Warehouses::UpdatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Suppliers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Suppliers::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Suppliers::Name).string().not_null())
                        .col(ColumnDef::new(Suppliers::DeletedAt).timestamp_with_time_zone())
                        .col(ColumnDef::new(Suppliers::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Suppliers::UpdatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Customers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Customers::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Customers::Name).string().not_null())
                        .col(ColumnDef::new(Customers::DeletedAt).timestamp_with_time_zone())
                        .col(ColumnDef::new(Customers::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Customers::UpdatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Customers::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Suppliers::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Warehouses::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await?;
            Ok(())
        }
    }

    #[derive(Iden)]
    pub enum Products {
        Table,
        Id,
        Sku,
        Name,
        CategoryId,
        Unit,
        MinStock,
        DeletedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    pub enum Warehouses {
        Table,
        Id,
        Name,
        Address,
        DeletedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    pub enum Suppliers {
        Table,
        Id,
        Name,
        DeletedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    pub enum Customers {
        Table,
        Id,
        Name,
        DeletedAt,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_inventory_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_inventory_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryLevels::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryLevels::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryLevels::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(InventoryLevels::WarehouseId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryLevels::Quantity)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryLevels::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryLevels::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // The projection is keyed by the pair; one row per (product, warehouse).
            manager
                .create_index(
                    Index::create()
                        .name("idx_inventory_levels_product_warehouse")
                        .table(InventoryLevels::Table)
                        .col(InventoryLevels::ProductId)
                        .col(InventoryLevels::WarehouseId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockMovements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockMovements::WarehouseId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::MovementType)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::Quantity)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::Reason).string())
                        .col(ColumnDef::new(StockMovements::RefDocument).string())
                        .col(ColumnDef::new(StockMovements::PurchaseOrderId).uuid())
                        .col(ColumnDef::new(StockMovements::SalesOrderId).uuid())
                        .col(
                            ColumnDef::new(StockMovements::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_stock_movements_product_warehouse")
                        .table(StockMovements::Table)
                        .col(StockMovements::ProductId)
                        .col(StockMovements::WarehouseId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockMovements::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(InventoryLevels::Table).to_owned())
                .await?;
            Ok(())
        }
    }

    #[derive(Iden)]
    pub enum InventoryLevels {
        Table,
        Id,
        ProductId,
        WarehouseId,
        Quantity,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    pub enum StockMovements {
        Table,
        Id,
        ProductId,
        WarehouseId,
        MovementType,
        Quantity,
        Reason,
        RefDocument,
        PurchaseOrderId,
        SalesOrderId,
        CreatedAt,
    }
}

mod m20240101_000003_create_purchase_order_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_purchase_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrders::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::SupplierId).uuid().not_null())
                        .col(ColumnDef::new(PurchaseOrders::Status).string().not_null())
                        .col(ColumnDef::new(PurchaseOrders::ExpectedAt).timestamp_with_time_zone())
                        .col(ColumnDef::new(PurchaseOrders::DeletedAt).timestamp_with_time_zone())
                        .col(
                            ColumnDef::new(PurchaseOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::PurchaseOrderId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::ProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::QtyOrdered)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::UnitPrice)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::QtyReceived)
                                .decimal()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_purchase_order_items_order")
                        .table(PurchaseOrderItems::Table)
                        .col(PurchaseOrderItems::PurchaseOrderId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PurchaseOrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PurchaseOrders::Table).to_owned())
                .await?;
            Ok(())
        }
    }

    #[derive(Iden)]
    pub enum PurchaseOrders {
        Table,
        Id,
        SupplierId,
        Status,
        ExpectedAt,
        DeletedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    pub enum PurchaseOrderItems {
        Table,
        Id,
        PurchaseOrderId,
        ProductId,
        QtyOrdered,
        UnitPrice,
        QtyReceived,
    }
}

mod m20240101_000004_create_sales_order_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_sales_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SalesOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SalesOrders::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesOrders::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(SalesOrders::Status).string().not_null())
                        .col(ColumnDef::new(SalesOrders::DeletedAt).timestamp_with_time_zone())
                        .col(ColumnDef::new(SalesOrders::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(SalesOrders::UpdatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SalesOrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SalesOrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderItems::SalesOrderId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesOrderItems::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(SalesOrderItems::Qty)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderItems::UnitPrice)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderItems::Discount)
                                .decimal()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_sales_order_items_order")
                        .table(SalesOrderItems::Table)
                        .col(SalesOrderItems::SalesOrderId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SalesOrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SalesOrders::Table).to_owned())
                .await?;
            Ok(())
        }
    }

    #[derive(Iden)]
    pub enum SalesOrders {
        Table,
        Id,
        CustomerId,
        Status,
        DeletedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    pub enum SalesOrderItems {
        Table,
        Id,
        SalesOrderId,
        ProductId,
        Qty,
        UnitPrice,
        Discount,
    }
}

mod m20240101_000005_create_order_allocations_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_order_allocations_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OrderAllocations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderAllocations::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderAllocations::PurchaseOrderItemId).uuid())
                        .col(ColumnDef::new(OrderAllocations::SalesOrderItemId).uuid())
                        .col(
                            ColumnDef::new(OrderAllocations::WarehouseId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderAllocations::Qty)
                                .decimal()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_order_allocations_po_item")
                        .table(OrderAllocations::Table)
                        .col(OrderAllocations::PurchaseOrderItemId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_order_allocations_so_item")
                        .table(OrderAllocations::Table)
                        .col(OrderAllocations::SalesOrderItemId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderAllocations::Table).to_owned())
                .await?;
            Ok(())
        }
    }

    #[derive(Iden)]
    pub enum OrderAllocations {
        Table,
        Id,
        PurchaseOrderItemId,
        SalesOrderItemId,
        WarehouseId,
        Qty,
    }
}

mod m20240101_000006_create_financial_transactions_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000006_create_financial_transactions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(FinancialTransactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(FinancialTransactions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(FinancialTransactions::Kind).string().not_null())
                        .col(
                            ColumnDef::new(FinancialTransactions::Amount)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(FinancialTransactions::Description).string())
                        .col(ColumnDef::new(FinancialTransactions::PurchaseOrderId).uuid())
                        .col(ColumnDef::new(FinancialTransactions::SalesOrderId).uuid())
                        .col(ColumnDef::new(FinancialTransactions::CreatedBy).string())
                        .col(
                            ColumnDef::new(FinancialTransactions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(FinancialTransactions::Table).to_owned())
                .await?;
            Ok(())
        }
    }

    #[derive(Iden)]
    pub enum FinancialTransactions {
        Table,
        Id,
        Kind,
        Amount,
        Description,
        PurchaseOrderId,
        SalesOrderId,
        CreatedBy,
        CreatedAt,
    }
}
