use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_products_table::Migration),
            Box::new(m20240101_000002_create_stock_movements_table::Migration),
            Box::new(m20240101_000003_create_sales_orders_tables::Migration),
            Box::new(m20240101_000004_create_purchase_orders_tables::Migration),
            Box::new(m20240101_000005_create_integrations_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_products_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_products_table"
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
                        .col(ColumnDef::new(Products::TenantId).uuid().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Sku).string().not_null())
                        .col(
                            ColumnDef::new(Products::Quantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Products::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Products::UpdatedAt).timestamp_with_time_zone().null())
                        .to_owned(),
                )
                .await?;

            // One SKU per tenant
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_tenant_sku")
                        .table(Products::Table)
                        .col(Products::TenantId)
                        .col(Products::Sku)
                        .unique()
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        TenantId,
        Name,
        Sku,
        Quantity,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_stock_movements_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_stock_movements_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
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
                        .col(ColumnDef::new(StockMovements::TenantId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockMovements::QuantityChange)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::Reason).string().not_null())
                        .col(ColumnDef::new(StockMovements::ReferenceId).string().null())
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
                        .if_not_exists()
                        .name("idx_stock_movements_product_id")
                        .table(StockMovements::Table)
                        .col(StockMovements::ProductId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_tenant_created")
                        .table(StockMovements::Table)
                        .col(StockMovements::TenantId)
                        .col(StockMovements::CreatedAt)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockMovements::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockMovements {
        Table,
        Id,
        ProductId,
        TenantId,
        QuantityChange,
        Reason,
        ReferenceId,
        CreatedAt,
    }
}

mod m20240101_000003_create_sales_orders_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_sales_orders_tables"
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
                        .col(ColumnDef::new(SalesOrders::TenantId).uuid().not_null())
                        .col(ColumnDef::new(SalesOrders::CustomerId).uuid().null())
                        .col(ColumnDef::new(SalesOrders::CustomerName).string().null())
                        .col(ColumnDef::new(SalesOrders::Status).string().not_null())
                        .col(
                            ColumnDef::new(SalesOrders::TotalAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(SalesOrders::OrderDate).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(SalesOrders::CreatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sales_orders_tenant_id")
                        .table(SalesOrders::Table)
                        .col(SalesOrders::TenantId)
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
                        .col(ColumnDef::new(SalesOrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(SalesOrderItems::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(SalesOrderItems::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderItems::UnitPrice)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sales_order_items_order_id")
                        .table(SalesOrderItems::Table)
                        .col(SalesOrderItems::OrderId)
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
                .await
        }
    }

    #[derive(DeriveIden)]
    enum SalesOrders {
        Table,
        Id,
        TenantId,
        CustomerId,
        CustomerName,
        Status,
        TotalAmount,
        OrderDate,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum SalesOrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        Quantity,
        UnitPrice,
    }
}

mod m20240101_000004_create_purchase_orders_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_purchase_orders_tables"
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
                        .col(ColumnDef::new(PurchaseOrders::TenantId).uuid().not_null())
                        .col(ColumnDef::new(PurchaseOrders::SupplierId).uuid().null())
                        .col(ColumnDef::new(PurchaseOrders::Status).string().not_null())
                        .col(
                            ColumnDef::new(PurchaseOrders::OrderDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_purchase_orders_tenant_id")
                        .table(PurchaseOrders::Table)
                        .col(PurchaseOrders::TenantId)
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
                        .col(ColumnDef::new(PurchaseOrderItems::OrderId).uuid().not_null())
                        .col(
                            ColumnDef::new(PurchaseOrderItems::ProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::UnitCost)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_purchase_order_items_order_id")
                        .table(PurchaseOrderItems::Table)
                        .col(PurchaseOrderItems::OrderId)
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
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PurchaseOrders {
        Table,
        Id,
        TenantId,
        SupplierId,
        Status,
        OrderDate,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum PurchaseOrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        Quantity,
        UnitCost,
    }
}

mod m20240101_000005_create_integrations_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_integrations_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Integrations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Integrations::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Integrations::TenantId).uuid().not_null())
                        .col(ColumnDef::new(Integrations::Platform).string().not_null())
                        .col(
                            ColumnDef::new(Integrations::ExternalUserId)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Integrations::AccessToken)
                                .var_binary(2048)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Integrations::RefreshToken)
                                .var_binary(2048)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Integrations::ExpiresAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Integrations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Integrations::UpdatedAt).timestamp_with_time_zone().null())
                        .to_owned(),
                )
                .await?;

            // Upserts are keyed on (tenant, platform)
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_integrations_tenant_platform")
                        .table(Integrations::Table)
                        .col(Integrations::TenantId)
                        .col(Integrations::Platform)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_integrations_external_user")
                        .table(Integrations::Table)
                        .col(Integrations::ExternalUserId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Integrations::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Integrations {
        Table,
        Id,
        TenantId,
        Platform,
        ExternalUserId,
        AccessToken,
        RefreshToken,
        ExpiresAt,
        CreatedAt,
        UpdatedAt,
    }
}
