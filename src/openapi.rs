use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Warehouse API",
        version = "0.1.0",
        description = r#"
# Warehouse Inventory API

Backend for warehouse stock control built around an append-only stock
ledger. Every change to inventory - receipts, shipments, stocktake
corrections - is a ledger movement, and the per-warehouse levels are a
projection over it.

## Authentication

All `/api/v1` endpoints require a bearer token:

```
Authorization: Bearer <your-jwt-token>
```

Read endpoints accept any authenticated user; mutations require the
`admin` or `manager` role.

## Pagination

List endpoints accept `page` (default 1) and `per_page` (default 20,
max 100).
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "inventory", description = "Levels and stocktake adjustments"),
        (name = "stock-movements", description = "Append-only stock ledger"),
        (name = "purchase-orders", description = "Inbound order workflow"),
        (name = "sales-orders", description = "Outbound order workflow"),
        (name = "finances", description = "Bookkeeping records"),
        (name = "health", description = "Health check")
    ),
    paths(
        crate::handlers::inventory::adjust_inventory,
        crate::handlers::inventory::get_levels,
        crate::handlers::inventory::get_product_levels,
        crate::handlers::inventory::get_warehouse_levels,
        crate::handlers::stock_movements::record_inbound,
        crate::handlers::stock_movements::record_outbound,
        crate::handlers::stock_movements::list_movements,
        crate::handlers::purchase_orders::create_purchase_order,
        crate::handlers::purchase_orders::list_purchase_orders,
        crate::handlers::purchase_orders::get_purchase_order,
        crate::handlers::purchase_orders::mark_ordered,
        crate::handlers::purchase_orders::receive_purchase_order,
        crate::handlers::sales_orders::create_sales_order,
        crate::handlers::sales_orders::list_sales_orders,
        crate::handlers::sales_orders::get_sales_order,
        crate::handlers::sales_orders::confirm_sales_order,
        crate::handlers::sales_orders::fulfill_sales_order,
        crate::handlers::finance::list_transactions,
        crate::handlers::health::health_check,
    ),
    components(
        schemas(
            crate::ApiResponse<serde_json::Value>,
            crate::PaginatedResponse<serde_json::Value>,
            crate::handlers::inventory::AdjustInventoryRequest,
            crate::handlers::inventory::InventoryLevelView,
            crate::handlers::stock_movements::RecordMovementRequest,
            crate::handlers::stock_movements::StockMovementView,
            crate::handlers::purchase_orders::AllocationRequest,
            crate::handlers::purchase_orders::PurchaseOrderItemRequest,
            crate::handlers::purchase_orders::CreatePurchaseOrderRequest,
            crate::handlers::purchase_orders::ReceivePurchaseOrderRequest,
            crate::handlers::purchase_orders::PurchaseOrderSummary,
            crate::handlers::sales_orders::SalesOrderItemRequest,
            crate::handlers::sales_orders::CreateSalesOrderRequest,
            crate::handlers::sales_orders::FulfillSalesOrderRequest,
            crate::handlers::sales_orders::SalesOrderSummary,
            crate::handlers::finance::TransactionView,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
