pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;

use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::services::{
    finance::FinanceService, inventory::InventoryService, purchase_orders::PurchaseOrderService,
    sales_orders::SalesOrderService, stock_ledger::StockLedgerService,
};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub auth_service: Arc<auth::AuthService>,
    pub stock_ledger: StockLedgerService,
    pub inventory: InventoryService,
    pub purchase_orders: PurchaseOrderService,
    pub sales_orders: SalesOrderService,
    pub finance: FinanceService,
}

impl AppState {
    /// Wires every service against one pool and one event channel.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
        auth_service: Arc<auth::AuthService>,
    ) -> Self {
        let finance = FinanceService::new(db.clone());
        Self {
            stock_ledger: StockLedgerService::new(db.clone(), event_sender.clone()),
            inventory: InventoryService::new(db.clone(), event_sender.clone()),
            purchase_orders: PurchaseOrderService::new(
                db.clone(),
                finance.clone(),
                event_sender.clone(),
            ),
            sales_orders: SalesOrderService::new(
                db.clone(),
                finance.clone(),
                event_sender.clone(),
            ),
            finance,
            db,
            config,
            event_sender,
            auth_service,
        }
    }
}

// Common response wrappers
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, page: u64, per_page: u64, total: u64) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            (total + per_page - 1) / per_page
        };
        Self {
            items,
            total,
            page,
            per_page,
            total_pages,
        }
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// All v1 API routes. Authentication is layered on by [`app`]; role checks
/// happen inside the mutating handlers.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/inventory/adjust", post(handlers::inventory::adjust_inventory))
        .route("/inventory/levels", get(handlers::inventory::get_levels))
        .route(
            "/inventory/products/:id",
            get(handlers::inventory::get_product_levels),
        )
        .route(
            "/inventory/warehouses/:id",
            get(handlers::inventory::get_warehouse_levels),
        )
        .route(
            "/stock-movements/in",
            post(handlers::stock_movements::record_inbound),
        )
        .route(
            "/stock-movements/out",
            post(handlers::stock_movements::record_outbound),
        )
        .route(
            "/stock-movements",
            get(handlers::stock_movements::list_movements),
        )
        .route(
            "/purchase-orders",
            post(handlers::purchase_orders::create_purchase_order)
                .get(handlers::purchase_orders::list_purchase_orders),
        )
        .route(
            "/purchase-orders/:id",
            get(handlers::purchase_orders::get_purchase_order),
        )
        .route(
            "/purchase-orders/:id/order",
            post(handlers::purchase_orders::mark_ordered),
        )
        .route(
            "/purchase-orders/:id/receive",
            post(handlers::purchase_orders::receive_purchase_order),
        )
        .route(
            "/sales-orders",
            post(handlers::sales_orders::create_sales_order)
                .get(handlers::sales_orders::list_sales_orders),
        )
        .route(
            "/sales-orders/:id",
            get(handlers::sales_orders::get_sales_order),
        )
        .route(
            "/sales-orders/:id/confirm",
            post(handlers::sales_orders::confirm_sales_order),
        )
        .route(
            "/sales-orders/:id/fulfill",
            post(handlers::sales_orders::fulfill_sales_order),
        )
        .route(
            "/finances/transactions",
            get(handlers::finance::list_transactions),
        )
}

/// Full application router: open health endpoint, bearer-guarded v1 API and
/// the Swagger UI.
pub fn app(state: AppState) -> Router {
    let auth_service = state.auth_service.clone();
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest(
            "/api/v1",
            api_v1_routes().layer(middleware::from_fn_with_state(
                auth_service,
                auth::auth_middleware,
            )),
        )
        .merge(openapi::swagger_ui())
        .with_state(state)
}
