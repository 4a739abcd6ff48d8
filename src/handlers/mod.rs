pub mod common;
pub mod finance;
pub mod health;
pub mod inventory;
pub mod purchase_orders;
pub mod sales_orders;
pub mod stock_movements;
