pub mod customer;
pub mod financial_transaction;
pub mod inventory_level;
pub mod order_allocation;
pub mod product;
pub mod purchase_order;
pub mod purchase_order_item;
pub mod sales_order;
pub mod sales_order_item;
pub mod stock_movement;
pub mod supplier;
pub mod warehouse;
