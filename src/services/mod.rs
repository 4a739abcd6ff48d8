pub mod finance;
pub mod inventory;
pub mod purchase_orders;
pub mod sales_orders;
pub mod stock_ledger;
