use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use uuid::Uuid;

use warehouse_api::{
    auth::{AuthConfig, AuthService},
    config::AppConfig,
    db::{self, DbConfig},
    entities::{customer, product, supplier, warehouse},
    events, AppState,
};

/// Application state backed by an in-memory SQLite database, one per test.
pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        // Single connection so every query sees the same in-memory database.
        let db_cfg = DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let pool = db::establish_connection_with_config(&db_cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db = Arc::new(pool);

        let (event_sender, event_rx) = events::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let cfg = AppConfig::for_tests("sqlite::memory:");
        let auth_service = Arc::new(AuthService::new(AuthConfig::new(
            cfg.jwt_secret.clone(),
            cfg.auth_issuer.clone(),
            cfg.auth_audience.clone(),
            Duration::from_secs(cfg.jwt_expiration),
        )));

        let state = AppState::new(db.clone(), cfg, event_sender, auth_service);
        Self {
            db,
            state,
            _event_task: event_task,
        }
    }
}

pub fn dec(value: i64) -> Decimal {
    Decimal::new(value * 10_000, 4)
}

pub async fn seed_product(db: &DatabaseConnection, sku: &str) -> product::Model {
    product::ActiveModel {
        id: Set(Uuid::new_v4()),
        sku: Set(sku.to_string()),
        name: Set(format!("Product {sku}")),
        category_id: Set(None),
        unit: Set("pcs".to_string()),
        min_stock: Set(Decimal::ZERO),
        deleted_at: Set(None),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("failed to seed product")
}

pub async fn seed_warehouse(db: &DatabaseConnection, name: &str) -> warehouse::Model {
    warehouse::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        address: Set(None),
        deleted_at: Set(None),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("failed to seed warehouse")
}

pub async fn seed_supplier(db: &DatabaseConnection, name: &str) -> supplier::Model {
    supplier::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        deleted_at: Set(None),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("failed to seed supplier")
}

pub async fn seed_customer(db: &DatabaseConnection, name: &str) -> customer::Model {
    customer::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        deleted_at: Set(None),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("failed to seed customer")
}

/// Soft-deletes a product, leaving its rows in place.
pub async fn soft_delete_product(db: &DatabaseConnection, model: product::Model) {
    let mut active: product::ActiveModel = model.into();
    active.deleted_at = Set(Some(Utc::now()));
    active.update(db).await.expect("failed to soft delete");
}
