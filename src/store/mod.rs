//! Persistence seams
//!
//! Services depend only on these traits. `memory` backs tests and
//! database-less runs; `postgres` is the production store.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::aggregates::{AnalyticsSnapshot, Order, OrderStatus, Product, User};
use crate::Result;

#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub customer_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    pub page: u32,
    pub per_page: u32,
}

impl OrderFilter {
    pub fn offset(&self) -> u64 { u64::from(self.page.max(1) - 1) * u64::from(self.per_page) }

    fn matches(&self, order: &Order) -> bool {
        self.status.map_or(true, |s| order.status() == s)
            && self.customer_id.map_or(true, |c| order.customer_id() == c)
            && self.vendor_id.map_or(true, |v| order.vendor_id() == v)
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Order>>;

    /// Persists `order` if the stored version still equals `order.version()`,
    /// returning the new version. A stale version yields `Conflict`.
    async fn update(&self, order: &Order) -> Result<u64>;

    /// One page of orders, newest first, with the total match count.
    async fn list(&self, filter: &OrderFilter) -> Result<(Vec<Order>, u64)>;

    async fn created_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Order>>;

    /// Orders whose delivery falls in `[start, end)`, whatever their current status.
    async fn delivered_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Order>>;
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get(&self, date: NaiveDate) -> Result<Option<AnalyticsSnapshot>>;

    /// Replaces the whole snapshot for its date.
    async fn put(&self, snapshot: &AnalyticsSnapshot) -> Result<()>;

    /// Snapshots with `start <= date <= end`, ascending by date.
    async fn range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<AnalyticsSnapshot>>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn upsert_user(&self, user: &User) -> Result<()>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;
    async fn users_created_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<User>>;
    async fn users_active_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<User>>;

    async fn upsert_product(&self, product: &Product) -> Result<()>;
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>>;
    async fn products_created_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Product>>;
}

/// Allocate-and-increment counter backing order numbers.
#[async_trait]
pub trait OrderSequence: Send + Sync {
    /// Next value for `period`, starting at 1. Never hands out a value twice.
    async fn next_value(&self, period: &str) -> Result<u64>;
}

/// The full set of stores a running service needs.
#[derive(Clone)]
pub struct Stores {
    pub orders: Arc<dyn OrderStore>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub sequence: Arc<dyn OrderSequence>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            orders: Arc::new(memory::MemoryOrderStore::default()),
            snapshots: Arc::new(memory::MemorySnapshotStore::default()),
            catalog: Arc::new(memory::MemoryCatalogStore::default()),
            sequence: Arc::new(memory::MemoryOrderSequence::default()),
        }
    }

    pub fn postgres(pool: sqlx::PgPool) -> Self {
        let store = Arc::new(postgres::PgStore::new(pool));
        Self { orders: store.clone(), snapshots: store.clone(), catalog: store.clone(), sequence: store }
    }
}
