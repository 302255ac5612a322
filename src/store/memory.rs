//! In-memory stores

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{CatalogStore, OrderFilter, OrderSequence, OrderStore, SnapshotStore};
use crate::domain::aggregates::{AnalyticsSnapshot, Order, Product, User};
use crate::{BackofficeError, Result};

fn within(at: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>) -> bool { at >= start && at < end }

#[derive(Default)]
pub struct MemoryOrderStore { orders: RwLock<HashMap<Uuid, Order>> }

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        order.check_invariants()?;
        let mut orders = self.orders.write().await;
        if orders.values().any(|o| o.order_number() == order.order_number()) {
            return Err(BackofficeError::Conflict(format!("order number {} already exists", order.order_number())));
        }
        if orders.contains_key(&order.id()) {
            return Err(BackofficeError::Conflict(format!("order {} already exists", order.id())));
        }
        orders.insert(order.id(), order.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn update(&self, order: &Order) -> Result<u64> {
        order.check_invariants()?;
        let mut orders = self.orders.write().await;
        let stored = orders.get_mut(&order.id()).ok_or_else(|| BackofficeError::not_found("order", order.id()))?;
        if stored.version() != order.version() {
            return Err(BackofficeError::Conflict(format!(
                "order {} was modified concurrently (expected version {}, found {})",
                order.id(), order.version(), stored.version()
            )));
        }
        let version = order.version() + 1;
        *stored = order.clone().with_version(version);
        Ok(version)
    }

    async fn list(&self, filter: &OrderFilter) -> Result<(Vec<Order>, u64)> {
        let orders = self.orders.read().await;
        let mut matching: Vec<_> = orders.values().filter(|o| filter.matches(o)).cloned().collect();
        matching.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then_with(|| b.id().cmp(&a.id())));
        let total = matching.len() as u64;
        let page = matching.into_iter().skip(filter.offset() as usize).take(filter.per_page as usize).collect();
        Ok((page, total))
    }

    async fn created_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.values().filter(|o| within(o.created_at(), start, end)).cloned().collect())
    }

    async fn delivered_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.values().filter(|o| o.delivered_at().is_some_and(|at| within(at, start, end))).cloned().collect())
    }
}

#[derive(Default)]
pub struct MemorySnapshotStore { snapshots: RwLock<BTreeMap<NaiveDate, AnalyticsSnapshot>> }

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn get(&self, date: NaiveDate) -> Result<Option<AnalyticsSnapshot>> {
        Ok(self.snapshots.read().await.get(&date).cloned())
    }

    async fn put(&self, snapshot: &AnalyticsSnapshot) -> Result<()> {
        self.snapshots.write().await.insert(snapshot.date, snapshot.clone());
        Ok(())
    }

    async fn range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<AnalyticsSnapshot>> {
        if start > end { return Ok(vec![]); }
        Ok(self.snapshots.read().await.range(start..=end).map(|(_, s)| s.clone()).collect())
    }
}

#[derive(Default)]
pub struct MemoryCatalogStore {
    users: RwLock<HashMap<Uuid, User>>,
    products: RwLock<HashMap<Uuid, Product>>,
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn upsert_user(&self, user: &User) -> Result<()> {
        self.users.write().await.insert(user.id(), user.clone());
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn users_created_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<User>> {
        let users = self.users.read().await;
        Ok(users.values().filter(|u| within(u.created_at(), start, end)).cloned().collect())
    }

    async fn users_active_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<User>> {
        let users = self.users.read().await;
        Ok(users.values().filter(|u| u.last_active_at().is_some_and(|at| within(at, start, end))).cloned().collect())
    }

    async fn upsert_product(&self, product: &Product) -> Result<()> {
        self.products.write().await.insert(product.id(), product.clone());
        Ok(())
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.products.read().await.get(&id).cloned())
    }

    async fn products_created_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Product>> {
        let products = self.products.read().await;
        Ok(products.values().filter(|p| within(p.created_at(), start, end)).cloned().collect())
    }
}

#[derive(Default)]
pub struct MemoryOrderSequence { counters: Mutex<HashMap<String, u64>> }

#[async_trait]
impl OrderSequence for MemoryOrderSequence {
    async fn next_value(&self, period: &str) -> Result<u64> {
        let mut counters = self.counters.lock().await;
        let value = counters.entry(period.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }
}
