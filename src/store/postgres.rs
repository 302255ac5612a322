//! Postgres stores
//!
//! Aggregates are kept as JSONB documents next to the columns the queries
//! filter on. The order `version` column drives optimistic concurrency and
//! is not part of the document.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{CatalogStore, OrderFilter, OrderSequence, OrderStore, SnapshotStore};
use crate::domain::aggregates::{AnalyticsSnapshot, Order, Product, User};
use crate::{BackofficeError, Result};

#[derive(Clone)]
pub struct PgStore { pool: PgPool }

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

type OrderRow = (Json<Order>, i64);

fn from_row((Json(order), version): OrderRow) -> Order { order.with_version(version.max(0) as u64) }

#[async_trait]
impl OrderStore for PgStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        order.check_invariants()?;
        let result = sqlx::query(
            "INSERT INTO orders (id, order_number, customer_id, vendor_id, status, created_at, delivered_at, version, document) VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $8)",
        )
        .bind(order.id()).bind(order.order_number().as_str()).bind(order.customer_id()).bind(order.vendor_id())
        .bind(order.status().as_str()).bind(order.created_at()).bind(order.delivered_at()).bind(Json(order))
        .execute(&self.pool).await;
        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(BackofficeError::Conflict(format!("order {} already exists", order.order_number())))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT document, version FROM orders WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(from_row))
    }

    async fn update(&self, order: &Order) -> Result<u64> {
        order.check_invariants()?;
        let expected = order.version() as i64;
        let version: Option<(i64,)> = sqlx::query_as(
            "UPDATE orders SET status = $2, delivered_at = $3, document = $4, version = version + 1 WHERE id = $1 AND version = $5 RETURNING version",
        )
        .bind(order.id()).bind(order.status().as_str()).bind(order.delivered_at()).bind(Json(order)).bind(expected)
        .fetch_optional(&self.pool).await?;
        if let Some((v,)) = version {
            return Ok(v as u64);
        }
        match OrderStore::get(self, order.id()).await? {
            Some(_) => Err(BackofficeError::Conflict(format!(
                "order {} was modified concurrently (expected version {})", order.id(), expected
            ))),
            None => Err(BackofficeError::not_found("order", order.id())),
        }
    }

    async fn list(&self, filter: &OrderFilter) -> Result<(Vec<Order>, u64)> {
        let status = filter.status.map(|s| s.as_str());
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT document, version FROM orders WHERE ($1::text IS NULL OR status = $1) AND ($2::uuid IS NULL OR customer_id = $2) AND ($3::uuid IS NULL OR vendor_id = $3) ORDER BY created_at DESC, id DESC LIMIT $4 OFFSET $5",
        )
        .bind(status).bind(filter.customer_id).bind(filter.vendor_id)
        .bind(i64::from(filter.per_page)).bind(filter.offset() as i64)
        .fetch_all(&self.pool).await?;
        let total: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM orders WHERE ($1::text IS NULL OR status = $1) AND ($2::uuid IS NULL OR customer_id = $2) AND ($3::uuid IS NULL OR vendor_id = $3)",
        )
        .bind(status).bind(filter.customer_id).bind(filter.vendor_id)
        .fetch_one(&self.pool).await?;
        Ok((rows.into_iter().map(from_row).collect(), total.0.max(0) as u64))
    }

    async fn created_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>("SELECT document, version FROM orders WHERE created_at >= $1 AND created_at < $2")
            .bind(start).bind(end).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    async fn delivered_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>("SELECT document, version FROM orders WHERE delivered_at >= $1 AND delivered_at < $2")
            .bind(start).bind(end).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(from_row).collect())
    }
}

#[async_trait]
impl SnapshotStore for PgStore {
    async fn get(&self, date: NaiveDate) -> Result<Option<AnalyticsSnapshot>> {
        let row: Option<(Json<AnalyticsSnapshot>,)> = sqlx::query_as("SELECT document FROM analytics_snapshots WHERE date = $1")
            .bind(date).fetch_optional(&self.pool).await?;
        Ok(row.map(|(Json(s),)| s))
    }

    async fn put(&self, snapshot: &AnalyticsSnapshot) -> Result<()> {
        sqlx::query("INSERT INTO analytics_snapshots (date, document, updated_at) VALUES ($1, $2, NOW()) ON CONFLICT (date) DO UPDATE SET document = EXCLUDED.document, updated_at = NOW()")
            .bind(snapshot.date).bind(Json(snapshot)).execute(&self.pool).await?;
        Ok(())
    }

    async fn range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<AnalyticsSnapshot>> {
        let rows: Vec<(Json<AnalyticsSnapshot>,)> = sqlx::query_as("SELECT document FROM analytics_snapshots WHERE date >= $1 AND date <= $2 ORDER BY date")
            .bind(start).bind(end).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(Json(s),)| s).collect())
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn upsert_user(&self, user: &User) -> Result<()> {
        sqlx::query("INSERT INTO users (id, created_at, last_active_at, document) VALUES ($1, $2, $3, $4) ON CONFLICT (id) DO UPDATE SET last_active_at = EXCLUDED.last_active_at, document = EXCLUDED.document")
            .bind(user.id()).bind(user.created_at()).bind(user.last_active_at()).bind(Json(user))
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let row: Option<(Json<User>,)> = sqlx::query_as("SELECT document FROM users WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(|(Json(u),)| u))
    }

    async fn users_created_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<User>> {
        let rows: Vec<(Json<User>,)> = sqlx::query_as("SELECT document FROM users WHERE created_at >= $1 AND created_at < $2")
            .bind(start).bind(end).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(Json(u),)| u).collect())
    }

    async fn users_active_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<User>> {
        let rows: Vec<(Json<User>,)> = sqlx::query_as("SELECT document FROM users WHERE last_active_at >= $1 AND last_active_at < $2")
            .bind(start).bind(end).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(Json(u),)| u).collect())
    }

    async fn upsert_product(&self, product: &Product) -> Result<()> {
        sqlx::query("INSERT INTO products (id, created_at, document) VALUES ($1, $2, $3) ON CONFLICT (id) DO UPDATE SET document = EXCLUDED.document")
            .bind(product.id()).bind(product.created_at()).bind(Json(product))
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        let row: Option<(Json<Product>,)> = sqlx::query_as("SELECT document FROM products WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(|(Json(p),)| p))
    }

    async fn products_created_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Product>> {
        let rows: Vec<(Json<Product>,)> = sqlx::query_as("SELECT document FROM products WHERE created_at >= $1 AND created_at < $2")
            .bind(start).bind(end).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(Json(p),)| p).collect())
    }
}

#[async_trait]
impl OrderSequence for PgStore {
    async fn next_value(&self, period: &str) -> Result<u64> {
        let (value,): (i64,) = sqlx::query_as(
            "INSERT INTO order_sequences (period, value) VALUES ($1, 1) ON CONFLICT (period) DO UPDATE SET value = order_sequences.value + 1 RETURNING value",
        )
        .bind(period).fetch_one(&self.pool).await?;
        Ok(value as u64)
    }
}
