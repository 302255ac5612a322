//! Analytics recomputation
//!
//! A day's snapshot is always rebuilt from a full scan of the source records
//! and written over the previous one, under a per-day lock. Retrying or
//! running two rebuilds for the same day therefore converges on the same
//! snapshot instead of double counting.

use chrono::{Duration, NaiveDate, Timelike};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::aggregates::{
    rank_products, AnalyticsSnapshot, Order, OrderCounts, ProductCounts, RankBy, RevenueMetrics,
    SnapshotMetrics, TopProduct, UserCounts,
};
use crate::domain::value_objects::{day_bounds, decimal_growth};
use crate::services::locks::KeyedLocks;
use crate::store::{CatalogStore, OrderStore, SnapshotStore};
use crate::{BackofficeError, Result};

pub const DEFAULT_TOP_PRODUCTS: usize = 5;
const MAX_RANGE_DAYS: i64 = 366;

/// Non-fatal report that a day's snapshot could not be refreshed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecomputeWarning { pub date: NaiveDate, pub message: String }

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DayOutcome {
    Recomputed { date: NaiveDate, revenue: Decimal, orders: u64 },
    Failed { date: NaiveDate, message: String },
}

pub struct RecomputeEngine {
    orders: Arc<dyn OrderStore>,
    catalog: Arc<dyn CatalogStore>,
    snapshots: Arc<dyn SnapshotStore>,
    day_locks: KeyedLocks<NaiveDate>,
    top_products_limit: usize,
}

impl RecomputeEngine {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        catalog: Arc<dyn CatalogStore>,
        snapshots: Arc<dyn SnapshotStore>,
        top_products_limit: usize,
    ) -> Self {
        Self { orders, catalog, snapshots, day_locks: KeyedLocks::new(), top_products_limit: top_products_limit.max(1) }
    }

    /// Rebuilds and stores the snapshot for `date`.
    ///
    /// On failure the stored snapshot is left as it was and
    /// `RecomputeFailure` is returned. When the day's revenue moved, an
    /// existing snapshot for the following day is refreshed too so its
    /// growth figure follows.
    #[instrument(skip(self))]
    pub async fn recompute_day(&self, date: NaiveDate) -> Result<AnalyticsSnapshot> {
        let (snapshot, revenue_changed) = self.rebuild(date).await?;
        if revenue_changed {
            let next = date + Duration::days(1);
            match self.snapshots.get(next).await {
                Ok(Some(_)) => {
                    if let Err(e) = self.rebuild(next).await {
                        warn!(date = %next, error = %e, "follow-up recompute failed");
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(date = %next, error = %e, "could not check following day snapshot"),
            }
        }
        Ok(snapshot)
    }

    /// Recomputes every day in `[start, end]`, reporting each day separately.
    #[instrument(skip(self))]
    pub async fn recompute_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DayOutcome>> {
        if start > end {
            return Err(BackofficeError::Validation(format!("start {start} is after end {end}")));
        }
        if (end - start).num_days() >= MAX_RANGE_DAYS {
            return Err(BackofficeError::Validation(format!("range may span at most {MAX_RANGE_DAYS} days")));
        }
        let mut outcomes = Vec::new();
        let mut date = start;
        while date <= end {
            let outcome = match self.recompute_day(date).await {
                Ok(s) => DayOutcome::Recomputed { date, revenue: s.metrics.revenue.total, orders: s.metrics.orders.total },
                Err(e) => DayOutcome::Failed { date, message: e.to_string() },
            };
            outcomes.push(outcome);
            date += Duration::days(1);
        }
        info!(days = outcomes.len(), "range recompute finished");
        Ok(outcomes)
    }

    /// Fire-and-forget refresh with bounded retry, for callers that must not
    /// wait on analytics.
    pub fn spawn_recompute(self: Arc<Self>, days: Vec<NaiveDate>, max_attempts: u32, retry_delay: std::time::Duration) -> JoinHandle<()> {
        let max_attempts = max_attempts.max(1);
        tokio::spawn(async move {
            for date in days {
                for attempt in 1..=max_attempts {
                    match self.recompute_day(date).await {
                        Ok(_) => break,
                        Err(e) if attempt < max_attempts => {
                            debug!(%date, attempt, error = %e, "retrying analytics recompute");
                            tokio::time::sleep(retry_delay * attempt).await;
                        }
                        Err(e) => warn!(%date, attempts = max_attempts, error = %e, "giving up on analytics recompute"),
                    }
                }
            }
        })
    }

    async fn rebuild(&self, date: NaiveDate) -> Result<(AnalyticsSnapshot, bool)> {
        let _guard = self.day_locks.lock(&date).await;
        let result = async {
            let snapshot = self.build_snapshot(date).await?;
            let previous = self.snapshots.get(date).await?;
            self.snapshots.put(&snapshot).await?;
            let changed = previous.map_or(true, |p| p.metrics.revenue.total != snapshot.metrics.revenue.total);
            Ok::<_, BackofficeError>((snapshot, changed))
        }
        .await;
        result.map_err(|e| {
            let reason = e.to_string();
            warn!(%date, %reason, "analytics recompute failed, keeping previous snapshot");
            BackofficeError::RecomputeFailure { date, reason }
        })
    }

    /// Pure function of the records touching `date`; writes nothing.
    pub async fn build_snapshot(&self, date: NaiveDate) -> Result<AnalyticsSnapshot> {
        let (start, end) = day_bounds(date);
        let (previous_start, _) = day_bounds(date - Duration::days(1));

        let created = self.orders.created_between(start, end).await?;
        let delivered: Vec<Order> = self.orders.delivered_between(start, end).await?
            .into_iter().filter(Order::counts_as_revenue).collect();
        let previous_revenue = revenue_of(self.orders.delivered_between(previous_start, start).await?.iter().filter(|o| o.counts_as_revenue()))?;
        let revenue = revenue_of(delivered.iter())?;

        let mut orders = OrderCounts::default();
        for order in &created { orders.record(order.status()); }

        let buyers: BTreeSet<Uuid> = created.iter().map(Order::customer_id).collect();
        let sellers: BTreeSet<Uuid> = created.iter().map(Order::vendor_id).collect();
        for id in buyers.iter().chain(sellers.iter()) {
            if self.catalog.get_user(*id).await?.is_none() {
                return Err(BackofficeError::not_found("user", id));
            }
        }

        let active = self.catalog.users_active_between(start, end).await?;
        let new_users = self.catalog.users_created_between(start, end).await?.len() as u64;

        let mut products = ProductCounts::default();
        for product in self.catalog.products_created_between(start, end).await? { products.record(product.status()); }

        let mut snapshot = AnalyticsSnapshot::empty(date);
        for user in &active {
            if let Some(at) = user.last_active_at() {
                snapshot.hourly_activity[at.hour() as usize].active_users += 1;
            }
        }
        snapshot.top_products = rank_delivered(self.catalog.as_ref(), &delivered, RankBy::Revenue, self.top_products_limit).await?;
        snapshot.metrics = SnapshotMetrics {
            revenue: RevenueMetrics { total: revenue, growth_vs_previous_day: decimal_growth(revenue, previous_revenue) },
            orders,
            users: UserCounts { active: active.len() as u64, new: new_users, buyers: buyers.len() as u64, sellers: sellers.len() as u64 },
            products,
        };
        Ok(snapshot)
    }
}

/// Ranks the approved products sold in `delivered`.
///
/// Every product referenced by an item must exist in the catalog.
pub(crate) async fn rank_delivered(
    catalog: &dyn CatalogStore,
    delivered: &[Order],
    by: RankBy,
    limit: usize,
) -> Result<Vec<TopProduct>> {
    let mut sales: BTreeMap<Uuid, (u64, Decimal)> = BTreeMap::new();
    for item in delivered.iter().flat_map(|o| o.items()) {
        let entry = sales.entry(item.product_id).or_default();
        entry.0 += u64::from(item.quantity);
        entry.1 = entry.1.checked_add(item.subtotal.amount()).ok_or_else(revenue_overflow)?;
    }
    let mut candidates = Vec::with_capacity(sales.len());
    for (product_id, (units_sold, revenue)) in sales {
        let product = catalog.get_product(product_id).await?
            .ok_or_else(|| BackofficeError::not_found("product", product_id))?;
        if !product.is_approved() { continue; }
        candidates.push(TopProduct {
            product_id,
            name: product.name().to_string(),
            category: product.category().to_string(),
            image: product.image().map(str::to_string),
            units_sold,
            revenue,
        });
    }
    Ok(rank_products(candidates, by, limit))
}

fn revenue_of<'a>(mut orders: impl Iterator<Item = &'a Order>) -> Result<Decimal> {
    orders.try_fold(Decimal::ZERO, |sum, o| sum.checked_add(o.total().amount()).ok_or_else(revenue_overflow))
}

fn revenue_overflow() -> BackofficeError { BackofficeError::Validation("revenue out of range".into()) }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{ModerationStatus, OrderStatus, Product, ReturnDecision, User, UserRole};
    use crate::services::fixtures::{at, usd, Fixture};
    use chrono::Utc;

    #[tokio::test]
    async fn test_revenue_counted_on_delivery_day() {
        let fx = Fixture::new().await;
        let created = at(2024, 5, 1, 9);
        let delivered = at(2024, 5, 3, 15);
        fx.seed_order(fx.widget.id(), 2, 10, created, Some(delivered)).await;

        let creation_day = fx.engine.recompute_day(created.date_naive()).await.unwrap();
        assert_eq!(creation_day.metrics.revenue.total, Decimal::ZERO);
        assert_eq!(creation_day.metrics.orders.delivered, 1);
        assert_eq!(creation_day.metrics.users.buyers, 1);

        let delivery_day = fx.engine.recompute_day(delivered.date_naive()).await.unwrap();
        assert_eq!(delivery_day.metrics.revenue.total, Decimal::new(20, 0));
        assert_eq!(delivery_day.metrics.orders.total, 0);
        assert_eq!(delivery_day.top_products.len(), 1);
        assert_eq!(delivery_day.top_products[0].units_sold, 2);
    }

    #[tokio::test]
    async fn test_recompute_is_idempotent() {
        let fx = Fixture::new().await;
        let day = at(2024, 6, 10, 8);
        fx.seed_order(fx.widget.id(), 1, 30, day, Some(day + Duration::hours(2))).await;
        fx.seed_order(fx.gadget.id(), 3, 5, day, None).await;

        let first = fx.engine.recompute_day(day.date_naive()).await.unwrap();
        let second = fx.engine.recompute_day(day.date_naive()).await.unwrap();
        assert_eq!(serde_json::to_vec(&first).unwrap(), serde_json::to_vec(&second).unwrap());
        let stored = fx.stores.snapshots.get(day.date_naive()).await.unwrap().unwrap();
        assert_eq!(stored, second);
    }

    #[tokio::test]
    async fn test_concurrent_recomputes_converge() {
        let fx = Fixture::new().await;
        let day = at(2024, 6, 11, 8);
        for _ in 0..4 { fx.seed_order(fx.widget.id(), 1, 10, day, Some(day)).await; }
        let handles: Vec<_> = (0..8)
            .map(|_| { let engine = fx.engine.clone(); tokio::spawn(async move { engine.recompute_day(day.date_naive()).await.unwrap() }) })
            .collect();
        for h in handles { h.await.unwrap(); }
        let stored = fx.stores.snapshots.get(day.date_naive()).await.unwrap().unwrap();
        assert_eq!(stored.metrics.revenue.total, Decimal::new(40, 0));
        assert_eq!(stored.metrics.orders.total, 4);
    }

    #[tokio::test]
    async fn test_growth_against_previous_day() {
        let fx = Fixture::new().await;
        let yesterday = at(2024, 7, 1, 10);
        let today = at(2024, 7, 2, 10);
        fx.seed_order(fx.widget.id(), 10, 10, yesterday, Some(yesterday)).await;
        fx.seed_order(fx.widget.id(), 15, 10, today, Some(today)).await;
        let snapshot = fx.engine.recompute_day(today.date_naive()).await.unwrap();
        assert_eq!(snapshot.metrics.revenue.total, Decimal::new(150, 0));
        assert_eq!(snapshot.metrics.revenue.growth_vs_previous_day, 50.0);

        let quiet = at(2024, 7, 10, 10);
        fx.seed_order(fx.widget.id(), 1, 10, quiet, Some(quiet)).await;
        let snapshot = fx.engine.recompute_day(quiet.date_naive()).await.unwrap();
        assert_eq!(snapshot.metrics.revenue.growth_vs_previous_day, 0.0);
    }

    #[tokio::test]
    async fn test_return_reverses_original_delivery_day() {
        let fx = Fixture::new().await;
        let delivered = at(2024, 8, 1, 12);
        let order = fx.seed_order(fx.widget.id(), 1, 25, delivered, Some(delivered)).await;
        let before = fx.engine.recompute_day(delivered.date_naive()).await.unwrap();
        assert_eq!(before.metrics.revenue.total, Decimal::new(25, 0));

        let mut order = fx.stores.orders.get(order.id()).await.unwrap().unwrap();
        order.request_return("broken", None, vec![], at(2024, 8, 5, 9)).unwrap();
        order.process_return(ReturnDecision::Approved, fx.admin.id, None, None, at(2024, 8, 6, 9)).unwrap();
        fx.stores.orders.update(&order).await.unwrap();

        let after = fx.engine.recompute_day(delivered.date_naive()).await.unwrap();
        assert_eq!(after.metrics.revenue.total, Decimal::ZERO);
        assert_eq!(after.metrics.orders.returned, 1);
        let return_day = fx.engine.recompute_day(at(2024, 8, 6, 0).date_naive()).await.unwrap();
        assert_eq!(return_day.metrics.revenue.total, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_unapproved_products_excluded_from_top_list() {
        let fx = Fixture::new().await;
        let mut hidden = Product::submit(fx.vendor.id(), "Hidden", "misc", usd(100), Utc::now());
        hidden.moderate(ModerationStatus::Flagged, Utc::now());
        fx.stores.catalog.upsert_product(&hidden).await.unwrap();

        let day = at(2024, 9, 1, 10);
        fx.seed_order(hidden.id(), 5, 100, day, Some(day)).await;
        fx.seed_order(fx.widget.id(), 1, 10, day, Some(day)).await;
        let snapshot = fx.engine.recompute_day(day.date_naive()).await.unwrap();
        let ids: Vec<_> = snapshot.top_products.iter().map(|p| p.product_id).collect();
        assert_eq!(ids, vec![fx.widget.id()]);
        assert_eq!(snapshot.metrics.revenue.total, Decimal::new(510, 0));
    }

    #[tokio::test]
    async fn test_top_products_bounded_and_ordered() {
        let fx = Fixture::new().await;
        let day = at(2024, 9, 2, 10);
        let mut expected = vec![];
        for price in 1..=7 {
            let mut p = Product::submit(fx.vendor.id(), format!("P{price}"), "misc", usd(price), Utc::now());
            p.moderate(ModerationStatus::Approved, Utc::now());
            fx.stores.catalog.upsert_product(&p).await.unwrap();
            fx.seed_order(p.id(), 1, price, day, Some(day)).await;
            expected.push((price, p.id()));
        }
        let snapshot = fx.engine.recompute_day(day.date_naive()).await.unwrap();
        assert_eq!(snapshot.top_products.len(), DEFAULT_TOP_PRODUCTS);
        expected.sort_by(|a, b| b.0.cmp(&a.0));
        let want: Vec<_> = expected.iter().take(DEFAULT_TOP_PRODUCTS).map(|(_, id)| *id).collect();
        let got: Vec<_> = snapshot.top_products.iter().map(|p| p.product_id).collect();
        assert_eq!(got, want);
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_snapshot() {
        let fx = Fixture::new().await;
        let day = at(2024, 10, 1, 10);
        fx.seed_order(fx.widget.id(), 1, 10, day, Some(day)).await;
        let good = fx.engine.recompute_day(day.date_naive()).await.unwrap();

        // an order referencing a product the catalog does not know
        fx.seed_order(Uuid::new_v4(), 1, 99, day, Some(day)).await;
        let err = fx.engine.recompute_day(day.date_naive()).await.unwrap_err();
        assert_eq!(err.code(), "RECOMPUTE_FAILURE");
        let stored = fx.stores.snapshots.get(day.date_naive()).await.unwrap().unwrap();
        assert_eq!(stored, good);
    }

    #[tokio::test]
    async fn test_hourly_activity_derives_from_active_set() {
        let fx = Fixture::new().await;
        let day = at(2024, 10, 2, 0);
        let user = User::register("Lin", "lin@example.com", UserRole::Buyer, day + Duration::hours(14));
        fx.stores.catalog.upsert_user(&user).await.unwrap();
        let snapshot = fx.engine.recompute_day(day.date_naive()).await.unwrap();
        assert_eq!(snapshot.metrics.users.active, 1);
        assert_eq!(snapshot.metrics.users.new, 1);
        assert_eq!(snapshot.hourly_activity[14].active_users, 1);
        let bucket_sum: u64 = snapshot.hourly_activity.iter().map(|h| h.active_users).sum();
        assert!(snapshot.hourly_activity.iter().all(|h| h.active_users <= snapshot.metrics.users.active));
        assert_eq!(bucket_sum, 1);
    }

    #[tokio::test]
    async fn test_following_day_refreshed_when_revenue_moves() {
        let fx = Fixture::new().await;
        let monday = at(2024, 11, 4, 10);
        let tuesday = at(2024, 11, 5, 10);
        fx.seed_order(fx.widget.id(), 10, 10, tuesday, Some(tuesday)).await;
        let t = fx.engine.recompute_day(tuesday.date_naive()).await.unwrap();
        assert_eq!(t.metrics.revenue.growth_vs_previous_day, 0.0);

        fx.seed_order(fx.widget.id(), 5, 10, monday, Some(monday)).await;
        fx.engine.recompute_day(monday.date_naive()).await.unwrap();
        let t = fx.stores.snapshots.get(tuesday.date_naive()).await.unwrap().unwrap();
        assert_eq!(t.metrics.revenue.growth_vs_previous_day, 100.0);
    }

    #[tokio::test]
    async fn test_recompute_range_reports_each_day() {
        let fx = Fixture::new().await;
        let start = at(2024, 12, 1, 0).date_naive();
        let end = at(2024, 12, 3, 0).date_naive();
        let outcomes = fx.engine.recompute_range(start, end).await.unwrap();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| matches!(o, DayOutcome::Recomputed { .. })));
        assert!(fx.engine.recompute_range(end, start).await.is_err());
    }

    #[tokio::test]
    async fn test_spawned_recompute_completes() {
        let fx = Fixture::new().await;
        let day = at(2025, 1, 5, 10);
        fx.seed_order(fx.widget.id(), 1, 10, day, Some(day)).await;
        fx.engine.clone().spawn_recompute(vec![day.date_naive()], 3, std::time::Duration::from_millis(1)).await.unwrap();
        let stored = fx.stores.snapshots.get(day.date_naive()).await.unwrap().unwrap();
        assert_eq!(stored.metrics.orders.get(OrderStatus::Delivered), 1);
    }
}
