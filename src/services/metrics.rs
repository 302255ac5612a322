//! Read-side metrics
//!
//! Nothing here writes. Range figures are derived from the daily snapshots in
//! the requested window, so they trail order mutations by however long the
//! recompute takes. Product rankings read the delivered orders directly.

use chrono::{Datelike, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::domain::aggregates::{
    AnalyticsSnapshot, HourlyActivity, Order, OrderCounts, ProductCounts, RankBy, TopProduct, HOURS_PER_DAY,
};
use crate::domain::value_objects::{day_bounds, decimal_growth, growth_percent};
use crate::services::analytics::rank_delivered;
use crate::store::{CatalogStore, OrderStore, SnapshotStore};
use crate::{BackofficeError, Result};

/// Aggregate of every snapshot in `[start, end]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeMetrics {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub snapshot_count: usize,
    pub total_revenue: Decimal,
    pub orders: OrderCounts,
    pub new_users: u64,
    pub average_active_users: f64,
    pub buyers: u64,
    pub sellers: u64,
    pub products: ProductCounts,
    pub average_order_value: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverviewGrowth {
    pub revenue: f64,
    pub orders: f64,
    pub new_users: f64,
    pub active_users: f64,
    pub average_order_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewStats {
    pub current: RangeMetrics,
    pub previous: RangeMetrics,
    pub growth: OverviewGrowth,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub revenue: Decimal,
    pub orders: u64,
    pub growth: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueAnalytics {
    pub series: Vec<DailyRevenue>,
    pub total_revenue: Decimal,
    pub total_orders: u64,
    pub average_order_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyUsers {
    pub date: NaiveDate,
    pub active: u64,
    pub new: u64,
    pub buyers: u64,
    pub sellers: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserActivity {
    pub daily: Vec<DailyUsers>,
    /// Active users per hour of day, summed over the window.
    pub hourly: Vec<HourlyActivity>,
    pub total_new_users: u64,
}

pub struct MetricsService {
    snapshots: Arc<dyn SnapshotStore>,
    orders: Arc<dyn OrderStore>,
    catalog: Arc<dyn CatalogStore>,
    top_products_limit: usize,
}

impl MetricsService {
    pub fn new(
        snapshots: Arc<dyn SnapshotStore>,
        orders: Arc<dyn OrderStore>,
        catalog: Arc<dyn CatalogStore>,
        top_products_limit: usize,
    ) -> Self {
        Self { snapshots, orders, catalog, top_products_limit: top_products_limit.max(1) }
    }

    pub fn top_products_limit(&self) -> usize { self.top_products_limit }

    #[instrument(skip(self))]
    pub async fn date_range_metrics(&self, start: NaiveDate, end: NaiveDate) -> Result<RangeMetrics> {
        let snapshots = self.load(start, end).await?;
        Ok(summarize(start, end, &snapshots))
    }

    /// Last calendar month against the month before it.
    pub async fn overview_stats(&self) -> Result<OverviewStats> {
        self.overview_stats_at(Utc::now().date_naive()).await
    }

    #[instrument(skip(self))]
    pub async fn overview_stats_at(&self, today: NaiveDate) -> Result<OverviewStats> {
        let last_month_end = month_start(today) - Duration::days(1);
        let last_month_start = month_start(last_month_end);
        let prior_end = last_month_start - Duration::days(1);
        let prior_start = month_start(prior_end);

        let current = self.date_range_metrics(last_month_start, last_month_end).await?;
        let previous = self.date_range_metrics(prior_start, prior_end).await?;
        let growth = OverviewGrowth {
            revenue: decimal_growth(current.total_revenue, previous.total_revenue),
            orders: growth_percent(current.orders.total as f64, previous.orders.total as f64),
            new_users: growth_percent(current.new_users as f64, previous.new_users as f64),
            active_users: growth_percent(current.average_active_users, previous.average_active_users),
            average_order_value: decimal_growth(current.average_order_value, previous.average_order_value),
        };
        Ok(OverviewStats { current, previous, growth })
    }

    pub async fn revenue_analytics(&self, start: NaiveDate, end: NaiveDate) -> Result<RevenueAnalytics> {
        let snapshots = self.load(start, end).await?;
        let series: Vec<DailyRevenue> = snapshots
            .iter()
            .map(|s| DailyRevenue {
                date: s.date,
                revenue: s.metrics.revenue.total,
                orders: s.metrics.orders.total,
                growth: s.metrics.revenue.growth_vs_previous_day,
            })
            .collect();
        let total_revenue: Decimal = series.iter().map(|d| d.revenue).sum();
        let total_orders: u64 = series.iter().map(|d| d.orders).sum();
        Ok(RevenueAnalytics { series, total_revenue, total_orders, average_order_value: average_order_value(total_revenue, total_orders) })
    }

    pub async fn user_activity(&self, start: NaiveDate, end: NaiveDate) -> Result<UserActivity> {
        let snapshots = self.load(start, end).await?;
        let mut hourly: Vec<HourlyActivity> =
            (0..HOURS_PER_DAY as u8).map(|hour| HourlyActivity { hour, active_users: 0 }).collect();
        let mut daily = Vec::with_capacity(snapshots.len());
        for snapshot in &snapshots {
            for bucket in &snapshot.hourly_activity {
                if let Some(slot) = hourly.get_mut(usize::from(bucket.hour)) {
                    slot.active_users += bucket.active_users;
                }
            }
            let users = &snapshot.metrics.users;
            daily.push(DailyUsers { date: snapshot.date, active: users.active, new: users.new, buyers: users.buyers, sellers: users.sellers });
        }
        let total_new_users = daily.iter().map(|d| d.new).sum();
        Ok(UserActivity { daily, hourly, total_new_users })
    }

    /// Ranks approved products over every order delivered in `[start, end]`
    /// that still counts as revenue.
    #[instrument(skip(self))]
    pub async fn top_products(&self, start: NaiveDate, end: NaiveDate, by: RankBy, limit: Option<usize>) -> Result<Vec<TopProduct>> {
        check_range(start, end)?;
        let delivered: Vec<Order> = self.orders.delivered_between(day_bounds(start).0, day_bounds(end).1).await?
            .into_iter().filter(Order::counts_as_revenue).collect();
        let limit = limit.unwrap_or(self.top_products_limit).max(1);
        debug!(%start, %end, orders = delivered.len(), "ranking delivered products");
        rank_delivered(self.catalog.as_ref(), &delivered, by, limit).await
    }

    /// Raw snapshot rows for export.
    pub async fn snapshots(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<AnalyticsSnapshot>> {
        self.load(start, end).await
    }

    async fn load(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<AnalyticsSnapshot>> {
        check_range(start, end)?;
        let snapshots = self.snapshots.range(start, end).await?;
        debug!(%start, %end, count = snapshots.len(), "loaded snapshots");
        Ok(snapshots)
    }
}

fn summarize(start: NaiveDate, end: NaiveDate, snapshots: &[AnalyticsSnapshot]) -> RangeMetrics {
    let mut orders = OrderCounts::default();
    let mut products = ProductCounts::default();
    let (mut revenue, mut new_users, mut active, mut buyers, mut sellers) = (Decimal::ZERO, 0u64, 0u64, 0u64, 0u64);
    for s in snapshots {
        revenue += s.metrics.revenue.total;
        orders.merge(&s.metrics.orders);
        products.merge(&s.metrics.products);
        new_users += s.metrics.users.new;
        active += s.metrics.users.active;
        buyers += s.metrics.users.buyers;
        sellers += s.metrics.users.sellers;
    }
    let average_active_users = if snapshots.is_empty() {
        0.0
    } else {
        ((active as f64 / snapshots.len() as f64) * 100.0).round() / 100.0
    };
    RangeMetrics {
        start,
        end,
        snapshot_count: snapshots.len(),
        total_revenue: revenue,
        average_order_value: average_order_value(revenue, orders.total),
        orders,
        new_users,
        average_active_users,
        buyers,
        sellers,
        products,
    }
}

fn average_order_value(revenue: Decimal, orders: u64) -> Decimal {
    if orders == 0 {
        return Decimal::ZERO;
    }
    (revenue / Decimal::from(orders)).round_dp(2)
}

fn check_range(start: NaiveDate, end: NaiveDate) -> Result<()> {
    if start > end {
        return Err(BackofficeError::Validation(format!("start {start} is after end {end}")));
    }
    Ok(())
}

fn month_start(date: NaiveDate) -> NaiveDate { date - Duration::days(i64::from(date.day0())) }
