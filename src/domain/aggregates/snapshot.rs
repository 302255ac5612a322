//! Daily analytics snapshot
//!
//! One record per UTC calendar day. A snapshot is rebuilt from the source
//! records every time, never incremented, so it carries no timestamps of
//! its own and two rebuilds over the same data serialize identically.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;
use crate::domain::aggregates::{ModerationStatus, OrderStatus};

pub const HOURS_PER_DAY: usize = 24;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub date: NaiveDate,
    pub metrics: SnapshotMetrics,
    pub top_products: Vec<TopProduct>,
    pub hourly_activity: Vec<HourlyActivity>,
}

impl AnalyticsSnapshot {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            metrics: SnapshotMetrics::default(),
            top_products: vec![],
            hourly_activity: (0..HOURS_PER_DAY as u8).map(|hour| HourlyActivity { hour, active_users: 0 }).collect(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetrics {
    pub revenue: RevenueMetrics,
    pub orders: OrderCounts,
    pub users: UserCounts,
    pub products: ProductCounts,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RevenueMetrics {
    pub total: Decimal,
    pub growth_vs_previous_day: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCounts {
    pub pending: u64,
    pub processing: u64,
    pub shipped: u64,
    pub delivered: u64,
    pub cancelled: u64,
    pub returned: u64,
    pub total: u64,
}

impl OrderCounts {
    pub fn record(&mut self, status: OrderStatus) {
        *self.slot(status) += 1;
        self.total += 1;
    }

    pub fn get(&self, status: OrderStatus) -> u64 {
        match status {
            OrderStatus::Pending => self.pending,
            OrderStatus::Processing => self.processing,
            OrderStatus::Shipped => self.shipped,
            OrderStatus::Delivered => self.delivered,
            OrderStatus::Cancelled => self.cancelled,
            OrderStatus::Returned => self.returned,
        }
    }

    pub fn merge(&mut self, other: &OrderCounts) {
        for status in OrderStatus::ALL { *self.slot(status) += other.get(status); }
        self.total += other.total;
    }

    fn slot(&mut self, status: OrderStatus) -> &mut u64 {
        match status {
            OrderStatus::Pending => &mut self.pending,
            OrderStatus::Processing => &mut self.processing,
            OrderStatus::Shipped => &mut self.shipped,
            OrderStatus::Delivered => &mut self.delivered,
            OrderStatus::Cancelled => &mut self.cancelled,
            OrderStatus::Returned => &mut self.returned,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCounts {
    pub active: u64,
    pub new: u64,
    pub buyers: u64,
    pub sellers: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCounts {
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
    pub flagged: u64,
    pub total: u64,
}

impl ProductCounts {
    pub fn record(&mut self, status: ModerationStatus) {
        match status {
            ModerationStatus::Pending => self.pending += 1,
            ModerationStatus::Approved => self.approved += 1,
            ModerationStatus::Rejected => self.rejected += 1,
            ModerationStatus::Flagged => self.flagged += 1,
        }
        self.total += 1;
    }

    pub fn merge(&mut self, other: &ProductCounts) {
        self.pending += other.pending;
        self.approved += other.approved;
        self.rejected += other.rejected;
        self.flagged += other.flagged;
        self.total += other.total;
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopProduct {
    pub product_id: Uuid,
    pub name: String,
    pub category: String,
    pub image: Option<String>,
    pub units_sold: u64,
    pub revenue: Decimal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourlyActivity { pub hour: u8, pub active_users: u64 }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankBy { #[default] Revenue, Sales }

/// Sorts descending by the chosen key, ties broken by ascending product id,
/// and keeps the first `limit`.
pub fn rank_products(mut products: Vec<TopProduct>, by: RankBy, limit: usize) -> Vec<TopProduct> {
    products.sort_by(|a, b| {
        let primary = match by {
            RankBy::Revenue => b.revenue.cmp(&a.revenue).then_with(|| b.units_sold.cmp(&a.units_sold)),
            RankBy::Sales => b.units_sold.cmp(&a.units_sold).then_with(|| b.revenue.cmp(&a.revenue)),
        };
        match primary {
            Ordering::Equal => a.product_id.cmp(&b.product_id),
            other => other,
        }
    });
    products.truncate(limit);
    products
}
