//! Aggregates module
pub mod order;
pub mod return_request;
pub mod product;
pub mod user;
pub mod snapshot;

pub use order::{LineItem, Order, OrderError, OrderStatus, PaymentStatus, StatusLog, StatusLogEntry};
pub use return_request::{ReturnDecision, ReturnError, ReturnRequest, ReturnStatus};
pub use product::{ModerationStatus, Product};
pub use user::{Actor, User, UserRole};
pub use snapshot::{
    rank_products, AnalyticsSnapshot, HOURS_PER_DAY, HourlyActivity, OrderCounts, ProductCounts, RankBy, RevenueMetrics,
    SnapshotMetrics, TopProduct, UserCounts,
};
