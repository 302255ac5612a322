//! Application services over the domain and the store traits.

pub mod analytics;
pub mod locks;
pub mod metrics;
pub mod orders;

#[cfg(test)]
pub(crate) mod fixtures;

pub use analytics::{DayOutcome, RecomputeEngine, RecomputeWarning, DEFAULT_TOP_PRODUCTS};
pub use metrics::{MetricsService, OverviewStats, RangeMetrics};
pub use orders::{
    NewLineItem, NewOrder, OrderService, OrderSettings, OrderUpdate, RecomputeDispatch, ReturnDecisionInput, ReturnInput,
};
