//! Service wiring shared by the binary and the router tests.

use std::sync::Arc;

use crate::config::Config;
use crate::notify::Notifier;
use crate::services::{MetricsService, OrderService, OrderSettings, RecomputeEngine};
use crate::store::Stores;

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderService>,
    pub metrics: Arc<MetricsService>,
    pub analytics: Arc<RecomputeEngine>,
}

impl AppState {
    pub fn new(config: &Config, stores: Stores, notifier: Arc<dyn Notifier>) -> Self {
        let analytics = Arc::new(RecomputeEngine::new(
            stores.orders.clone(),
            stores.catalog.clone(),
            stores.snapshots.clone(),
            config.top_products_limit,
        ));
        let settings = OrderSettings { number_prefix: config.order_number_prefix.clone(), dispatch: config.recompute.clone() };
        let orders = Arc::new(OrderService::new(
            stores.orders.clone(),
            stores.sequence,
            stores.catalog.clone(),
            analytics.clone(),
            notifier,
            settings,
        ));
        let metrics = Arc::new(MetricsService::new(stores.snapshots, stores.orders, stores.catalog, config.top_products_limit));
        Self { orders, metrics, analytics }
    }
}
