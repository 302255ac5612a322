//! Order lifecycle operations
//!
//! Mutations are serialized per order with an in-process lock and guarded
//! across processes by the store's version check. After a change is stored
//! the affected analytics days are refreshed explicitly and the collected
//! domain events go out to the notifier.

mod returns;

pub use returns::{ReturnDecisionInput, ReturnInput};

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::aggregates::{Actor, LineItem, Order, OrderError, OrderStatus, PaymentStatus, UserRole};
use crate::domain::value_objects::{Money, OrderNumber};
use crate::notify::Notifier;
use crate::services::analytics::{RecomputeEngine, RecomputeWarning};
use crate::services::locks::KeyedLocks;
use crate::store::{CatalogStore, OrderFilter, OrderSequence, OrderStore};
use crate::{BackofficeError, Result};

pub const DEFAULT_NUMBER_PREFIX: &str = "ORD";

/// How analytics refreshes triggered by a mutation are run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecomputeDispatch {
    /// Awaited before the mutation returns; failures come back as warnings.
    Inline,
    /// Spawned with bounded retry; the mutation returns immediately.
    Background { max_attempts: u32, retry_delay: Duration },
}

#[derive(Debug, Clone)]
pub struct OrderSettings {
    pub number_prefix: String,
    pub dispatch: RecomputeDispatch,
}

impl Default for OrderSettings {
    fn default() -> Self { Self { number_prefix: DEFAULT_NUMBER_PREFIX.to_string(), dispatch: RecomputeDispatch::Inline } }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewLineItem { pub product_id: Uuid, pub name: String, pub quantity: u32, pub unit_price: Decimal }

#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder { pub customer_id: Uuid, pub vendor_id: Uuid, pub currency: String, pub items: Vec<NewLineItem> }

/// A stored order plus any analytics refreshes that did not go through.
#[derive(Debug, Clone, Serialize)]
pub struct OrderUpdate {
    pub order: Order,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<RecomputeWarning>,
}

pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    sequence: Arc<dyn OrderSequence>,
    catalog: Arc<dyn CatalogStore>,
    engine: Arc<RecomputeEngine>,
    notifier: Arc<dyn Notifier>,
    locks: KeyedLocks<Uuid>,
    settings: OrderSettings,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        sequence: Arc<dyn OrderSequence>,
        catalog: Arc<dyn CatalogStore>,
        engine: Arc<RecomputeEngine>,
        notifier: Arc<dyn Notifier>,
        settings: OrderSettings,
    ) -> Self {
        Self { orders, sequence, catalog, engine, notifier, locks: KeyedLocks::new(), settings }
    }

    #[instrument(skip(self, input), fields(customer_id = %input.customer_id, vendor_id = %input.vendor_id))]
    pub async fn create_order(&self, actor: &Actor, input: NewOrder) -> Result<OrderUpdate> {
        if !(actor.is_admin() || actor.id == input.customer_id) {
            return Err(BackofficeError::Forbidden("orders can only be placed by the customer or an admin".into()));
        }
        self.check_references(&input).await?;
        let currency = input.currency.trim().to_uppercase();
        let items = input.items.into_iter()
            .map(|i| LineItem::new(i.product_id, i.name, i.quantity, Money::new(i.unit_price, &currency)))
            .collect::<std::result::Result<Vec<_>, OrderError>>()?;

        let now = Utc::now();
        let period = OrderNumber::period_of(now);
        let sequence = self.sequence.next_value(&period).await?;
        let number = OrderNumber::format(&self.settings.number_prefix, &period, sequence);
        let mut order = Order::place(number, input.customer_id, input.vendor_id, items, now)?;
        self.orders.insert(&order).await?;
        info!(order_id = %order.id(), order_number = %order.order_number(), total = %order.total(), "order created");

        let warnings = self.refresh_analytics(BTreeSet::from([order.creation_day()])).await;
        self.publish(&mut order).await;
        Ok(OrderUpdate { order, warnings })
    }

    /// Every user and product an order names must already be in the catalog,
    /// otherwise the day's snapshot could never be rebuilt.
    async fn check_references(&self, input: &NewOrder) -> Result<()> {
        for id in [input.customer_id, input.vendor_id] {
            if self.catalog.get_user(id).await?.is_none() {
                return Err(BackofficeError::not_found("user", id));
            }
        }
        let products: BTreeSet<Uuid> = input.items.iter().map(|i| i.product_id).collect();
        for id in products {
            if self.catalog.get_product(id).await?.is_none() {
                return Err(BackofficeError::not_found("product", id));
            }
        }
        Ok(())
    }

    pub async fn get_order(&self, actor: &Actor, order_id: Uuid) -> Result<Order> {
        let order = self.load(order_id).await?;
        if !(actor.is_admin() || actor.id == order.customer_id() || actor.id == order.vendor_id()) {
            return Err(BackofficeError::Forbidden(format!("no access to order {order_id}")));
        }
        Ok(order)
    }

    /// Admins see every order; buyers and sellers only their own.
    pub async fn list_orders(&self, actor: &Actor, mut filter: OrderFilter) -> Result<(Vec<Order>, u64)> {
        match actor.role {
            UserRole::Admin => {}
            UserRole::Buyer => filter.customer_id = Some(actor.id),
            UserRole::Seller => filter.vendor_id = Some(actor.id),
        }
        self.orders.list(&filter).await
    }

    /// Moves the order along the lifecycle.
    ///
    /// Admins and the order's vendor may apply any permitted edge; the
    /// customer may only cancel a pending order.
    #[instrument(skip(self, actor, comment), fields(actor_id = %actor.id))]
    pub async fn transition_status(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        actor: &Actor,
        comment: Option<String>,
    ) -> Result<OrderUpdate> {
        let mut order = {
            let _guard = self.locks.lock(&order_id).await;
            let mut order = self.load(order_id).await?;
            authorize_transition(actor, &order, target)?;
            let from = order.transition(target, actor.id, comment, Utc::now()).map_err(|e| {
                warn!(%order_id, error = %e, "rejected status transition");
                e
            })?;
            self.persist(&mut order).await?;
            info!(%order_id, order_number = %order.order_number(), %from, to = %target, "order status changed");
            order
        };

        let mut days = BTreeSet::from([order.creation_day()]);
        if target == OrderStatus::Delivered {
            days.extend(order.delivery_day());
        }
        let warnings = self.refresh_analytics(days).await;
        self.publish(&mut order).await;
        Ok(OrderUpdate { order, warnings })
    }

    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn update_payment_status(&self, order_id: Uuid, target: PaymentStatus, actor: &Actor) -> Result<OrderUpdate> {
        if !actor.is_admin() {
            return Err(BackofficeError::Forbidden("payment status can only be changed by an admin".into()));
        }
        let mut order = {
            let _guard = self.locks.lock(&order_id).await;
            let mut order = self.load(order_id).await?;
            let from = order.update_payment_status(target, Utc::now())?;
            self.persist(&mut order).await?;
            info!(%order_id, %from, to = %target, "payment status changed");
            order
        };
        self.publish(&mut order).await;
        Ok(OrderUpdate { order, warnings: vec![] })
    }

    async fn load(&self, order_id: Uuid) -> Result<Order> {
        self.orders.get(order_id).await?.ok_or_else(|| BackofficeError::not_found("order", order_id))
    }

    async fn persist(&self, order: &mut Order) -> Result<()> {
        let version = self.orders.update(order).await?;
        order.set_version(version);
        Ok(())
    }

    async fn refresh_analytics(&self, days: BTreeSet<NaiveDate>) -> Vec<RecomputeWarning> {
        match &self.settings.dispatch {
            RecomputeDispatch::Inline => {
                let mut warnings = Vec::new();
                for date in days {
                    if let Err(e) = self.engine.recompute_day(date).await {
                        warnings.push(RecomputeWarning { date, message: e.to_string() });
                    }
                }
                warnings
            }
            RecomputeDispatch::Background { max_attempts, retry_delay } => {
                self.engine.clone().spawn_recompute(days.into_iter().collect(), *max_attempts, *retry_delay);
                vec![]
            }
        }
    }

    async fn publish(&self, order: &mut Order) {
        for event in order.take_events() {
            let payload = match serde_json::to_value(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(order_id = %event.order_id(), error = %e, "could not encode notification");
                    continue;
                }
            };
            let mut recipients = vec![order.customer_id()];
            if event.concerns_vendor() { recipients.push(order.vendor_id()); }
            for user_id in recipients {
                if let Err(e) = self.notifier.notify(user_id, &payload).await {
                    warn!(%user_id, order_id = %event.order_id(), error = %e, "notification failed");
                }
            }
        }
    }
}

fn authorize_transition(actor: &Actor, order: &Order, target: OrderStatus) -> Result<()> {
    let customer_cancel = actor.id == order.customer_id()
        && target == OrderStatus::Cancelled
        && order.status() == OrderStatus::Pending;
    if actor.is_admin() || actor.id == order.vendor_id() || customer_cancel {
        Ok(())
    } else {
        Err(BackofficeError::Forbidden(format!("actor {} may not move order {} to {}", actor.id, order.id(), target)))
    }
}
