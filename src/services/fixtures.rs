//! Shared test wiring over the in-memory stores.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::aggregates::{
    Actor, LineItem, ModerationStatus, Order, OrderStatus, Product, User, UserRole,
};
use crate::domain::value_objects::{Money, OrderNumber};
use crate::notify::testing::RecordingNotifier;
use crate::notify::Notifier;
use crate::services::analytics::{RecomputeEngine, DEFAULT_TOP_PRODUCTS};
use crate::services::orders::{NewLineItem, NewOrder, OrderService, OrderSettings, OrderUpdate, RecomputeDispatch};
use crate::store::Stores;

pub fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
}

pub fn usd(amount: i64) -> Money { Money::usd(Decimal::from(amount)) }

pub struct Fixture {
    pub stores: Stores,
    pub engine: Arc<RecomputeEngine>,
    pub notifier: Arc<RecordingNotifier>,
    pub orders: Arc<OrderService>,
    pub admin: Actor,
    pub customer: User,
    pub vendor: User,
    pub widget: Product,
    pub gadget: Product,
}

impl Fixture {
    pub async fn new() -> Self {
        let stores = Stores::in_memory();
        let engine = Arc::new(RecomputeEngine::new(
            stores.orders.clone(),
            stores.catalog.clone(),
            stores.snapshots.clone(),
            DEFAULT_TOP_PRODUCTS,
        ));
        let notifier = Arc::new(RecordingNotifier::default());
        let orders = Arc::new(OrderService::new(
            stores.orders.clone(),
            stores.sequence.clone(),
            stores.catalog.clone(),
            engine.clone(),
            notifier.clone(),
            OrderSettings::default(),
        ));

        let now = Utc::now();
        let customer = User::register("Ada", "ada@example.com", UserRole::Buyer, now);
        let vendor = User::register("Vera", "vera@example.com", UserRole::Seller, now);
        stores.catalog.upsert_user(&customer).await.unwrap();
        stores.catalog.upsert_user(&vendor).await.unwrap();

        let mut widget = Product::submit(vendor.id(), "Widget", "tools", usd(10), now).with_image("widget.png");
        widget.moderate(ModerationStatus::Approved, now);
        let mut gadget = Product::submit(vendor.id(), "Gadget", "tools", usd(5), now);
        gadget.moderate(ModerationStatus::Approved, now);
        stores.catalog.upsert_product(&widget).await.unwrap();
        stores.catalog.upsert_product(&gadget).await.unwrap();

        Self { stores, engine, notifier, orders, admin: Actor::admin(Uuid::new_v4()), customer, vendor, widget, gadget }
    }

    pub fn customer_actor(&self) -> Actor { Actor::new(self.customer.id(), UserRole::Buyer) }

    pub fn vendor_actor(&self) -> Actor { Actor::new(self.vendor.id(), UserRole::Seller) }

    /// 2 x widget @ 10 + 1 x gadget @ 5.
    pub fn new_order(&self) -> NewOrder {
        NewOrder {
            customer_id: self.customer.id(),
            vendor_id: self.vendor.id(),
            currency: "usd".into(),
            items: vec![
                NewLineItem { product_id: self.widget.id(), name: "Widget".into(), quantity: 2, unit_price: Decimal::from(10) },
                NewLineItem { product_id: self.gadget.id(), name: "Gadget".into(), quantity: 1, unit_price: Decimal::from(5) },
            ],
        }
    }

    pub async fn place_order(&self) -> OrderUpdate {
        self.orders.create_order(&self.customer_actor(), self.new_order()).await.unwrap()
    }

    pub async fn deliver(&self, order_id: Uuid) {
        for target in [OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered] {
            self.orders.transition_status(order_id, target, &self.admin, None).await.unwrap();
        }
    }

    pub async fn delivered_order(&self) -> Uuid {
        let id = self.place_order().await.order.id();
        self.deliver(id).await;
        id
    }

    /// Writes an order straight to the store with back-dated timestamps,
    /// bypassing the service and its analytics refresh.
    pub async fn seed_order(
        &self,
        product_id: Uuid,
        quantity: u32,
        unit_price: i64,
        created_at: DateTime<Utc>,
        delivered_at: Option<DateTime<Utc>>,
    ) -> Order {
        let period = OrderNumber::period_of(created_at);
        let sequence = self.stores.sequence.next_value(&period).await.unwrap();
        let number = OrderNumber::format("SEED", &period, sequence);
        let item = LineItem::new(product_id, "seeded", quantity, usd(unit_price)).unwrap();
        let mut order = Order::place(number, self.customer.id(), self.vendor.id(), vec![item], created_at).unwrap();
        if let Some(delivered) = delivered_at {
            for target in [OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered] {
                order.transition(target, self.admin.id, None, delivered).unwrap();
            }
        }
        self.stores.orders.insert(&order).await.unwrap();
        self.stores.orders.get(order.id()).await.unwrap().unwrap()
    }

    pub fn service_with_notifier(&self, notifier: Arc<dyn Notifier>) -> OrderService {
        OrderService::new(
            self.stores.orders.clone(),
            self.stores.sequence.clone(),
            self.stores.catalog.clone(),
            self.engine.clone(),
            notifier,
            OrderSettings::default(),
        )
    }

    pub fn service_with_dispatch(&self, dispatch: RecomputeDispatch) -> OrderService {
        let settings = OrderSettings { dispatch, ..OrderSettings::default() };
        OrderService::new(
            self.stores.orders.clone(),
            self.stores.sequence.clone(),
            self.stores.catalog.clone(),
            self.engine.clone(),
            self.notifier.clone(),
            settings,
        )
    }
}
