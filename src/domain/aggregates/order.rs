//! Order Aggregate
//!
//! Owns the order state machine. Every status change goes through
//! [`Order::transition`] or the return workflow, and both update `status` and
//! append to the [`StatusLog`] in one step, so the last log entry always
//! matches the current status.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::aggregates::return_request::{ReturnDecision, ReturnError, ReturnRequest};
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::{Money, MoneyError, OrderNumber};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { Pending, Processing, Shipped, Delivered, Cancelled, Returned }

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        Self::Pending, Self::Processing, Self::Shipped, Self::Delivered, Self::Cancelled, Self::Returned,
    ];

    /// Targets reachable through a plain status transition.
    ///
    /// `Returned` is absent on purpose: it is only entered by approving a
    /// return request on a delivered order.
    pub fn successors(&self) -> &'static [OrderStatus] {
        match self {
            Self::Pending => &[Self::Processing, Self::Cancelled],
            Self::Processing => &[Self::Shipped, Self::Cancelled],
            Self::Shipped => &[Self::Delivered, Self::Cancelled],
            Self::Delivered | Self::Cancelled | Self::Returned => &[],
        }
    }

    pub fn can_transition_to(&self, target: OrderStatus) -> bool { self.successors().contains(&target) }

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Cancelled | Self::Returned) }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Returned => "returned",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus { #[default] Pending, Paid, Refunded, Failed }

impl PaymentStatus {
    pub fn can_transition_to(&self, target: PaymentStatus) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Paid) | (Self::Pending, Self::Failed) | (Self::Paid, Self::Refunded)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "pending", Self::Paid => "paid", Self::Refunded => "refunded", Self::Failed => "failed" }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem { pub product_id: Uuid, pub name: String, pub quantity: u32, pub unit_price: Money, pub subtotal: Money }

impl LineItem {
    pub fn new(product_id: Uuid, name: impl Into<String>, quantity: u32, unit_price: Money) -> Result<Self, OrderError> {
        if quantity == 0 { return Err(OrderError::InvalidQuantity { product_id }); }
        if unit_price.is_negative() { return Err(OrderError::NegativePrice { product_id }); }
        let subtotal = unit_price.multiply(quantity)?;
        Ok(Self { product_id, name: name.into(), quantity, unit_price, subtotal })
    }

    fn is_consistent(&self) -> bool { self.unit_price.multiply(self.quantity).is_ok_and(|s| s == self.subtotal) }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusLogEntry {
    pub status: OrderStatus,
    pub actor_id: Uuid,
    pub comment: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Append-only audit trail of status changes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusLog(Vec<StatusLogEntry>);

impl StatusLog {
    fn append(&mut self, entry: StatusLogEntry) { self.0.push(entry); }

    pub fn entries(&self) -> &[StatusLogEntry] { &self.0 }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn last(&self) -> Option<&StatusLogEntry> { self.0.last() }

    /// Most recent time the order entered `status`.
    pub fn reached_at(&self, status: OrderStatus) -> Option<DateTime<Utc>> {
        self.0.iter().rev().find(|e| e.status == status).map(|e| e.timestamp)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    id: Uuid,
    order_number: OrderNumber,
    customer_id: Uuid,
    vendor_id: Uuid,
    items: Vec<LineItem>,
    total: Money,
    status: OrderStatus,
    payment_status: PaymentStatus,
    status_log: StatusLog,
    return_request: Option<ReturnRequest>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    version: u64,
    #[serde(skip)]
    events: Vec<OrderEvent>,
}

impl Order {
    pub fn place(
        order_number: OrderNumber,
        customer_id: Uuid,
        vendor_id: Uuid,
        items: Vec<LineItem>,
        at: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        let first = items.first().ok_or(OrderError::NoItems)?;
        let total = items.iter().skip(1).try_fold(first.subtotal.clone(), |acc, item| acc.add(&item.subtotal))?;
        let id = Uuid::now_v7();
        let mut status_log = StatusLog::default();
        status_log.append(StatusLogEntry { status: OrderStatus::Pending, actor_id: customer_id, comment: None, timestamp: at });
        let mut order = Self {
            id, order_number, customer_id, vendor_id, items, total,
            status: OrderStatus::Pending, payment_status: PaymentStatus::Pending, status_log,
            return_request: None, created_at: at, updated_at: at, version: 0, events: vec![],
        };
        order.check_invariants()?;
        order.raise_event(OrderEvent::Created { order_id: id, order_number: order.order_number.clone(), total: order.total.amount() });
        Ok(order)
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_number(&self) -> &OrderNumber { &self.order_number }
    pub fn customer_id(&self) -> Uuid { self.customer_id }
    pub fn vendor_id(&self) -> Uuid { self.vendor_id }
    pub fn items(&self) -> &[LineItem] { &self.items }
    pub fn total(&self) -> &Money { &self.total }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn payment_status(&self) -> PaymentStatus { self.payment_status }
    pub fn status_log(&self) -> &StatusLog { &self.status_log }
    pub fn return_request(&self) -> Option<&ReturnRequest> { self.return_request.as_ref() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn version(&self) -> u64 { self.version }
    pub fn creation_day(&self) -> NaiveDate { self.created_at.date_naive() }

    /// When the order was delivered, if it ever was.
    pub fn delivered_at(&self) -> Option<DateTime<Utc>> { self.status_log.reached_at(OrderStatus::Delivered) }
    pub fn delivery_day(&self) -> Option<NaiveDate> { self.delivered_at().map(|at| at.date_naive()) }

    /// Revenue is only recognised for orders that are delivered right now.
    pub fn counts_as_revenue(&self) -> bool { self.status == OrderStatus::Delivered }

    pub(crate) fn with_version(mut self, version: u64) -> Self { self.version = version; self }
    pub(crate) fn set_version(&mut self, version: u64) { self.version = version; }

    /// Applies a guarded status change, returning the previous status.
    ///
    /// Nothing is mutated when the guard rejects the transition.
    pub fn transition(
        &mut self,
        target: OrderStatus,
        actor_id: Uuid,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<OrderStatus, OrderError> {
        let from = self.status;
        if !from.can_transition_to(target) {
            return Err(OrderError::InvalidTransition { from, to: target });
        }
        self.record_status(target, actor_id, comment, at);
        Ok(from)
    }

    pub fn update_payment_status(&mut self, target: PaymentStatus, at: DateTime<Utc>) -> Result<PaymentStatus, OrderError> {
        let from = self.payment_status;
        if !from.can_transition_to(target) {
            return Err(OrderError::InvalidPaymentTransition { from, to: target });
        }
        self.payment_status = target;
        self.touch(at);
        self.raise_event(OrderEvent::PaymentChanged { order_id: self.id, order_number: self.order_number.clone(), from, to: target });
        Ok(from)
    }

    pub fn request_return(
        &mut self,
        reason: impl Into<String>,
        description: Option<String>,
        evidence_images: Vec<String>,
        at: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if self.status != OrderStatus::Delivered {
            return Err(ReturnError::NotDelivered(self.status).into());
        }
        if let Some(existing) = self.return_request.as_ref().filter(|r| r.is_open()) {
            return Err(ReturnError::AlreadyOpen(existing.status).into());
        }
        let request = ReturnRequest::open(reason, description, evidence_images, at);
        self.raise_event(OrderEvent::ReturnRequested { order_id: self.id, order_number: self.order_number.clone(), reason: request.reason.clone() });
        self.return_request = Some(request);
        self.touch(at);
        Ok(())
    }

    /// Records an admin decision on the pending return.
    ///
    /// Approval moves the order to `returned` and, when the payment was
    /// captured and a refund is given, marks the payment refunded.
    pub fn process_return(
        &mut self,
        decision: ReturnDecision,
        actor_id: Uuid,
        admin_comments: Option<String>,
        refund_amount: Option<Money>,
        at: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        let request = self.return_request.as_ref().ok_or(ReturnError::NoRequest)?;
        if request.status.is_terminal() {
            return Err(ReturnError::AlreadyProcessed(request.status).into());
        }
        if decision == ReturnDecision::Approved {
            if self.status != OrderStatus::Delivered {
                return Err(ReturnError::NotDelivered(self.status).into());
            }
            if let Some(refund) = &refund_amount {
                self.check_refund(refund)?;
            }
        }
        let comment = admin_comments.clone();
        if let Some(request) = self.return_request.as_mut() {
            request.record_decision(decision, actor_id, admin_comments, refund_amount.clone(), at)?;
        }
        if decision == ReturnDecision::Approved {
            self.record_status(OrderStatus::Returned, actor_id, comment, at);
            if refund_amount.is_some() && self.payment_status == PaymentStatus::Paid {
                self.payment_status = PaymentStatus::Refunded;
            }
        } else {
            self.touch(at);
        }
        self.raise_event(OrderEvent::ReturnProcessed {
            order_id: self.id,
            order_number: self.order_number.clone(),
            decision,
            refund_amount: refund_amount.map(|m| m.amount()),
        });
        Ok(())
    }

    /// Checks the write-time invariants on totals and the audit trail.
    pub fn check_invariants(&self) -> Result<(), OrderError> {
        if self.items.is_empty() { return Err(OrderError::NoItems); }
        if let Some(item) = self.items.iter().find(|i| !i.is_consistent()) {
            return Err(OrderError::SubtotalMismatch { product_id: item.product_id });
        }
        let mut sum = Money::zero(self.total.currency());
        for item in &self.items { sum = sum.add(&item.subtotal)?; }
        if sum != self.total { return Err(OrderError::TotalMismatch { expected: sum, actual: self.total.clone() }); }
        match self.status_log.last() {
            Some(entry) if entry.status == self.status => Ok(()),
            Some(entry) => Err(OrderError::StatusLogMismatch { logged: entry.status, current: self.status }),
            None => Err(OrderError::EmptyStatusLog),
        }
    }

    pub fn take_events(&mut self) -> Vec<OrderEvent> { std::mem::take(&mut self.events) }

    fn check_refund(&self, refund: &Money) -> Result<(), OrderError> {
        if refund.is_negative() { return Err(ReturnError::NegativeRefund.into()); }
        if refund.currency() != self.total.currency() {
            return Err(MoneyError::CurrencyMismatch { expected: self.total.currency().to_string(), got: refund.currency().to_string() }.into());
        }
        if refund.amount() > self.total.amount() {
            return Err(ReturnError::RefundExceedsTotal { refund: refund.clone(), total: self.total.clone() }.into());
        }
        Ok(())
    }

    fn record_status(&mut self, target: OrderStatus, actor_id: Uuid, comment: Option<String>, at: DateTime<Utc>) {
        let from = self.status;
        self.status = target;
        self.status_log.append(StatusLogEntry { status: target, actor_id, comment, timestamp: at });
        self.touch(at);
        self.raise_event(OrderEvent::StatusChanged { order_id: self.id, order_number: self.order_number.clone(), from, to: target, actor_id });
    }

    fn raise_event(&mut self, e: OrderEvent) { self.events.push(e); }
    fn touch(&mut self, at: DateTime<Utc>) { self.updated_at = at; }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderError {
    #[error("order has no items")]
    NoItems,
    #[error("quantity for product {product_id} must be at least 1")]
    InvalidQuantity { product_id: Uuid },
    #[error("unit price for product {product_id} must not be negative")]
    NegativePrice { product_id: Uuid },
    #[error("subtotal for product {product_id} does not equal quantity x unit price")]
    SubtotalMismatch { product_id: Uuid },
    #[error("order total {actual} does not equal sum of items {expected}")]
    TotalMismatch { expected: Money, actual: Money },
    #[error("status log is empty")]
    EmptyStatusLog,
    #[error("status log ends in {logged} but order is {current}")]
    StatusLogMismatch { logged: OrderStatus, current: OrderStatus },
    #[error("cannot transition order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("cannot change payment status from {from} to {to}")]
    InvalidPaymentTransition { from: PaymentStatus, to: PaymentStatus },
    #[error("unknown order status '{0}'")]
    UnknownStatus(String),
    #[error(transparent)]
    Money(#[from] MoneyError),
    #[error(transparent)]
    Return(#[from] ReturnError),
}
