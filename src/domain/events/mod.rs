//! Domain events
use crate::domain::aggregates::{OrderStatus, PaymentStatus, ReturnDecision};
use crate::domain::value_objects::OrderNumber;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: Uuid, order_number: OrderNumber, total: Decimal },
    StatusChanged { order_id: Uuid, order_number: OrderNumber, from: OrderStatus, to: OrderStatus, actor_id: Uuid },
    PaymentChanged { order_id: Uuid, order_number: OrderNumber, from: PaymentStatus, to: PaymentStatus },
    ReturnRequested { order_id: Uuid, order_number: OrderNumber, reason: String },
    ReturnProcessed { order_id: Uuid, order_number: OrderNumber, decision: ReturnDecision, refund_amount: Option<Decimal> },
}

impl OrderEvent {
    pub fn order_id(&self) -> Uuid {
        match self {
            Self::Created { order_id, .. }
            | Self::StatusChanged { order_id, .. }
            | Self::PaymentChanged { order_id, .. }
            | Self::ReturnRequested { order_id, .. }
            | Self::ReturnProcessed { order_id, .. } => *order_id,
        }
    }

    /// Whether the vendor should hear about this event as well as the customer.
    pub fn concerns_vendor(&self) -> bool {
        matches!(self, Self::Created { .. } | Self::ReturnRequested { .. })
    }
}
