//! Return/refund workflow

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{OrderService, OrderUpdate};
use crate::domain::aggregates::{Actor, ReturnDecision};
use crate::domain::value_objects::Money;
use crate::{BackofficeError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct ReturnInput {
    pub reason: String,
    pub description: Option<String>,
    #[serde(default)]
    pub evidence_images: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReturnDecisionInput {
    pub decision: ReturnDecision,
    pub admin_comments: Option<String>,
    pub refund_amount: Option<Decimal>,
}

impl OrderService {
    #[instrument(skip(self, actor, input), fields(actor_id = %actor.id))]
    pub async fn request_return(&self, order_id: Uuid, actor: &Actor, input: ReturnInput) -> Result<OrderUpdate> {
        let mut order = {
            let _guard = self.locks.lock(&order_id).await;
            let mut order = self.load(order_id).await?;
            if !(actor.is_admin() || actor.id == order.customer_id()) {
                return Err(BackofficeError::Forbidden("returns can only be requested by the order's customer".into()));
            }
            order.request_return(input.reason, input.description, input.evidence_images, Utc::now())?;
            self.persist(&mut order).await?;
            info!(%order_id, order_number = %order.order_number(), "return requested");
            order
        };
        self.publish(&mut order).await;
        Ok(OrderUpdate { order, warnings: vec![] })
    }

    /// Applies an admin decision to the order's return request.
    ///
    /// Approval moves the order to `returned`, so the delivery day is
    /// recomputed and no longer counts the order's revenue.
    #[instrument(skip(self, actor, input), fields(actor_id = %actor.id, decision = ?input.decision))]
    pub async fn process_return(&self, order_id: Uuid, actor: &Actor, input: ReturnDecisionInput) -> Result<OrderUpdate> {
        if !actor.is_admin() {
            return Err(BackofficeError::Forbidden("returns can only be processed by an admin".into()));
        }
        let mut order = {
            let _guard = self.locks.lock(&order_id).await;
            let mut order = self.load(order_id).await?;
            if order.return_request().is_none() {
                return Err(BackofficeError::not_found("return request", order_id));
            }
            let refund = input.refund_amount.map(|amount| Money::new(amount, order.total().currency()));
            order.process_return(input.decision, actor.id, input.admin_comments, refund, Utc::now())?;
            self.persist(&mut order).await?;
            info!(%order_id, order_number = %order.order_number(), decision = ?input.decision, "return processed");
            order
        };

        let warnings = if input.decision == ReturnDecision::Approved {
            let mut days = BTreeSet::from([order.creation_day()]);
            days.extend(order.delivery_day());
            self.refresh_analytics(days).await
        } else {
            vec![]
        };
        self.publish(&mut order).await;
        Ok(OrderUpdate { order, warnings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{OrderStatus, PaymentStatus, ReturnStatus};
    use crate::services::fixtures::Fixture;

    fn damaged() -> ReturnInput {
        ReturnInput { reason: "damaged".into(), description: Some("arrived broken".into()), evidence_images: vec!["a.jpg".into()] }
    }

    fn decide(decision: ReturnDecision) -> ReturnDecisionInput {
        ReturnDecisionInput { decision, admin_comments: Some("checked".into()), refund_amount: None }
    }

    #[tokio::test]
    async fn test_approved_return_removes_revenue() {
        let fx = Fixture::new().await;
        let id = fx.delivered_order().await;
        let today = Utc::now().date_naive();
        let delivered_revenue = fx.stores.snapshots.get(today).await.unwrap().unwrap().metrics.revenue.total;
        assert_eq!(delivered_revenue, Decimal::new(25, 0));

        fx.orders.request_return(id, &fx.customer_actor(), damaged()).await.unwrap();
        let input = ReturnDecisionInput { refund_amount: Some(Decimal::new(25, 0)), ..decide(ReturnDecision::Approved) };
        let update = fx.orders.process_return(id, &fx.admin, input).await.unwrap();

        assert_eq!(update.order.status(), OrderStatus::Returned);
        assert_eq!(update.order.status_log().last().unwrap().status, OrderStatus::Returned);
        let request = update.order.return_request().unwrap();
        assert_eq!(request.status, ReturnStatus::Approved);
        assert_eq!(request.processed_by, Some(fx.admin.id));
        assert_eq!(request.refund_amount.as_ref().map(|m| m.amount()), Some(Decimal::new(25, 0)));

        let snapshot = fx.stores.snapshots.get(today).await.unwrap().unwrap();
        assert_eq!(snapshot.metrics.revenue.total, Decimal::ZERO);
        assert_eq!(snapshot.metrics.orders.returned, 1);
    }

    #[tokio::test]
    async fn test_return_requires_delivered_order() {
        let fx = Fixture::new().await;
        let id = fx.place_order().await.order.id();
        let err = fx.orders.request_return(id, &fx.customer_actor(), damaged()).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
    }

    #[tokio::test]
    async fn test_open_return_conflicts() {
        let fx = Fixture::new().await;
        let id = fx.delivered_order().await;
        fx.orders.request_return(id, &fx.customer_actor(), damaged()).await.unwrap();
        fx.orders.process_return(id, &fx.admin, decide(ReturnDecision::Escalated)).await.unwrap();
        let err = fx.orders.request_return(id, &fx.customer_actor(), damaged()).await.unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
    }

    #[tokio::test]
    async fn test_process_without_request_is_not_found() {
        let fx = Fixture::new().await;
        let id = fx.delivered_order().await;
        let err = fx.orders.process_return(id, &fx.admin, decide(ReturnDecision::Approved)).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_reprocessing_terminal_request_rejected() {
        let fx = Fixture::new().await;
        let id = fx.delivered_order().await;
        fx.orders.request_return(id, &fx.customer_actor(), damaged()).await.unwrap();
        let rejected = fx.orders.process_return(id, &fx.admin, decide(ReturnDecision::Rejected)).await.unwrap();
        assert_eq!(rejected.order.status(), OrderStatus::Delivered);
        assert_eq!(rejected.order.status_log().len(), 4);

        let err = fx.orders.process_return(id, &fx.admin, decide(ReturnDecision::Approved)).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
        let stored = fx.stores.orders.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn test_only_admin_processes_and_only_customer_requests() {
        let fx = Fixture::new().await;
        let id = fx.delivered_order().await;
        let err = fx.orders.request_return(id, &fx.vendor_actor(), damaged()).await.unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
        fx.orders.request_return(id, &fx.customer_actor(), damaged()).await.unwrap();
        let err = fx.orders.process_return(id, &fx.vendor_actor(), decide(ReturnDecision::Approved)).await.unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
    }

    #[tokio::test]
    async fn test_refund_marks_paid_order_refunded() {
        let fx = Fixture::new().await;
        let id = fx.place_order().await.order.id();
        fx.orders.update_payment_status(id, PaymentStatus::Paid, &fx.admin).await.unwrap();
        fx.deliver(id).await;
        fx.orders.request_return(id, &fx.customer_actor(), damaged()).await.unwrap();
        let input = ReturnDecisionInput { refund_amount: Some(Decimal::new(10, 0)), ..decide(ReturnDecision::Approved) };
        let update = fx.orders.process_return(id, &fx.admin, input).await.unwrap();
        assert_eq!(update.order.payment_status(), PaymentStatus::Refunded);

        let too_much = fx.delivered_order().await;
        fx.orders.request_return(too_much, &fx.customer_actor(), damaged()).await.unwrap();
        let input = ReturnDecisionInput { refund_amount: Some(Decimal::new(100, 0)), ..decide(ReturnDecision::Approved) };
        let err = fx.orders.process_return(too_much, &fx.admin, input).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}
