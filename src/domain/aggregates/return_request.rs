//! Return/refund sub-record nested in an order

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use crate::domain::value_objects::Money;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus { Pending, Approved, Rejected, Escalated }

impl ReturnStatus {
    /// Approved and rejected requests can no longer be processed.
    pub fn is_terminal(&self) -> bool { matches!(self, Self::Approved | Self::Rejected) }

    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "pending", Self::Approved => "approved", Self::Rejected => "rejected", Self::Escalated => "escalated" }
    }
}

impl fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnDecision { Approved, Rejected, Escalated }

impl From<ReturnDecision> for ReturnStatus {
    fn from(decision: ReturnDecision) -> Self {
        match decision {
            ReturnDecision::Approved => ReturnStatus::Approved,
            ReturnDecision::Rejected => ReturnStatus::Rejected,
            ReturnDecision::Escalated => ReturnStatus::Escalated,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub reason: String,
    pub description: Option<String>,
    pub status: ReturnStatus,
    pub requested_at: DateTime<Utc>,
    pub processed_by: Option<Uuid>,
    pub processed_at: Option<DateTime<Utc>>,
    pub admin_comments: Option<String>,
    pub refund_amount: Option<Money>,
    pub evidence_images: Vec<String>,
}

impl ReturnRequest {
    pub fn open(reason: impl Into<String>, description: Option<String>, evidence_images: Vec<String>, at: DateTime<Utc>) -> Self {
        Self {
            reason: reason.into(), description, status: ReturnStatus::Pending, requested_at: at,
            processed_by: None, processed_at: None, admin_comments: None, refund_amount: None, evidence_images,
        }
    }

    pub fn is_open(&self) -> bool { !self.status.is_terminal() }

    pub(crate) fn record_decision(
        &mut self,
        decision: ReturnDecision,
        actor_id: Uuid,
        admin_comments: Option<String>,
        refund_amount: Option<Money>,
        at: DateTime<Utc>,
    ) -> Result<(), ReturnError> {
        if self.status.is_terminal() { return Err(ReturnError::AlreadyProcessed(self.status)); }
        self.status = decision.into();
        self.processed_by = Some(actor_id);
        self.processed_at = Some(at);
        if admin_comments.is_some() { self.admin_comments = admin_comments; }
        if decision == ReturnDecision::Approved { self.refund_amount = refund_amount; }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReturnError {
    #[error("returns can only be requested for delivered orders (status is {0})")]
    NotDelivered(super::OrderStatus),
    #[error("a return request is already {0}")]
    AlreadyOpen(ReturnStatus),
    #[error("no return request exists for this order")]
    NoRequest,
    #[error("return request was already {0}")]
    AlreadyProcessed(ReturnStatus),
    #[error("refund {refund} exceeds order total {total}")]
    RefundExceedsTotal { refund: Money, total: Money },
    #[error("refund amount must not be negative")]
    NegativeRefund,
}
