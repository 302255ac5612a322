//! Marketplace Back-office
//!
//! Order lifecycle, return workflow and the daily analytics derived from them.
//!
//! ## Features
//! - Guarded order state machine with an append-only status log
//! - Return/refund workflow nested in each order
//! - Idempotent per-day analytics snapshots rebuilt from source records
//! - Range metrics with zero-guarded growth and stable top-N rankings

pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod notify;
pub mod services;
pub mod store;
pub mod telemetry;

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::aggregates::{OrderError, OrderStatus, ReturnError};
use crate::domain::value_objects::MoneyError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum BackofficeError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("cannot transition order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("missing or malformed caller identity: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("analytics recompute failed for {date}: {reason}")]
    RecomputeFailure { date: NaiveDate, reason: String },

    #[error("storage error: {0}")]
    Storage(String),
}

impl BackofficeError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }

    /// Machine-readable code returned to API callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::Conflict(_) => "CONFLICT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::RecomputeFailure { .. } => "RECOMPUTE_FAILURE",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<OrderError> for BackofficeError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidTransition { from, to } => Self::InvalidTransition { from, to },
            OrderError::Return(ReturnError::NoRequest) => Self::not_found("return request", "order has none"),
            OrderError::Return(ReturnError::AlreadyOpen(_)) => Self::Conflict(err.to_string()),
            OrderError::Return(ReturnError::NotDelivered(_) | ReturnError::AlreadyProcessed(_)) => Self::InvalidState(err.to_string()),
            OrderError::InvalidPaymentTransition { .. } => Self::InvalidState(err.to_string()),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<MoneyError> for BackofficeError {
    fn from(err: MoneyError) -> Self { Self::Validation(err.to_string()) }
}

impl From<sqlx::Error> for BackofficeError {
    fn from(err: sqlx::Error) -> Self { Self::Storage(err.to_string()) }
}

pub type Result<T> = std::result::Result<T, BackofficeError>;
