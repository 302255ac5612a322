//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    id: Uuid,
    vendor_id: Uuid,
    name: String,
    category: String,
    image: Option<String>,
    price: Money,
    status: ModerationStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationStatus { #[default] Pending, Approved, Rejected, Flagged }

impl Product {
    /// New listings start out awaiting moderation.
    pub fn submit(vendor_id: Uuid, name: impl Into<String>, category: impl Into<String>, price: Money, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(), vendor_id, name: name.into(), category: category.into(), image: None,
            price, status: ModerationStatus::Pending, created_at: at, updated_at: at,
        }
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self { self.image = Some(url.into()); self }

    pub fn id(&self) -> Uuid { self.id }
    pub fn vendor_id(&self) -> Uuid { self.vendor_id }
    pub fn name(&self) -> &str { &self.name }
    pub fn category(&self) -> &str { &self.category }
    pub fn image(&self) -> Option<&str> { self.image.as_deref() }
    pub fn price(&self) -> &Money { &self.price }
    pub fn status(&self) -> ModerationStatus { self.status }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn is_approved(&self) -> bool { self.status == ModerationStatus::Approved }

    pub fn moderate(&mut self, status: ModerationStatus, at: DateTime<Utc>) {
        self.status = status;
        self.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_product_moderation() {
        let mut p = Product::submit(Uuid::new_v4(), "Lamp", "home", Money::usd(Decimal::new(1999, 2)), Utc::now());
        assert_eq!(p.status(), ModerationStatus::Pending);
        assert!(!p.is_approved());
        p.moderate(ModerationStatus::Approved, Utc::now());
        assert!(p.is_approved());
    }
}
