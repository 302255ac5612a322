use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::PaginatedResponse;
use crate::app::AppState;
use crate::domain::aggregates::{Actor, Order, OrderStatus, PaymentStatus, ReturnDecision};
use crate::services::{NewLineItem, NewOrder, OrderUpdate, ReturnDecisionInput, ReturnInput};
use crate::store::OrderFilter;
use crate::Result;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<String>,
    pub customer_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    /// Defaults to the calling actor.
    pub customer_id: Option<Uuid>,
    pub vendor_id: Uuid,
    #[validate(length(equal = 3))]
    pub currency: String,
    #[validate(length(min = 1))]
    pub items: Vec<OrderItemRequest>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(range(min = 1))]
    pub quantity: u32,
    pub unit_price: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TransitionRequest {
    pub status: OrderStatus,
    #[validate(length(max = 500))]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest { pub payment_status: PaymentStatus }

#[derive(Debug, Deserialize, Validate)]
pub struct ReturnRequestBody {
    #[validate(length(min = 1, max = 200))]
    pub reason: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[serde(default)]
    pub evidence_images: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProcessReturnBody {
    pub decision: ReturnDecision,
    #[validate(length(max = 2000))]
    pub admin_comments: Option<String>,
    pub refund_amount: Option<Decimal>,
}

pub(super) async fn list_orders(State(s): State<AppState>, actor: Actor, Query(p): Query<ListParams>) -> Result<Json<PaginatedResponse<Order>>> {
    let page = p.page.unwrap_or(1).max(1);
    let per_page = p.per_page.unwrap_or(20).clamp(1, 100);
    let status = p.status.as_deref().map(str::parse::<OrderStatus>).transpose()?;
    let filter = OrderFilter { status, customer_id: p.customer_id, vendor_id: p.vendor_id, page, per_page };
    let (data, total) = s.orders.list_orders(&actor, filter).await?;
    Ok(Json(PaginatedResponse { data, total, page }))
}

pub(super) async fn create_order(State(s): State<AppState>, actor: Actor, Json(r): Json<CreateOrderRequest>) -> Result<(StatusCode, Json<OrderUpdate>)> {
    r.validate()?;
    for item in &r.items { item.validate()?; }
    let input = NewOrder {
        customer_id: r.customer_id.unwrap_or(actor.id),
        vendor_id: r.vendor_id,
        currency: r.currency,
        items: r.items.into_iter()
            .map(|i| NewLineItem { product_id: i.product_id, name: i.name, quantity: i.quantity, unit_price: i.unit_price })
            .collect(),
    };
    let created = s.orders.create_order(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub(super) async fn get_order(State(s): State<AppState>, actor: Actor, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(s.orders.get_order(&actor, id).await?))
}

pub(super) async fn transition_status(State(s): State<AppState>, actor: Actor, Path(id): Path<Uuid>, Json(r): Json<TransitionRequest>) -> Result<Json<OrderUpdate>> {
    r.validate()?;
    Ok(Json(s.orders.transition_status(id, r.status, &actor, r.comment).await?))
}

pub(super) async fn update_payment(State(s): State<AppState>, actor: Actor, Path(id): Path<Uuid>, Json(r): Json<PaymentRequest>) -> Result<Json<OrderUpdate>> {
    Ok(Json(s.orders.update_payment_status(id, r.payment_status, &actor).await?))
}

pub(super) async fn request_return(State(s): State<AppState>, actor: Actor, Path(id): Path<Uuid>, Json(r): Json<ReturnRequestBody>) -> Result<(StatusCode, Json<OrderUpdate>)> {
    r.validate()?;
    let input = ReturnInput { reason: r.reason, description: r.description, evidence_images: r.evidence_images };
    Ok((StatusCode::CREATED, Json(s.orders.request_return(id, &actor, input).await?)))
}

pub(super) async fn process_return(State(s): State<AppState>, actor: Actor, Path(id): Path<Uuid>, Json(r): Json<ProcessReturnBody>) -> Result<Json<OrderUpdate>> {
    r.validate()?;
    let input = ReturnDecisionInput { decision: r.decision, admin_comments: r.admin_comments, refund_amount: r.refund_amount };
    Ok(Json(s.orders.process_return(id, &actor, input).await?))
}
