use axum::{
    extract::{Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use validator::Validate;

use super::require_admin;
use crate::app::AppState;
use crate::domain::aggregates::{Actor, AnalyticsSnapshot, RankBy, TopProduct};
use crate::services::analytics::DayOutcome;
use crate::services::metrics::{OverviewStats, RangeMetrics, RevenueAnalytics, UserActivity};
use crate::Result;

#[derive(Debug, Deserialize)]
pub struct RangeParams { pub start: NaiveDate, pub end: NaiveDate }

#[derive(Debug, Deserialize, Validate)]
pub struct TopProductsParams {
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default)]
    pub sort_by: RankBy,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RecomputeRequest {
    pub start: NaiveDate,
    /// Defaults to `start`.
    pub end: Option<NaiveDate>,
}

pub(super) async fn overview(State(s): State<AppState>, actor: Actor) -> Result<Json<OverviewStats>> {
    require_admin(&actor)?;
    Ok(Json(s.metrics.overview_stats().await?))
}

pub(super) async fn range(State(s): State<AppState>, actor: Actor, Query(p): Query<RangeParams>) -> Result<Json<RangeMetrics>> {
    require_admin(&actor)?;
    Ok(Json(s.metrics.date_range_metrics(p.start, p.end).await?))
}

pub(super) async fn revenue(State(s): State<AppState>, actor: Actor, Query(p): Query<RangeParams>) -> Result<Json<RevenueAnalytics>> {
    require_admin(&actor)?;
    Ok(Json(s.metrics.revenue_analytics(p.start, p.end).await?))
}

pub(super) async fn users(State(s): State<AppState>, actor: Actor, Query(p): Query<RangeParams>) -> Result<Json<UserActivity>> {
    require_admin(&actor)?;
    Ok(Json(s.metrics.user_activity(p.start, p.end).await?))
}

pub(super) async fn top_products(State(s): State<AppState>, actor: Actor, Query(p): Query<TopProductsParams>) -> Result<Json<Vec<TopProduct>>> {
    require_admin(&actor)?;
    p.validate()?;
    Ok(Json(s.metrics.top_products(p.start, p.end, p.sort_by, p.limit).await?))
}

pub(super) async fn snapshots(State(s): State<AppState>, actor: Actor, Query(p): Query<RangeParams>) -> Result<Json<Vec<AnalyticsSnapshot>>> {
    require_admin(&actor)?;
    Ok(Json(s.metrics.snapshots(p.start, p.end).await?))
}

pub(super) async fn recompute(State(s): State<AppState>, actor: Actor, Json(r): Json<RecomputeRequest>) -> Result<Json<Vec<DayOutcome>>> {
    require_admin(&actor)?;
    let end = r.end.unwrap_or(r.start);
    tracing::info!(actor_id = %actor.id, start = %r.start, %end, "manual analytics recompute");
    Ok(Json(s.analytics.recompute_range(r.start, end).await?))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{body_json, test_app};
    use super::super::{ACTOR_ID_HEADER, ACTOR_ROLE_HEADER};
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn request(method: Method, uri: &str, role: &str, body: Option<serde_json::Value>) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(ACTOR_ID_HEADER, Uuid::new_v4().to_string())
            .header(ACTOR_ROLE_HEADER, role)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap()
    }

    #[tokio::test]
    async fn test_recompute_then_read_snapshots() {
        let (app, _) = test_app();
        let body = json!({"start": "2024-03-01", "end": "2024-03-02"});
        let response = app.clone().oneshot(request(Method::POST, "/api/v1/analytics/recompute", "admin", Some(body))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let outcomes = body_json(response).await;
        assert_eq!(outcomes.as_array().unwrap().len(), 2);
        assert_eq!(outcomes[0]["outcome"], "recomputed");

        let response = app.clone()
            .oneshot(request(Method::GET, "/api/v1/analytics/snapshots?start=2024-03-01&end=2024-03-31", "admin", None))
            .await.unwrap();
        let rows = body_json(response).await;
        assert_eq!(rows.as_array().unwrap().len(), 2);
        assert_eq!(rows[0]["hourly_activity"].as_array().unwrap().len(), 24);

        let response = app
            .oneshot(request(Method::GET, "/api/v1/analytics/range?start=2024-03-01&end=2024-03-31", "admin", None))
            .await.unwrap();
        let range = body_json(response).await;
        assert_eq!(range["snapshot_count"], 2);
        assert_eq!(range["average_order_value"], "0");
    }

    #[tokio::test]
    async fn test_analytics_require_admin() {
        let (app, _) = test_app();
        let response = app.oneshot(request(Method::GET, "/api/v1/analytics/overview", "seller", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_reversed_range_is_bad_request() {
        let (app, _) = test_app();
        let response = app
            .oneshot(request(Method::GET, "/api/v1/analytics/revenue?start=2024-03-05&end=2024-03-01", "admin", None))
            .await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_overview_on_empty_store() {
        let (app, _) = test_app();
        let response = app.oneshot(request(Method::GET, "/api/v1/analytics/overview", "admin", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let stats = body_json(response).await;
        assert_eq!(stats["growth"]["revenue"], 0.0);
        assert_eq!(stats["growth"]["orders"], 0.0);
    }
}
