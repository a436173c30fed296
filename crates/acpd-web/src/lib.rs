//! JSON API over the insights readers and the baseline reset.
//!
//! Route errors all share one envelope, `{"error": "..."}`, with the HTTP
//! status derived from the store error taxonomy. Parameter and body
//! validation happens before any query runs, so a bad request never costs a
//! database round trip.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info};

use acpd_core::{PerformanceStatus, Priority, RecommendationStatus};
use acpd_insights::{
    cost_category_detail, list_cost_categories, list_recommendations, performance_insights,
    recommendation_detail, update_status, CategoryFilter, RecommendationFilter,
};
use acpd_seed::{reset_to_baseline, Baseline};
use acpd_store::{connect_lazy, StoreConfig, StoreError, StoreResult};

pub const CRATE_NAME: &str = "acpd-web";

#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
}

impl AppState {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Deserialize, Default)]
struct CategoriesQuery {
    period: Option<String>,
    slug: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct InsightsQuery {
    period: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RecommendationsQuery {
    id: Option<String>,
    status: Option<String>,
    priority: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusUpdateBody {
    id: Option<i64>,
    status: Option<String>,
    #[serde(default)]
    changed_by: Option<String>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/cost-categories", get(cost_categories_handler))
        .route("/api/performance-insights", get(performance_insights_handler))
        .route("/api/recommendations", get(recommendations_handler))
        .route("/api/recommendations/status", patch(update_status_handler))
        .route("/api/admin/reset", post(admin_reset_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(Arc::new(state))
}

/// Binds `ACPD_WEB_PORT` (default 8000) with a lazy pool, so the server
/// comes up even while the database is still starting; `/healthz` reports
/// when it becomes reachable. Run migrations separately before serving.
pub async fn serve_from_env() -> anyhow::Result<()> {
    let config = StoreConfig::from_env()?;
    let pool = connect_lazy(&config)?;
    let port: u16 = std::env::var("ACPD_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "dashboard api listening");
    axum::serve(listener, app(AppState::new(pool))).await?;
    Ok(())
}

/// `?slug=` switches this route from the period listing to a single
/// category's detail view.
async fn cost_categories_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CategoriesQuery>,
) -> Response {
    if let Some(slug) = query.slug.as_deref() {
        return respond(cost_category_detail(&state.pool, query.period.as_deref(), slug).await);
    }
    let status = match parse_param(query.status.as_deref(), PerformanceStatus::parse, "status") {
        Ok(status) => status,
        Err(err) => return error_response(err),
    };
    let filter = CategoryFilter {
        period: query.period,
        slug: None,
        status,
    };
    respond(list_cost_categories(&state.pool, &filter).await)
}

async fn performance_insights_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<InsightsQuery>,
) -> Response {
    respond(performance_insights(&state.pool, query.period.as_deref()).await)
}

/// `?id=` switches this route from the filtered listing to a single
/// recommendation's detail view.
async fn recommendations_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecommendationsQuery>,
) -> Response {
    if let Some(raw) = query.id.as_deref() {
        return match raw.parse::<i64>() {
            Ok(id) => respond(recommendation_detail(&state.pool, id).await),
            Err(_) => error_response(StoreError::Validation(format!(
                "id must be an integer, got '{raw}'"
            ))),
        };
    }
    let status = match parse_param(query.status.as_deref(), RecommendationStatus::parse, "status") {
        Ok(status) => status,
        Err(err) => return error_response(err),
    };
    let priority = match parse_param(query.priority.as_deref(), Priority::parse, "priority") {
        Ok(priority) => priority,
        Err(err) => return error_response(err),
    };
    let filter = RecommendationFilter { status, priority };
    respond(list_recommendations(&state.pool, &filter).await)
}

async fn update_status_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StatusUpdateBody>,
) -> Response {
    let Some(id) = body.id else {
        return error_response(StoreError::Validation("id is required".into()));
    };
    let Some(raw) = body.status.as_deref() else {
        return error_response(StoreError::Validation("status is required".into()));
    };
    let Some(next) = RecommendationStatus::parse(raw) else {
        return error_response(StoreError::Validation(format!("unknown status '{raw}'")));
    };
    respond(update_status(&state.pool, id, next, body.changed_by.as_deref()).await)
}

async fn admin_reset_handler(State(state): State<Arc<AppState>>) -> Response {
    let baseline = match Baseline::builtin() {
        Ok(baseline) => baseline,
        Err(err) => return error_response(err),
    };
    respond(reset_to_baseline(&state.pool, &baseline).await)
}

async fn healthz_handler(State(state): State<Arc<AppState>>) -> Response {
    match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => Json(serde_json::json!({ "status": "ok" })).into_response(),
        Err(err) => error_response(StoreError::Unavailable(err.to_string())),
    }
}

fn respond<T: Serialize>(result: StoreResult<T>) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(err) => error_response(err),
    }
}

fn error_response(err: StoreError) -> Response {
    let status = match &err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Validation(_) => StatusCode::BAD_REQUEST,
        StoreError::ReferentialIntegrity(_) => StatusCode::CONFLICT,
        StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(%err, code = status.as_u16(), "request failed");
    }
    (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}

fn parse_param<T>(
    raw: Option<&str>,
    parse: impl Fn(&str) -> Option<T>,
    name: &str,
) -> Result<Option<T>, StoreError> {
    match raw {
        None => Ok(None),
        Some(value) => parse(value)
            .map(Some)
            .ok_or_else(|| StoreError::Validation(format!("unknown {name} '{value}'"))),
    }
}
