//! REST API handlers for the lifecycle reporting and operational
//! endpoints. Any uncaught engine failure is converted to a `500` with a
//! `{success: false, error}` envelope at this boundary.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, warn};

use storepulse_core::config::AppConfig;
use storepulse_core::{PulseError, PulseResult};
use storepulse_datastore::{EventHistory, OrderActivity, SnapshotStore, StoreRoster};
use storepulse_lifecycle::{
    CohortAnalyzer, FunnelAggregator, HeatmapAggregator, InactivityDetector,
};

/// Heatmap window length used when the caller gives no dates.
const DEFAULT_HEATMAP_DAYS: i64 = 27;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub funnel: Arc<FunnelAggregator>,
    pub cohorts: Arc<CohortAnalyzer>,
    pub heatmap: Arc<HeatmapAggregator>,
    pub inactivity: Arc<InactivityDetector>,
    pub node_id: String,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the engines against one datastore implementing every
    /// collaborator seam.
    pub fn from_datastore<D>(config: &AppConfig, datastore: Arc<D>) -> Self
    where
        D: StoreRoster + EventHistory + OrderActivity + SnapshotStore + 'static,
    {
        let roster: Arc<dyn StoreRoster> = datastore.clone();
        let events: Arc<dyn EventHistory> = datastore.clone();
        let orders: Arc<dyn OrderActivity> = datastore.clone();
        let snapshots: Arc<dyn SnapshotStore> = datastore;

        Self {
            funnel: Arc::new(FunnelAggregator::new(
                roster.clone(),
                events.clone(),
                orders.clone(),
                snapshots,
            )),
            cohorts: Arc::new(CohortAnalyzer::new(
                roster.clone(),
                events.clone(),
                orders.clone(),
                config.cohort.clone(),
                config.lookup.clone(),
            )),
            heatmap: Arc::new(HeatmapAggregator::new(roster.clone(), orders.clone())),
            inactivity: Arc::new(InactivityDetector::new(
                roster,
                events,
                orders,
                config.lookup.clone(),
            )),
            node_id: config.node_id.clone(),
            start_time: Instant::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn internal_error(endpoint: &'static str, err: PulseError) -> HandlerError {
    error!(error = %err, endpoint, "report computation failed");
    metrics::counter!("api.errors").increment(1);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            success: false,
            error: err.to_string(),
        }),
    )
}

fn ok(data: serde_json::Value) -> Json<serde_json::Value> {
    Json(json!({ "success": true, "data": data }))
}

#[derive(Debug, Deserialize)]
pub struct FunnelParams {
    /// Snapshot date; defaults to today.
    pub date: Option<NaiveDate>,
}

/// GET /v1/reports/funnel/daily — compute and upsert the daily funnel
/// snapshots for every scope, returning them.
pub async fn daily_funnel(
    State(state): State<AppState>,
    Query(params): Query<FunnelParams>,
) -> Result<Json<serde_json::Value>, HandlerError> {
    let snapshot_date = params.date.unwrap_or_else(|| Utc::now().date_naive());
    metrics::counter!("api.funnel_requests").increment(1);

    match state.funnel.run_daily(snapshot_date, None).await {
        Ok(report) => Ok(ok(json!({
            "overall": report.overall,
            "owners": report.owners,
        }))),
        Err(e) => Err(internal_error("daily_funnel", e)),
    }
}

#[derive(Debug, Deserialize)]
pub struct DashboardParams {
    /// Sub-report selector: `cohort`, `heatmap`, or `inactivity`.
    pub view: String,
    /// Cohort view; defaults to today.
    pub base_date: Option<NaiveDate>,
    /// Heatmap view; swapped with `end_date` if reversed.
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Inactivity view; defaults to yesterday.
    pub target_date: Option<NaiveDate>,
}

/// GET /v1/reports/dashboard — dispatch to the requested dashboard view.
pub async fn dashboard(
    State(state): State<AppState>,
    Query(params): Query<DashboardParams>,
) -> Result<Json<serde_json::Value>, HandlerError> {
    metrics::counter!("api.dashboard_requests").increment(1);
    let today = Utc::now().date_naive();

    let result: PulseResult<serde_json::Value> = match params.view.as_str() {
        "cohort" => {
            let base_date = params.base_date.unwrap_or(today);
            state
                .cohorts
                .analyze(base_date)
                .await
                .and_then(|report| serde_json::to_value(report).map_err(PulseError::from))
        }
        "heatmap" => {
            let end_date = params.end_date.unwrap_or(today);
            let start_date = params
                .start_date
                .unwrap_or(end_date - Duration::days(DEFAULT_HEATMAP_DAYS));
            state
                .heatmap
                .build(start_date, end_date)
                .await
                .and_then(|report| serde_json::to_value(report).map_err(PulseError::from))
        }
        "inactivity" => {
            let target_date = params.target_date.unwrap_or(today - Duration::days(1));
            state
                .inactivity
                .detect(target_date)
                .await
                .and_then(|report| serde_json::to_value(report).map_err(PulseError::from))
        }
        other => {
            warn!(view = other, "unknown dashboard view requested");
            Err(PulseError::Report(format!("unknown view: {other}")))
        }
    };

    match result {
        Ok(data) => Ok(ok(data)),
        Err(e) => Err(internal_error("dashboard", e)),
    }
}

/// GET /health — Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready — Readiness probe.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.start_time.elapsed().as_secs() > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /live — Liveness probe.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}
