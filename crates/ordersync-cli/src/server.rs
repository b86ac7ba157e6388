//! HTTP trigger for order sync runs.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use chrono::Local;
use ordersync_core::error::AppError;
use ordersync_core::models::{DateRange, CAFE24_CHANNEL};
use ordersync_core::pipeline::SyncService;
use ordersync_core::sync::SyncReport;
use ordersync_db::{SyncLogEntry, SyncLogRepository};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub const SYNC_ORDERS_PATH: &str = "/api/integrations/cafe24/sync-orders";

/// Shared by the HTTP handlers and the `sync` command.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SyncService>,
    /// Run audit log; runs are not recorded when absent.
    pub sync_log: Option<SyncLogRepository>,
}

/// Form body of the trigger. Empty strings count as absent.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncForm {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub orders_synced: usize,
    pub orders_skipped: usize,
    pub stock_deducted: usize,
    pub customers_matched: usize,
    pub duration_ms: u64,
}

impl From<&SyncReport> for SyncSummary {
    fn from(report: &SyncReport) -> Self {
        Self {
            orders_synced: report.orders_synced,
            orders_skipped: report.orders_skipped,
            stock_deducted: report.stock_deducted,
            customers_matched: report.customers_matched,
            duration_ms: report.duration_ms,
        }
    }
}

/// Result of one trigger, serialized as the HTTP response and the CLI output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<SyncSummary>,
}

impl SyncResponse {
    pub fn completed(report: &SyncReport) -> Self {
        let message = if report.orders_fetched == 0 {
            "동기화할 주문이 없습니다".to_string()
        } else {
            format!("{}개 주문 동기화 완료", report.orders_synced)
        };

        Self {
            success: true,
            message: Some(message),
            error: None,
            data: Some(SyncSummary::from(report)),
        }
    }

    pub fn failure(error: &AppError) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.user_message()),
            data: None,
        }
    }
}

/// Resolves the date range, runs one sync and records it in the audit log.
///
/// Never fails: every error ends up in the returned response.
pub async fn trigger_sync(
    state: &AppState,
    start_date: Option<&str>,
    end_date: Option<&str>,
) -> SyncResponse {
    let lookback = state.service.config().default_lookback_days;
    let range = match DateRange::from_inputs(start_date, end_date, Local::now().date_naive(), lookback)
    {
        Ok(range) => range,
        Err(e) => {
            warn!(error = %e, "Rejected sync request");
            return SyncResponse::failure(&e);
        }
    };

    let started = Instant::now();
    let result = state.service.run(range).await;

    if let Some(sync_log) = &state.sync_log {
        let entry = match &result {
            Ok(report) => SyncLogEntry::completed(CAFE24_CHANNEL, report),
            Err(e) => SyncLogEntry::failed(CAFE24_CHANNEL, e, started.elapsed().as_millis() as u64),
        };
        if let Err(e) = sync_log.record(&entry).await {
            warn!(error = %e, "Failed to record sync log");
        }
    }

    match result {
        Ok(report) => SyncResponse::completed(&report),
        Err(e) => SyncResponse::failure(&e),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(SYNC_ORDERS_PATH, post(sync_orders).get(sync_orders_usage))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn sync_orders(
    State(state): State<AppState>,
    form: Option<Form<SyncForm>>,
) -> Json<SyncResponse> {
    let form = form.map(|Form(form)| form).unwrap_or_default();
    info!(
        start_date = ?form.start_date,
        end_date = ?form.end_date,
        "Sync triggered over HTTP"
    );

    Json(trigger_sync(&state, form.start_date.as_deref(), form.end_date.as_deref()).await)
}

async fn sync_orders_usage() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "POST 요청으로 주문 동기화를 시작하세요",
        "params": {
            "startDate": "YYYY-MM-DD (선택, 기본: 7일 전)",
            "endDate": "YYYY-MM-DD (선택, 기본: 오늘)"
        }
    }))
}

async fn health() -> &'static str {
    "ok"
}
