//! Admin analytics routes

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ApiResponse, AppState};
use crate::db::analytics::{DateRange, LogFilter, OverviewStats, Pagination};
use crate::db::AccessLogEntry;
use crate::error::ApiResult;

/// Overview window when the caller gives no dates
const DEFAULT_OVERVIEW_DAYS: i64 = 30;

/// Query parameters stay strings so malformed numbers fall back to defaults
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub ip: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub success: bool,
    pub data: Vec<AccessLogEntry>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub pages: i64,
}

fn parse_number(value: Option<&str>) -> Option<i64> {
    value.and_then(|v| v.trim().parse().ok())
}

/// API: paginated access log
pub async fn logs(State(state): State<Arc<AppState>>, Query(query): Query<LogsQuery>) -> ApiResult<Json<LogsResponse>> {
    let pagination = Pagination::new(parse_number(query.page.as_deref()), parse_number(query.limit.as_deref()));
    let filter = LogFilter {
        range: DateRange::parse(query.start_date.as_deref(), query.end_date.as_deref()),
        ip: query.ip,
        path: query.path,
    };

    let page = state.db.query_logs(pagination, &filter).await?;

    Ok(Json(LogsResponse {
        success: true,
        data: page.entries,
        total: page.total,
        page: page.page,
        limit: page.limit,
        pages: page.pages,
    }))
}

#[derive(Debug, Deserialize)]
pub struct OverviewQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// API: aggregate visit statistics (trailing 30 days by default)
pub async fn overview(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OverviewQuery>,
) -> ApiResult<Json<ApiResponse<OverviewStats>>> {
    let range = DateRange::parse_or_trailing(
        query.start_date.as_deref(),
        query.end_date.as_deref(),
        DEFAULT_OVERVIEW_DAYS,
    );
    let stats = state.db.overview(&range).await?;
    Ok(Json(ApiResponse::ok(stats)))
}
