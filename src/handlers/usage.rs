//! # Usage Handlers
//!
//! Daily activity reporting, proxied from the model-serving proxy's
//! paginated activity endpoint.

use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::ApiError;
use crate::proxy::DailyActivityReport;
use crate::server::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct DailyActivityQuery {
    /// Inclusive start date (YYYY-MM-DD)
    pub start_date: String,
    /// Inclusive end date (YYYY-MM-DD)
    pub end_date: String,
}

/// Daily activity across the full date range, all pages accumulated
#[utoipa::path(
    get,
    path = "/usage/daily",
    params(DailyActivityQuery),
    responses(
        (status = 200, description = "Per-day usage with proxy-supplied aggregates"),
        (status = 503, description = "Proxy unavailable", body = ApiError)
    ),
    tag = "usage"
)]
pub async fn daily_activity(
    State(state): State<AppState>,
    Query(query): Query<DailyActivityQuery>,
) -> Result<Json<DailyActivityReport>, ApiError> {
    let report = state
        .proxy
        .get_daily_activity(&query.start_date, &query.end_date)
        .await?;
    Ok(Json(report))
}
