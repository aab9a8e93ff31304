//! Report endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::{
    error::AppResult,
    models::report::{DateWindow, Report, ReportKind},
    AppState,
};

/// Generate a report
#[utoipa::path(
    get,
    path = "/reports/{kind}",
    tag = "reports",
    params(
        ("kind" = ReportKind, Path, description = "loans, fines, overdue-returns, member-activity or book-inventory"),
        DateWindow
    ),
    responses(
        (status = 200, description = "Report rows", body = Report),
        (status = 400, description = "Invalid date window"),
        (status = 404, description = "Unknown report kind")
    )
)]
pub async fn generate_report(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<DateWindow>,
) -> AppResult<Json<Report>> {
    let kind: ReportKind = kind.parse()?;
    let window = DateWindow::new(query.start_date, query.end_date)?;
    let report = state.services.reports.generate(kind, window).await?;
    Ok(Json(report))
}
