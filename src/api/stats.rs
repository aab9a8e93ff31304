//! Statistics endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::AppResult,
    models::report::{ActivityPoint, DashboardStats, DateWindow, OverdueLoan, PopularBook},
    AppState,
};

/// Popular books query
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct PopularQuery {
    /// Count loans created on or after this date
    pub start_date: Option<NaiveDate>,
    /// Count loans created on or before this date
    pub end_date: Option<NaiveDate>,
    /// Number of books returned (default: 5)
    pub limit: Option<usize>,
}

/// Ledger summary
#[utoipa::path(
    get,
    path = "/stats/dashboard",
    tag = "stats",
    responses(
        (status = 200, description = "Dashboard counters", body = DashboardStats)
    )
)]
pub async fn dashboard(State(state): State<AppState>) -> AppResult<Json<DashboardStats>> {
    let stats = state.services.stats.dashboard().await?;
    Ok(Json(stats))
}

/// Active loans past their due date, most overdue first
#[utoipa::path(
    get,
    path = "/stats/overdue",
    tag = "stats",
    responses(
        (status = 200, description = "Overdue loans", body = Vec<OverdueLoan>)
    )
)]
pub async fn overdue_loans(State(state): State<AppState>) -> AppResult<Json<Vec<OverdueLoan>>> {
    let loans = state.services.stats.overdue_loans().await?;
    Ok(Json(loans))
}

/// Most borrowed books
#[utoipa::path(
    get,
    path = "/stats/popular",
    tag = "stats",
    params(PopularQuery),
    responses(
        (status = 200, description = "Books ranked by loan count", body = Vec<PopularBook>),
        (status = 400, description = "Invalid date window")
    )
)]
pub async fn popular_books(
    State(state): State<AppState>,
    Query(query): Query<PopularQuery>,
) -> AppResult<Json<Vec<PopularBook>>> {
    let window = DateWindow::new(query.start_date, query.end_date)?;
    let books = state.services.stats.popular_books(window, query.limit).await?;
    Ok(Json(books))
}

/// Daily borrow and return counts (default: the last 7 days)
#[utoipa::path(
    get,
    path = "/stats/activity",
    tag = "stats",
    params(DateWindow),
    responses(
        (status = 200, description = "One entry per day", body = Vec<ActivityPoint>),
        (status = 400, description = "Invalid date window")
    )
)]
pub async fn activity(
    State(state): State<AppState>,
    Query(query): Query<DateWindow>,
) -> AppResult<Json<Vec<ActivityPoint>>> {
    let window = DateWindow::new(query.start_date, query.end_date)?;
    let series = state.services.stats.activity(window).await?;
    Ok(Json(series))
}
