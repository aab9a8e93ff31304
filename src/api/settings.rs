//! Settings endpoints

use axum::{extract::State, Json};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{config::LoansConfig, error::AppResult, AppState};

/// Loan policy the ledger is running with
#[derive(Serialize, ToSchema)]
pub struct LoanSettings {
    /// Penalty per overdue day
    pub daily_fine_rate: Decimal,
    /// Decimal places kept on computed fines
    pub currency_minor_units: u32,
    /// Whether an active loan or unpaid fine blocks new loans
    pub block_on_open_obligation: bool,
    /// Loan duration in days when no due date is given
    pub default_duration_days: i64,
    /// Maximum books per loan
    pub max_books_per_loan: usize,
}

impl From<&LoansConfig> for LoanSettings {
    fn from(config: &LoansConfig) -> Self {
        Self {
            daily_fine_rate: config.daily_fine_rate,
            currency_minor_units: config.currency_minor_units,
            block_on_open_obligation: config.block_on_open_obligation,
            default_duration_days: config.default_duration_days,
            max_books_per_loan: config.max_books_per_loan,
        }
    }
}

/// Settings response
#[derive(Serialize, ToSchema)]
pub struct SettingsResponse {
    pub loans: LoanSettings,
}

/// Get current settings
#[utoipa::path(
    get,
    path = "/settings",
    tag = "settings",
    responses(
        (status = 200, description = "Current settings", body = SettingsResponse)
    )
)]
pub async fn get_settings(State(state): State<AppState>) -> AppResult<Json<SettingsResponse>> {
    Ok(Json(SettingsResponse {
        loans: LoanSettings::from(&state.config.loans),
    }))
}
