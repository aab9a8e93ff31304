//! Loan ledger endpoints: borrowing, returns, fine settlement and deletion

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::loan::{CreateLoan, DeleteLoan, FinePreview, Loan, LoanDetails, LoanQuery, ReturnLoan},
    AppState,
};

use super::PaginatedResponse;

/// Create a new loan covering one or more books
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    request_body = CreateLoan,
    responses(
        (status = 201, description = "Loan created", body = Loan),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 404, description = "Member or book not found", body = crate::error::ErrorResponse),
        (status = 409, description = "A requested book is out of stock", body = crate::error::ErrorResponse),
        (status = 422, description = "Member has an active loan or an unpaid fine", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_loan(
    State(state): State<AppState>,
    Json(request): Json<CreateLoan>,
) -> AppResult<(StatusCode, Json<Loan>)> {
    let loan = state.services.loans.create_loan(request).await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// List loans, newest first
#[utoipa::path(
    get,
    path = "/loans",
    tag = "loans",
    params(LoanQuery),
    responses(
        (status = 200, description = "List of loans", body = PaginatedResponse<LoanDetails>)
    )
)]
pub async fn list_loans(
    State(state): State<AppState>,
    Query(query): Query<LoanQuery>,
) -> AppResult<Json<PaginatedResponse<LoanDetails>>> {
    let (items, total) = state.services.loans.list_loans(&query).await?;
    let (page, per_page) = query.pagination();

    Ok(Json(PaginatedResponse {
        items,
        total,
        page,
        per_page,
    }))
}

/// Get loan details by ID
#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    params(
        ("id" = i64, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan details", body = LoanDetails),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn get_loan(
    State(state): State<AppState>,
    Path(loan_id): Path<i64>,
) -> AppResult<Json<LoanDetails>> {
    let loan = state.services.loans.get_loan_details(loan_id).await?;
    Ok(Json(loan))
}

/// Get all loans of a member
#[utoipa::path(
    get,
    path = "/members/{id}/loans",
    tag = "loans",
    params(
        ("id" = i64, Path, description = "Member ID")
    ),
    responses(
        (status = 200, description = "Member's loans, newest first", body = Vec<LoanDetails>),
        (status = 404, description = "Member not found")
    )
)]
pub async fn get_member_loans(
    State(state): State<AppState>,
    Path(member_id): Path<i64>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state.services.loans.get_member_loans(member_id).await?;
    Ok(Json(loans))
}

/// Return every book of a loan, reporting each book's condition
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    params(
        ("id" = i64, Path, description = "Loan ID")
    ),
    request_body = ReturnLoan,
    responses(
        (status = 200, description = "Loan returned, fine assessed", body = Loan),
        (status = 400, description = "A book is listed twice"),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Loan already returned"),
        (status = 422, description = "Books listed do not match the loan")
    )
)]
pub async fn return_loan(
    State(state): State<AppState>,
    Path(loan_id): Path<i64>,
    Json(request): Json<ReturnLoan>,
) -> AppResult<Json<Loan>> {
    let conditions = request
        .into_condition_map()
        .map_err(|book_id| AppError::Validation(format!("Book {} is listed twice", book_id)))?;

    let loan = state.services.settlement.process_return(loan_id, &conditions).await?;
    Ok(Json(loan))
}

/// Pay the fine of a returned loan
#[utoipa::path(
    post,
    path = "/loans/{id}/settle",
    tag = "loans",
    params(
        ("id" = i64, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Fine settled", body = Loan),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Loan not returned or fine already settled")
    )
)]
pub async fn settle_fine(
    State(state): State<AppState>,
    Path(loan_id): Path<i64>,
) -> AppResult<Json<Loan>> {
    let loan = state.services.settlement.settle_fine(loan_id).await?;
    Ok(Json(loan))
}

/// Preview the fine owed on a loan without changing it
#[utoipa::path(
    get,
    path = "/loans/{id}/fine-preview",
    tag = "loans",
    params(
        ("id" = i64, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Fine preview", body = FinePreview),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn fine_preview(
    State(state): State<AppState>,
    Path(loan_id): Path<i64>,
) -> AppResult<Json<FinePreview>> {
    let preview = state.services.loans.fine_preview(loan_id).await?;
    Ok(Json(preview))
}

/// Delete a returned and settled loan
#[utoipa::path(
    delete,
    path = "/loans/{id}",
    tag = "loans",
    params(
        ("id" = i64, Path, description = "Loan ID"),
        ("reason" = Option<String>, Query, description = "Reason recorded in the deletion audit")
    ),
    responses(
        (status = 204, description = "Loan deleted"),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Loan still active or fine unpaid")
    )
)]
pub async fn delete_loan(
    State(state): State<AppState>,
    Path(loan_id): Path<i64>,
    Query(request): Query<DeleteLoan>,
) -> AppResult<StatusCode> {
    request.validate()?;
    state.services.loans.delete_loan(loan_id, request.reason).await?;
    Ok(StatusCode::NO_CONTENT)
}
