//! Book (catalog entry) model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Book with its copy counters.
///
/// `stock` is the number of owned copies, `available` the number not held by an
/// active loan. The database enforces `0 <= available <= stock`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    pub year_published: Option<i32>,
    pub stock: i64,
    pub available: i64,
}

impl Book {
    /// Copies currently out on active loans
    pub fn on_loan(&self) -> i64 {
        self.stock - self.available
    }
}

/// Create book request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    pub year_published: Option<i32>,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i64,
}

/// Book list query
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct BookQuery {
    /// Search in title
    pub title: Option<String>,
    /// Only books with at least one available copy
    pub available_only: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl BookQuery {
    /// Clamped `(page, per_page)` used for the query and echoed in the response
    pub fn pagination(&self) -> (i64, i64) {
        super::effective_page(self.page, self.per_page)
    }
}
