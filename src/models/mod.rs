//! Data models for Pustaka

pub mod book;
pub mod loan;
pub mod member;
pub mod report;

// Re-export commonly used types
pub use book::Book;
pub use loan::{FineStatus, ItemCondition, Loan, LoanDetails, LoanItem, LoanStatus, ReturnCondition};
pub use member::{Member, MemberShort};
pub use report::{DateWindow, LedgerSnapshot, ReportKind};

/// Page size served when a list request gives none
pub const DEFAULT_PER_PAGE: i64 = 20;
/// Largest page size a list request may ask for
pub const MAX_PER_PAGE: i64 = 200;

/// Page number and page size as actually served: the page is at least 1 and
/// the size lies within `1..=MAX_PER_PAGE`.
pub fn effective_page(page: Option<i64>, per_page: Option<i64>) -> (i64, i64) {
    (
        page.unwrap_or(1).max(1),
        per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
    )
}

/// Rows skipped before the requested page
pub fn page_offset(page: i64, per_page: i64) -> i64 {
    (page - 1).saturating_mul(per_page)
}
