//! Read-side projections: dashboard, rankings, activity and ad-hoc reports

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::{book::Book, loan::Loan, member::Member};
use crate::error::{AppError, AppResult};

/// Inclusive calendar-date window. Open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, IntoParams, ToSchema)]
pub struct DateWindow {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl DateWindow {
    pub fn new(start_date: Option<NaiveDate>, end_date: Option<NaiveDate>) -> AppResult<Self> {
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if start > end {
                return Err(AppError::Validation(format!(
                    "start_date {} is after end_date {}",
                    start, end
                )));
            }
        }
        Ok(Self { start_date, end_date })
    }

    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start_date: Some(start),
            end_date: Some(end),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date.map_or(true, |s| date >= s) && self.end_date.map_or(true, |e| date <= e)
    }
}

/// Consistent read of the ledger and catalog used by every projection
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    pub members: Vec<Member>,
    pub books: Vec<Book>,
    pub loans: Vec<Loan>,
}

/// Dashboard counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DashboardStats {
    pub active_loans: i64,
    pub overdue_loans: i64,
    pub unpaid_fines: Decimal,
    pub total_members: i64,
}

/// Active loan past its due date
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OverdueLoan {
    pub loan_id: i64,
    pub member_id: i64,
    pub member_name: String,
    pub due_date: NaiveDate,
    pub overdue_days: i64,
    pub book_count: i64,
    /// Fine the member would owe if the loan were returned today
    pub projected_fine: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PopularBook {
    pub book_id: i64,
    pub title: String,
    pub total_loans: i64,
}

/// One calendar day of loan activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ActivityPoint {
    pub date: NaiveDate,
    pub borrowed: i64,
    pub returned: i64,
}

// ---------------------------------------------------------------------------
// Ad-hoc reports
// ---------------------------------------------------------------------------

/// Report kinds offered to operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ReportKind {
    Loans,
    Fines,
    OverdueReturns,
    MemberActivity,
    BookInventory,
}

impl ReportKind {
    /// Book inventory reports the catalog as of query time and ignores the window
    pub fn uses_window(&self) -> bool {
        !matches!(self, ReportKind::BookInventory)
    }
}

impl std::str::FromStr for ReportKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "loans" => Ok(ReportKind::Loans),
            "fines" => Ok(ReportKind::Fines),
            "overdue-returns" => Ok(ReportKind::OverdueReturns),
            "member-activity" => Ok(ReportKind::MemberActivity),
            "book-inventory" => Ok(ReportKind::BookInventory),
            other => Err(AppError::NotFound(format!("Unknown report '{}'", other))),
        }
    }
}

/// Loans created within the window
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanReportRow {
    pub loan_id: i64,
    pub member_name: String,
    pub created_at: chrono::DateTime<Utc>,
    pub due_date: NaiveDate,
    pub returned_at: Option<chrono::DateTime<Utc>>,
    pub book_count: i64,
    pub books: String,
    pub status: super::loan::LoanStatus,
}

/// Non-zero fines assessed on returns within the window
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FineReportRow {
    pub loan_id: i64,
    pub member_name: String,
    pub due_date: NaiveDate,
    pub returned_on: NaiveDate,
    pub overdue_days: i64,
    pub fine_amount: Decimal,
    pub fine_status: super::loan::FineStatus,
}

/// Loans returned after their due date, returned within the window
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OverdueReturnRow {
    pub loan_id: i64,
    pub member_name: String,
    pub due_date: NaiveDate,
    pub returned_on: NaiveDate,
    pub days_late: i64,
    pub fine_amount: Decimal,
}

/// Per-member borrowing and fines within the window
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MemberActivityRow {
    pub member_id: i64,
    pub member_name: String,
    pub total_loans: i64,
    pub books_borrowed: i64,
    pub total_fines: Decimal,
    pub unpaid_fines: Decimal,
}

/// Stock counters as of query time
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookInventoryRow {
    pub book_id: i64,
    pub title: String,
    pub isbn: Option<String>,
    pub stock: i64,
    pub available: i64,
    pub on_loan: i64,
}

/// Rows of one report kind; serializes as a plain array
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ReportRows {
    Loans(Vec<LoanReportRow>),
    Fines(Vec<FineReportRow>),
    OverdueReturns(Vec<OverdueReturnRow>),
    MemberActivity(Vec<MemberActivityRow>),
    BookInventory(Vec<BookInventoryRow>),
}

impl ReportRows {
    pub fn len(&self) -> usize {
        match self {
            ReportRows::Loans(rows) => rows.len(),
            ReportRows::Fines(rows) => rows.len(),
            ReportRows::OverdueReturns(rows) => rows.len(),
            ReportRows::MemberActivity(rows) => rows.len(),
            ReportRows::BookInventory(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Generated report
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Report {
    pub kind: ReportKind,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[schema(value_type = Vec<Object>)]
    pub rows: ReportRows,
}
