//! Loan model and related types

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::member::MemberShort;

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Loan lifecycle state. `Returned` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Active,
    Returned,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Active => "active",
            LoanStatus::Returned => "returned",
        }
    }
}

impl FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(LoanStatus::Active),
            "returned" => Ok(LoanStatus::Returned),
            other => Err(format!("unknown loan status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FineStatus {
    Unpaid,
    Paid,
}

impl FineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FineStatus::Unpaid => "unpaid",
            FineStatus::Paid => "paid",
        }
    }
}

impl FromStr for FineStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(FineStatus::Unpaid),
            "paid" => Ok(FineStatus::Paid),
            other => Err(format!("unknown fine status '{}'", other)),
        }
    }
}

/// Condition recorded on a loan item. Stays `Unset` until the loan is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ItemCondition {
    Unset,
    Good,
    Damaged,
}

impl ItemCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemCondition::Unset => "unset",
            ItemCondition::Good => "good",
            ItemCondition::Damaged => "damaged",
        }
    }
}

impl FromStr for ItemCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unset" => Ok(ItemCondition::Unset),
            "good" => Ok(ItemCondition::Good),
            "damaged" => Ok(ItemCondition::Damaged),
            other => Err(format!("unknown item condition '{}'", other)),
        }
    }
}

/// Condition an operator may report when a book comes back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReturnCondition {
    Good,
    Damaged,
}

impl From<ReturnCondition> for ItemCondition {
    fn from(c: ReturnCondition) -> Self {
        match c {
            ReturnCondition::Good => ItemCondition::Good,
            ReturnCondition::Damaged => ItemCondition::Damaged,
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger records
// ---------------------------------------------------------------------------

/// One book within a loan
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanItem {
    pub loan_id: i64,
    pub book_id: i64,
    pub position: i64,
    pub condition: ItemCondition,
}

/// Loan with its items, as stored in the ledger
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Loan {
    pub id: i64,
    pub member_id: i64,
    pub created_at: DateTime<Utc>,
    pub due_date: NaiveDate,
    pub returned_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub fine_status: FineStatus,
    pub fine_amount: Decimal,
    pub items: Vec<LoanItem>,
}

impl Loan {
    pub fn book_ids(&self) -> Vec<i64> {
        self.items.iter().map(|i| i.book_id).collect()
    }

    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }

    /// Active and past its due date as of `today`
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.is_active() && self.due_date < today
    }

    pub fn returned_on(&self) -> Option<NaiveDate> {
        self.returned_at.map(|d| d.date_naive())
    }
}

/// Book line in a loan view
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanItemDetails {
    pub book_id: i64,
    pub title: String,
    pub condition: ItemCondition,
}

/// Loan with member and book titles resolved, plus derived overdue data
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanDetails {
    pub id: i64,
    pub member: MemberShort,
    pub created_at: DateTime<Utc>,
    pub due_date: NaiveDate,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub fine_status: FineStatus,
    pub fine_amount: Decimal,
    pub books: Vec<LoanItemDetails>,
    /// Days past due, as of now for active loans, as of the return date otherwise
    pub overdue_days: i64,
    pub is_overdue: bool,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Create loan request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateLoan {
    pub member_id: i64,
    #[validate(length(min = 1, message = "At least one book is required"))]
    pub book_ids: Vec<i64>,
    /// Defaults to today plus the configured loan duration
    pub due_date: Option<NaiveDate>,
}

/// Condition reported for one returned book
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BookReturn {
    pub book_id: i64,
    pub condition: ReturnCondition,
}

/// Return request: one entry per book of the loan
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReturnLoan {
    pub books: Vec<BookReturn>,
}

impl ReturnLoan {
    /// Condition map keyed by book id. Rejects a book listed twice.
    pub fn into_condition_map(self) -> Result<BTreeMap<i64, ReturnCondition>, i64> {
        let mut map = BTreeMap::new();
        for entry in self.books {
            if map.insert(entry.book_id, entry.condition).is_some() {
                return Err(entry.book_id);
            }
        }
        Ok(map)
    }
}

/// Administrative deletion request
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct DeleteLoan {
    #[validate(length(max = 500, message = "Reason must be at most 500 characters"))]
    pub reason: Option<String>,
}

/// Loan list query
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct LoanQuery {
    pub status: Option<LoanStatus>,
    pub member_id: Option<i64>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl LoanQuery {
    /// Clamped `(page, per_page)` used for the query and echoed in the response
    pub fn pagination(&self) -> (i64, i64) {
        super::effective_page(self.page, self.per_page)
    }
}

/// Fine projection for a loan
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FinePreview {
    pub loan_id: i64,
    pub status: LoanStatus,
    pub fine_status: FineStatus,
    pub overdue_days: i64,
    /// Amount due if the loan were returned today, or the recorded fine once returned
    pub amount: Decimal,
    pub as_of: NaiveDate,
}
