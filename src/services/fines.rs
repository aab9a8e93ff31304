//! Fine calculation
//!
//! Fines accrue per calendar day between the due date and the return date.
//! Amounts are truncated toward zero to the configured number of minor-unit
//! decimals; nothing is ever rounded up in the member's disfavour.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::config::LoansConfig;

/// Days past `due_date` as of `as_of`, never negative
pub fn compute_overdue_days(due_date: NaiveDate, as_of: NaiveDate) -> i64 {
    (as_of - due_date).num_days().max(0)
}

/// `overdue_days * daily_rate`; zero for on-time or early returns
pub fn compute_fine(due_date: NaiveDate, return_date: NaiveDate, daily_rate: Decimal) -> Decimal {
    Decimal::from(compute_overdue_days(due_date, return_date)) * daily_rate
}

/// Daily rate and currency precision applied by the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinePolicy {
    pub daily_rate: Decimal,
    pub minor_units: u32,
}

impl FinePolicy {
    pub fn new(daily_rate: Decimal, minor_units: u32) -> Self {
        Self {
            daily_rate,
            minor_units,
        }
    }

    /// Fine owed for a loan returned on `return_date`
    pub fn assess(&self, due_date: NaiveDate, return_date: NaiveDate) -> Decimal {
        compute_fine(due_date, return_date, self.daily_rate)
            .round_dp_with_strategy(self.minor_units, RoundingStrategy::ToZero)
    }
}

impl From<&LoansConfig> for FinePolicy {
    fn from(config: &LoansConfig) -> Self {
        Self::new(config.daily_fine_rate, config.currency_minor_units)
    }
}
