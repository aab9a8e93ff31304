//! Statistics service: dashboard counters, overdue list, popularity and activity

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;

use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::{
        loan::{FineStatus, LoanStatus},
        report::{ActivityPoint, DashboardStats, DateWindow, LedgerSnapshot, OverdueLoan, PopularBook},
    },
    repository::Repository,
    services::fines::{compute_overdue_days, FinePolicy},
};

/// Default popularity ranking size
pub const DEFAULT_POPULAR_LIMIT: usize = 5;
/// Days covered by the activity series when no window is given
pub const DEFAULT_ACTIVITY_DAYS: i64 = 7;
/// Longest activity series served in one request
pub const MAX_ACTIVITY_DAYS: i64 = 366;

#[derive(Clone)]
pub struct StatsService {
    repository: Repository,
    fines: FinePolicy,
    clock: Arc<dyn Clock>,
}

impl StatsService {
    pub fn new(repository: Repository, fines: FinePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            fines,
            clock,
        }
    }

    pub async fn dashboard(&self) -> AppResult<DashboardStats> {
        let snapshot = self.repository.snapshot().await?;
        Ok(dashboard(&snapshot, self.clock.today()))
    }

    pub async fn overdue_loans(&self) -> AppResult<Vec<OverdueLoan>> {
        let snapshot = self.repository.snapshot().await?;
        Ok(overdue_loans(&snapshot, self.clock.today(), &self.fines))
    }

    pub async fn popular_books(&self, window: DateWindow, limit: Option<usize>) -> AppResult<Vec<PopularBook>> {
        let snapshot = self.repository.snapshot().await?;
        Ok(popular_books(&snapshot, window, limit.unwrap_or(DEFAULT_POPULAR_LIMIT)))
    }

    pub async fn activity(&self, window: DateWindow) -> AppResult<Vec<ActivityPoint>> {
        let (start, end) = activity_bounds(window, self.clock.today())?;
        let snapshot = self.repository.snapshot().await?;
        Ok(activity_series(&snapshot, start, end))
    }
}

pub fn dashboard(snapshot: &LedgerSnapshot, today: NaiveDate) -> DashboardStats {
    let active_loans = snapshot.loans.iter().filter(|l| l.is_active()).count() as i64;
    let overdue_loans = snapshot.loans.iter().filter(|l| l.is_overdue(today)).count() as i64;
    let unpaid_fines = snapshot
        .loans
        .iter()
        .filter(|l| l.fine_status == FineStatus::Unpaid)
        .map(|l| l.fine_amount)
        .sum::<Decimal>();

    DashboardStats {
        active_loans,
        overdue_loans,
        unpaid_fines,
        total_members: snapshot.members.len() as i64,
    }
}

/// Active loans past due, most overdue first, ties by loan id
pub fn overdue_loans(snapshot: &LedgerSnapshot, today: NaiveDate, fines: &FinePolicy) -> Vec<OverdueLoan> {
    let names: HashMap<i64, &str> = snapshot
        .members
        .iter()
        .map(|m| (m.id, m.name.as_str()))
        .collect();

    let mut rows: Vec<OverdueLoan> = snapshot
        .loans
        .iter()
        .filter(|l| l.status == LoanStatus::Active && l.is_overdue(today))
        .map(|l| OverdueLoan {
            loan_id: l.id,
            member_id: l.member_id,
            member_name: names.get(&l.member_id).copied().unwrap_or_default().to_string(),
            due_date: l.due_date,
            overdue_days: compute_overdue_days(l.due_date, today),
            book_count: l.items.len() as i64,
            projected_fine: fines.assess(l.due_date, today),
        })
        .collect();

    rows.sort_by(|a, b| {
        b.overdue_days
            .cmp(&a.overdue_days)
            .then(a.loan_id.cmp(&b.loan_id))
    });
    rows
}

/// Books ranked by loan items created within the window, ties by title
pub fn popular_books(snapshot: &LedgerSnapshot, window: DateWindow, limit: usize) -> Vec<PopularBook> {
    let mut counts: HashMap<i64, i64> = HashMap::new();
    for loan in snapshot
        .loans
        .iter()
        .filter(|l| window.contains(l.created_at.date_naive()))
    {
        for item in &loan.items {
            *counts.entry(item.book_id).or_default() += 1;
        }
    }

    let mut ranking: Vec<PopularBook> = snapshot
        .books
        .iter()
        .filter_map(|b| {
            counts.get(&b.id).map(|&total_loans| PopularBook {
                book_id: b.id,
                title: b.title.clone(),
                total_loans,
            })
        })
        .collect();

    ranking.sort_by(|a, b| {
        b.total_loans
            .cmp(&a.total_loans)
            .then_with(|| a.title.cmp(&b.title))
            .then(a.book_id.cmp(&b.book_id))
    });
    ranking.truncate(limit);
    ranking
}

/// Resolve the activity window: missing ends default to a week ending today.
/// Windows longer than `MAX_ACTIVITY_DAYS` or outside the calendar are rejected.
pub fn activity_bounds(window: DateWindow, today: NaiveDate) -> AppResult<(NaiveDate, NaiveDate)> {
    let span = Duration::days(DEFAULT_ACTIVITY_DAYS - 1);
    let week_ending = |end: NaiveDate| {
        end.checked_sub_signed(span)
            .map(|start| (start, end))
            .ok_or_else(|| AppError::Validation(format!("end_date {} is out of range", end)))
    };

    let (start, end) = match (window.start_date, window.end_date) {
        (Some(start), Some(end)) => (start, end),
        (Some(start), None) => (start, today.max(start)),
        (None, Some(end)) => week_ending(end)?,
        (None, None) => week_ending(today)?,
    };

    let days = (end - start).num_days() + 1;
    if days > MAX_ACTIVITY_DAYS {
        return Err(AppError::Validation(format!(
            "Activity window spans {} days, at most {} allowed",
            days, MAX_ACTIVITY_DAYS
        )));
    }
    Ok((start, end))
}

/// Loans created and returned per calendar day, zero-filled, ascending
pub fn activity_series(snapshot: &LedgerSnapshot, start: NaiveDate, end: NaiveDate) -> Vec<ActivityPoint> {
    let mut buckets: BTreeMap<NaiveDate, (i64, i64)> = BTreeMap::new();
    let mut day = start;
    while day <= end {
        buckets.insert(day, (0, 0));
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }

    for loan in &snapshot.loans {
        if let Some(bucket) = buckets.get_mut(&loan.created_at.date_naive()) {
            bucket.0 += 1;
        }
        if let Some(returned_on) = loan.returned_on() {
            if let Some(bucket) = buckets.get_mut(&returned_on) {
                bucket.1 += 1;
            }
        }
    }

    buckets
        .into_iter()
        .map(|(date, (borrowed, returned))| ActivityPoint {
            date,
            borrowed,
            returned,
        })
        .collect()
}
