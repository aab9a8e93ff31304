//! Ad-hoc reports over the loan ledger and catalog

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::{
    error::AppResult,
    models::{
        loan::{FineStatus, Loan, LoanStatus},
        report::{
            BookInventoryRow, DateWindow, FineReportRow, LedgerSnapshot, LoanReportRow,
            MemberActivityRow, OverdueReturnRow, Report, ReportKind, ReportRows,
        },
    },
    repository::Repository,
    services::fines::compute_overdue_days,
};

#[derive(Clone)]
pub struct ReportsService {
    repository: Repository,
}

impl ReportsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn generate(&self, kind: ReportKind, window: DateWindow) -> AppResult<Report> {
        let snapshot = self.repository.snapshot().await?;
        let report = build_report(kind, &snapshot, window);
        tracing::debug!(?kind, rows = report.rows.len(), "Report generated");
        Ok(report)
    }
}

pub fn build_report(kind: ReportKind, snapshot: &LedgerSnapshot, window: DateWindow) -> Report {
    let window = if kind.uses_window() {
        window
    } else {
        DateWindow::default()
    };

    let rows = match kind {
        ReportKind::Loans => ReportRows::Loans(loans_report(snapshot, window)),
        ReportKind::Fines => ReportRows::Fines(fines_report(snapshot, window)),
        ReportKind::OverdueReturns => ReportRows::OverdueReturns(overdue_returns_report(snapshot, window)),
        ReportKind::MemberActivity => ReportRows::MemberActivity(member_activity_report(snapshot, window)),
        ReportKind::BookInventory => ReportRows::BookInventory(book_inventory_report(snapshot)),
    };

    Report {
        kind,
        start_date: window.start_date,
        end_date: window.end_date,
        rows,
    }
}

struct Lookup<'a> {
    members: HashMap<i64, &'a str>,
    books: HashMap<i64, &'a str>,
}

impl<'a> Lookup<'a> {
    fn new(snapshot: &'a LedgerSnapshot) -> Self {
        Self {
            members: snapshot.members.iter().map(|m| (m.id, m.name.as_str())).collect(),
            books: snapshot.books.iter().map(|b| (b.id, b.title.as_str())).collect(),
        }
    }

    fn member(&self, id: i64) -> String {
        self.members.get(&id).copied().unwrap_or_default().to_string()
    }

    fn titles(&self, loan: &Loan) -> String {
        loan.items
            .iter()
            .map(|i| self.books.get(&i.book_id).copied().unwrap_or_default())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Returned loans whose return date falls in the window, by return date
fn returned_in<'a>(snapshot: &'a LedgerSnapshot, window: DateWindow) -> Vec<&'a Loan> {
    let mut loans: Vec<&Loan> = snapshot
        .loans
        .iter()
        .filter(|l| l.status == LoanStatus::Returned)
        .filter(|l| l.returned_on().map_or(false, |d| window.contains(d)))
        .collect();
    loans.sort_by_key(|l| (l.returned_at, l.id));
    loans
}

fn loans_report(snapshot: &LedgerSnapshot, window: DateWindow) -> Vec<LoanReportRow> {
    let lookup = Lookup::new(snapshot);
    let mut loans: Vec<&Loan> = snapshot
        .loans
        .iter()
        .filter(|l| window.contains(l.created_at.date_naive()))
        .collect();
    loans.sort_by_key(|l| (l.created_at, l.id));

    loans
        .into_iter()
        .map(|l| LoanReportRow {
            loan_id: l.id,
            member_name: lookup.member(l.member_id),
            created_at: l.created_at,
            due_date: l.due_date,
            returned_at: l.returned_at,
            book_count: l.items.len() as i64,
            books: lookup.titles(l),
            status: l.status,
        })
        .collect()
}

fn fines_report(snapshot: &LedgerSnapshot, window: DateWindow) -> Vec<FineReportRow> {
    let lookup = Lookup::new(snapshot);
    returned_in(snapshot, window)
        .into_iter()
        .filter(|l| l.fine_amount > Decimal::ZERO)
        .filter_map(|l| {
            let returned_on = l.returned_on()?;
            Some(FineReportRow {
                loan_id: l.id,
                member_name: lookup.member(l.member_id),
                due_date: l.due_date,
                returned_on,
                overdue_days: compute_overdue_days(l.due_date, returned_on),
                fine_amount: l.fine_amount,
                fine_status: l.fine_status,
            })
        })
        .collect()
}

fn overdue_returns_report(snapshot: &LedgerSnapshot, window: DateWindow) -> Vec<OverdueReturnRow> {
    let lookup = Lookup::new(snapshot);
    returned_in(snapshot, window)
        .into_iter()
        .filter_map(|l| {
            let returned_on = l.returned_on()?;
            let days_late = compute_overdue_days(l.due_date, returned_on);
            (days_late > 0).then(|| OverdueReturnRow {
                loan_id: l.id,
                member_name: lookup.member(l.member_id),
                due_date: l.due_date,
                returned_on,
                days_late,
                fine_amount: l.fine_amount,
            })
        })
        .collect()
}

fn member_activity_report(snapshot: &LedgerSnapshot, window: DateWindow) -> Vec<MemberActivityRow> {
    let lookup = Lookup::new(snapshot);
    let new_row = |member_id: i64| MemberActivityRow {
        member_id,
        member_name: lookup.member(member_id),
        total_loans: 0,
        books_borrowed: 0,
        total_fines: Decimal::ZERO,
        unpaid_fines: Decimal::ZERO,
    };

    let mut collected: HashMap<i64, MemberActivityRow> = HashMap::new();

    for loan in snapshot
        .loans
        .iter()
        .filter(|l| window.contains(l.created_at.date_naive()))
    {
        let row = collected
            .entry(loan.member_id)
            .or_insert_with(|| new_row(loan.member_id));
        row.total_loans += 1;
        row.books_borrowed += loan.items.len() as i64;
    }

    for loan in returned_in(snapshot, window) {
        if loan.fine_amount == Decimal::ZERO {
            continue;
        }
        let row = collected
            .entry(loan.member_id)
            .or_insert_with(|| new_row(loan.member_id));
        row.total_fines += loan.fine_amount;
        if loan.fine_status == FineStatus::Unpaid {
            row.unpaid_fines += loan.fine_amount;
        }
    }

    let mut rows: Vec<MemberActivityRow> = collected.into_values().collect();
    rows.sort_by(|a, b| {
        b.total_loans
            .cmp(&a.total_loans)
            .then_with(|| a.member_name.cmp(&b.member_name))
            .then(a.member_id.cmp(&b.member_id))
    });
    rows
}

fn book_inventory_report(snapshot: &LedgerSnapshot) -> Vec<BookInventoryRow> {
    let mut rows: Vec<BookInventoryRow> = snapshot
        .books
        .iter()
        .map(|b| BookInventoryRow {
            book_id: b.id,
            title: b.title.clone(),
            isbn: b.isbn.clone(),
            stock: b.stock,
            available: b.available,
            on_loan: b.on_loan(),
        })
        .collect();
    rows.sort_by(|a, b| a.title.cmp(&b.title).then(a.book_id.cmp(&b.book_id)));
    rows
}
