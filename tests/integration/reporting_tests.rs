//! Dashboard, rankings, activity and reports over a small ledger

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use pustaka_server::{
    error::AppError,
    models::loan::CreateLoan,
    models::report::{DateWindow, ReportKind, ReportRows},
    models::{FineStatus, Loan, ReturnCondition},
};

use crate::{d, setup, TestApp};

struct Ledger {
    app: TestApp,
    ani_loan: Loan,
    popular_id: i64,
    quiet_id: i64,
}

fn good(loan: &Loan) -> BTreeMap<i64, ReturnCondition> {
    loan.items
        .iter()
        .map(|i| (i.book_id, ReturnCondition::Good))
        .collect()
}

/// Ani borrows two books and Budi one on 2024-01-01; Budi returns on time on 2024-01-03
async fn ledger() -> Ledger {
    let app = setup().await;
    let popular = app.book("Ziarah", 2).await;
    let quiet = app.book("Kubah", 1).await;
    let ani = app.member("Ani").await;
    let budi = app.member("Budi").await;

    let ani_loan = app
        .services
        .loans
        .create_loan(CreateLoan {
            member_id: ani.id,
            book_ids: vec![popular.id, quiet.id],
            due_date: None,
        })
        .await
        .unwrap();
    let budi_loan = app
        .services
        .loans
        .create_loan(CreateLoan {
            member_id: budi.id,
            book_ids: vec![popular.id],
            due_date: None,
        })
        .await
        .unwrap();

    app.clock.set_date(d(2024, 1, 3));
    app.services
        .settlement
        .process_return(budi_loan.id, &good(&budi_loan))
        .await
        .unwrap();

    Ledger {
        app,
        ani_loan,
        popular_id: popular.id,
        quiet_id: quiet.id,
    }
}

#[tokio::test]
async fn test_dashboard_and_overdue_list() {
    let Ledger { app, ani_loan, .. } = ledger().await;
    app.clock.set_date(d(2024, 1, 10));

    let stats = app.services.stats.dashboard().await.unwrap();
    assert_eq!(stats.active_loans, 1);
    assert_eq!(stats.overdue_loans, 1);
    assert_eq!(stats.unpaid_fines, Decimal::ZERO);
    assert_eq!(stats.total_members, 2);

    let overdue = app.services.stats.overdue_loans().await.unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].loan_id, ani_loan.id);
    assert_eq!(overdue[0].member_name, "Ani");
    assert_eq!(overdue[0].overdue_days, 2);
    assert_eq!(overdue[0].book_count, 2);
    assert_eq!(overdue[0].projected_fine, Decimal::new(3000, 0));

    app.services
        .settlement
        .process_return(ani_loan.id, &good(&ani_loan))
        .await
        .unwrap();

    let stats = app.services.stats.dashboard().await.unwrap();
    assert_eq!(stats.active_loans, 0);
    assert_eq!(stats.overdue_loans, 0);
    assert_eq!(stats.unpaid_fines, Decimal::new(3000, 0));
    assert!(app.services.stats.overdue_loans().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_popular_books_ranking() {
    let Ledger {
        app,
        popular_id,
        quiet_id,
        ..
    } = ledger().await;

    let ranking = app
        .services
        .stats
        .popular_books(DateWindow::default(), None)
        .await
        .unwrap();
    let ids: Vec<(i64, i64)> = ranking.iter().map(|b| (b.book_id, b.total_loans)).collect();
    assert_eq!(ids, vec![(popular_id, 2), (quiet_id, 1)]);

    let top = app
        .services
        .stats
        .popular_books(DateWindow::default(), Some(1))
        .await
        .unwrap();
    assert_eq!(top.len(), 1);

    let later = DateWindow::between(d(2024, 2, 1), d(2024, 2, 29));
    assert!(app
        .services
        .stats
        .popular_books(later, None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_activity_series_is_zero_filled() {
    let Ledger { app, .. } = ledger().await;

    let window = DateWindow::between(d(2024, 1, 1), d(2024, 1, 3));
    let series = app.services.stats.activity(window).await.unwrap();
    let counts: Vec<(i64, i64)> = series.iter().map(|p| (p.borrowed, p.returned)).collect();
    assert_eq!(counts, vec![(2, 0), (0, 0), (0, 1)]);

    // Defaults to the week ending today
    let week = app.services.stats.activity(DateWindow::default()).await.unwrap();
    assert_eq!(week.len(), 7);
    assert_eq!(week.last().map(|p| p.date), Some(d(2024, 1, 3)));
}

#[tokio::test]
async fn test_fines_and_inventory_reports() {
    let Ledger { app, ani_loan, .. } = ledger().await;
    app.clock.set_date(d(2024, 1, 12));
    app.services
        .settlement
        .process_return(ani_loan.id, &good(&ani_loan))
        .await
        .unwrap();

    let report = app
        .services
        .reports
        .generate(ReportKind::Fines, DateWindow::default())
        .await
        .unwrap();
    let ReportRows::Fines(rows) = &report.rows else {
        panic!("expected fine rows");
    };
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].fine_amount, Decimal::new(6000, 0));
    assert_eq!(rows[0].fine_status, FineStatus::Unpaid);

    let inventory = app
        .services
        .reports
        .generate(ReportKind::BookInventory, DateWindow::default())
        .await
        .unwrap();
    let ReportRows::BookInventory(rows) = &inventory.rows else {
        panic!("expected inventory rows");
    };
    assert!(rows.iter().all(|r| r.on_loan == 0 && r.available == r.stock));

    let loans = app
        .services
        .reports
        .generate(ReportKind::Loans, DateWindow::between(d(2024, 1, 1), d(2024, 1, 1)))
        .await
        .unwrap();
    assert_eq!(loans.rows.len(), 2);
}

#[test]
fn test_unknown_report_kind() {
    assert!(matches!(
        "weekly-digest".parse::<ReportKind>(),
        Err(AppError::NotFound(_))
    ));
    assert_eq!(
        "overdue-returns".parse::<ReportKind>().unwrap(),
        ReportKind::OverdueReturns
    );
}
